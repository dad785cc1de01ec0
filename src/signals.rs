//! Signal adapter. The core never handles signals itself; [`Lifecycle::start`]
//! wires this adapter to `shutdown()` when `trap_signals` is set, and embedders
//! that manage signals themselves can call it directly.
//!
//! [`Lifecycle::start`]: crate::Lifecycle::start

use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// Default signal set: SIGTERM, SIGINT, SIGHUP.
pub fn default_signals() -> Vec<SignalKind> {
    vec![
        SignalKind::terminate(),
        SignalKind::interrupt(),
        SignalKind::hangup(),
    ]
}

/// Wait until one of the given process signals is delivered. With an empty
/// set this never resolves.
pub async fn wait_for_shutdown_signal(signals: &[SignalKind]) {
    if signals.is_empty() {
        std::future::pending::<()>().await;
    }
    let mut streams = Vec::with_capacity(signals.len());
    for kind in signals {
        streams.push(signal(*kind).expect("failed to install signal handler"));
    }
    let waits = streams.iter_mut().map(|stream| Box::pin(stream.recv()));
    let (_, index, _) = futures::future::select_all(waits).await;
    info!(
        signal = signals[index].as_raw_value(),
        "Lifecycle: received shutdown signal"
    );
}
