use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lifeline::{Lifecycle, LifecycleOptions, Terminate};

/// Terminate stub recording whether it was invoked.
pub fn recording_terminate() -> (Terminate, Arc<AtomicBool>) {
    let called = Arc::new(AtomicBool::new(false));
    let flag = called.clone();
    let terminate: Terminate = Arc::new(move || {
        flag.store(true, Ordering::SeqCst);
    });
    (terminate, called)
}

/// Options for tests: ephemeral port, no signal trapping, recording terminate.
pub fn test_options(grace_period: Duration) -> (LifecycleOptions, Arc<AtomicBool>) {
    let (terminate, terminate_called) = recording_terminate();
    let options = LifecycleOptions {
        port: 0,
        grace_period,
        shutdown_timeout: Duration::from_secs(30),
        trap_signals: false,
        terminate,
        ..LifecycleOptions::default()
    };
    (options, terminate_called)
}

pub async fn start_for_test(grace_period: Duration) -> Lifecycle {
    let (options, _) = test_options(grace_period);
    Lifecycle::start(options)
        .await
        .expect("failed to start lifecycle")
}

/// Issue a GET against the lifecycle's probe server and return status + body.
pub async fn probe(lifecycle: &Lifecycle, path: &str) -> (u16, String) {
    let url = format!("http://127.0.0.1:{}{}", lifecycle.probe_addr().port(), path);
    let response = reqwest::get(&url).await.expect("probe request failed");
    let status = response.status().as_u16();
    let body = response.text().await.expect("failed to read probe body");
    (status, body)
}

/// Poll until the ShuttingDown transition is observable.
pub async fn wait_until_shutting_down(lifecycle: &Lifecycle) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !lifecycle.is_server_shutting_down() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("server never entered the ShuttingDown state");
}
