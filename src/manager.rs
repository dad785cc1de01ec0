//! Lifecycle façade and shutdown coordinator: state transitions, beacon and
//! handler registries, probe server ownership, grace delay, and the timeout
//! watchdog.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info, warn};

use crate::beacon::{Beacon, BeaconRegistry};
use crate::error::LifecycleError;
use crate::handler::HandlerRegistry;
use crate::probes::ProbeServer;
use crate::signals;
use crate::state::{LifecycleState, StateCell};

/// Collaborator that forces process exit as the final shutdown step.
pub type Terminate = Arc<dyn Fn() + Send + Sync>;

/// Settle delay between resolving the shutdown completion and invoking the
/// terminate collaborator, so callers awaiting `shutdown()` observe completion
/// before the process exits.
const TERMINATE_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Options for creating a lifecycle manager.
#[derive(Clone)]
pub struct LifecycleOptions {
    /// HTTP probe port; 0 binds an OS-assigned ephemeral port.
    pub port: u16,
    /// Delay between a shutdown request and the ShuttingDown transition,
    /// letting upstream proxies stop routing before the probes flip.
    pub grace_period: Duration,
    /// Ceiling on the whole shutdown sequence before termination is forced.
    pub shutdown_timeout: Duration,
    /// Install signal listeners on start (default: true).
    pub trap_signals: bool,
    /// Signals that trigger shutdown.
    pub signals: Vec<SignalKind>,
    /// Invoked to force process exit; replaced with a recording stub in tests.
    pub terminate: Terminate,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            port: 9000,
            grace_period: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(60),
            trap_signals: true,
            signals: signals::default_signals(),
            terminate: Arc::new(|| std::process::exit(0)),
        }
    }
}

/// Lifecycle façade: owns the state machine, the registries, the probe server,
/// and the shutdown coordinator. Cheap to clone; every clone shares the same
/// instance, and independent instances (each with its own port) may coexist.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

struct LifecycleInner {
    state: Arc<StateCell>,
    beacons: BeaconRegistry,
    handlers: HandlerRegistry,
    shutdown_requested: CancellationToken,
    completed: CancellationToken,
    shutdown_started: AtomicBool,
    probe_addr: SocketAddr,
    probe_server: Mutex<Option<ProbeServer>>,
    grace_period: Duration,
    shutdown_timeout: Duration,
    terminate: Terminate,
}

impl Lifecycle {
    /// Bind the probe server and start the lifecycle in the NotReady state.
    pub async fn start(options: LifecycleOptions) -> Result<Self, LifecycleError> {
        let state = Arc::new(StateCell::new());
        let probe_server = ProbeServer::bind(options.port, state.clone()).await?;
        let probe_addr = probe_server.addr();
        info!(addr = %probe_addr, "Lifecycle: probe server listening");

        let lifecycle = Self {
            inner: Arc::new(LifecycleInner {
                state,
                beacons: BeaconRegistry::new(),
                handlers: HandlerRegistry::default(),
                shutdown_requested: CancellationToken::new(),
                completed: CancellationToken::new(),
                shutdown_started: AtomicBool::new(false),
                probe_addr,
                probe_server: Mutex::new(Some(probe_server)),
                grace_period: options.grace_period,
                shutdown_timeout: options.shutdown_timeout,
                terminate: options.terminate,
            }),
        };

        if options.trap_signals {
            let trap = lifecycle.clone();
            let kinds = options.signals;
            tokio::spawn(async move {
                signals::wait_for_shutdown_signal(&kinds).await;
                trap.initiate_shutdown("signal");
            });
        }

        Ok(lifecycle)
    }

    /// NotReady → Ready; no-op in any other state.
    pub fn signal_ready(&self) {
        if self.inner.state.signal_ready() {
            debug!("Lifecycle: server marked ready");
        }
    }

    /// Ready → NotReady; no-op in ShuttingDown.
    pub fn signal_not_ready(&self) {
        if self.inner.state.signal_not_ready() {
            debug!("Lifecycle: server marked not ready");
        }
    }

    /// True when the server is routable: Ready with no shutdown requested, or
    /// already ShuttingDown — readiness deliberately stays true while draining,
    /// matching the `/ready` probe. During the grace period this is false even
    /// if the pre-shutdown state was Ready.
    pub fn is_server_ready(&self) -> bool {
        match self.inner.state.get() {
            LifecycleState::Ready => !self.inner.shutdown_requested.is_cancelled(),
            LifecycleState::ShuttingDown => true,
            LifecycleState::NotReady => false,
        }
    }

    /// True once the grace period has elapsed and the state machine has
    /// entered ShuttingDown.
    pub fn is_server_shutting_down(&self) -> bool {
        self.inner.state.get() == LifecycleState::ShuttingDown
    }

    /// Bound address of the probe server, for orchestrator wiring and tests.
    pub fn probe_addr(&self) -> SocketAddr {
        self.inner.probe_addr
    }

    /// Append a cleanup action to run during shutdown. Handlers run
    /// sequentially in registration order; the coordinator snapshots the list
    /// once, so handlers registered after shutdown has begun are accepted but
    /// never invoked.
    pub fn register_shutdown_handler<F, Fut>(&self, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.handlers.register(handler);
    }

    /// Create a beacon marking one outstanding unit of work.
    pub fn create_beacon(&self) -> Result<Beacon, LifecycleError> {
        self.inner.beacons.create(None)
    }

    /// Create a beacon carrying an opaque context value for diagnostics.
    pub fn create_beacon_with_context(&self, context: Value) -> Result<Beacon, LifecycleError> {
        self.inner.beacons.create(Some(context))
    }

    /// Future that resolves when shutdown is first requested (before the grace
    /// period elapses). Use in `tokio::select!` to break out of work loops.
    pub fn shutdown_requested(&self) -> WaitForCancellationFutureOwned {
        self.inner.shutdown_requested.clone().cancelled_owned()
    }

    /// Initiate shutdown and return a future that resolves when the
    /// coordinator has run every handler and closed the probe server.
    /// Idempotent: repeat calls do not restart the sequence or re-run
    /// handlers, and every returned future resolves at the same point.
    pub fn shutdown(&self) -> impl Future<Output = ()> + Send + 'static {
        self.initiate_shutdown("requested");
        let completed = self.inner.completed.clone();
        async move { completed.cancelled_owned().await }
    }

    fn initiate_shutdown(&self, trigger_reason: &'static str) {
        if self.inner.shutdown_started.swap(true, Ordering::SeqCst) {
            debug!("Lifecycle: shutdown already in progress");
            return;
        }
        info!(trigger_reason, "Lifecycle: shutdown initiated");
        self.inner.shutdown_requested.cancel();

        let watchdog = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watchdog.completed.cancelled() => {}
                _ = tokio::time::sleep(watchdog.shutdown_timeout) => {
                    warn!(
                        timeout_secs = watchdog.shutdown_timeout.as_secs_f64(),
                        "Lifecycle: shutdown timeout exceeded, forcing termination"
                    );
                    (watchdog.terminate)();
                }
            }
        });

        tokio::spawn(run_shutdown(self.inner.clone()));
    }
}

/// The shutdown sequence: grace delay, state transition, beacon drain,
/// handlers in order, probe server close, deferred terminate. The watchdog
/// runs in parallel and is disarmed by the completion token.
async fn run_shutdown(inner: Arc<LifecycleInner>) {
    if !inner.grace_period.is_zero() {
        info!(
            grace_period_secs = inner.grace_period.as_secs_f64(),
            "Lifecycle: grace period started"
        );
        tokio::time::sleep(inner.grace_period).await;
        debug!("Lifecycle: grace period ended");
    }

    inner.state.enter_shutdown();

    if !inner.beacons.is_empty() {
        info!("Lifecycle: waiting for beacons to retire");
    }
    inner.beacons.await_empty().await;
    inner.beacons.finalize();

    let handlers = inner.handlers.snapshot();
    let total = handlers.len();
    for (index, handler) in handlers.into_iter().enumerate() {
        debug!(handler = index, total, "Lifecycle: invoking shutdown handler");
        match std::panic::AssertUnwindSafe(handler()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(handler = index, error = %error, "Lifecycle: shutdown handler failed");
            }
            Err(_) => {
                warn!(handler = index, "Lifecycle: shutdown handler panicked");
            }
        }
    }

    let probe_server = inner
        .probe_server
        .lock()
        .expect("probe server lock poisoned")
        .take();
    if let Some(server) = probe_server {
        server.close().await;
        info!("Lifecycle: probe server closed");
    }

    inner.completed.cancel();

    let terminate = inner.terminate.clone();
    tokio::spawn(async move {
        tokio::time::sleep(TERMINATE_SETTLE_DELAY).await;
        info!("Lifecycle: terminating process");
        (terminate)();
    });
}
