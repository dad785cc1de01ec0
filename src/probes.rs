//! Kubernetes probe surface: `/health`, `/live`, and `/ready`. Responses are
//! pure functions of the lifecycle state; bodies are the plain-text state
//! literals the orchestrator keys on.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::LifecycleError;
use crate::state::{LifecycleState, StateCell};

/// Keep-alive sockets get this long to drain after close before the serve
/// task is aborted.
const CLOSE_DRAIN_BOUND: Duration = Duration::from_secs(1);

const SERVER_IS_NOT_READY: &str = "SERVER_IS_NOT_READY";
const SERVER_IS_READY: &str = "SERVER_IS_READY";
const SERVER_IS_SHUTTING_DOWN: &str = "SERVER_IS_SHUTTING_DOWN";
const SERVER_IS_NOT_SHUTTING_DOWN: &str = "SERVER_IS_NOT_SHUTTING_DOWN";

/// Minimal HTTP server answering the three probe paths from the shared state
/// cell. Listens from construction until the shutdown coordinator closes it.
pub(crate) struct ProbeServer {
    addr: SocketAddr,
    close: CancellationToken,
    serve_task: JoinHandle<()>,
}

impl ProbeServer {
    /// Bind the probe listener; port 0 requests an OS-assigned ephemeral port.
    pub(crate) async fn bind(port: u16, state: Arc<StateCell>) -> Result<Self, LifecycleError> {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| LifecycleError::ProbeBind {
                addr: bind_addr,
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| LifecycleError::ProbeBind {
                addr: bind_addr,
                source,
            })?;

        let close = CancellationToken::new();
        let shutdown = close.clone().cancelled_owned();
        let app = router(state);
        let serve_task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(%error, "Lifecycle: probe server failed");
            }
        });

        Ok(Self {
            addr,
            close,
            serve_task,
        })
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and drain keep-alive sockets within [`CLOSE_DRAIN_BOUND`];
    /// stragglers are aborted.
    pub(crate) async fn close(self) {
        self.close.cancel();
        let mut serve_task = self.serve_task;
        if tokio::time::timeout(CLOSE_DRAIN_BOUND, &mut serve_task)
            .await
            .is_err()
        {
            serve_task.abort();
        }
    }
}

fn router(state: Arc<StateCell>) -> Router {
    Router::new()
        .route("/health", any(health))
        .route("/live", any(live))
        .route("/ready", any(ready))
        .fallback(not_found)
        .with_state(state)
}

async fn health(method: Method, State(state): State<Arc<StateCell>>) -> Response {
    if method != Method::GET {
        return StatusCode::NOT_FOUND.into_response();
    }
    match state.get() {
        LifecycleState::NotReady => (StatusCode::INTERNAL_SERVER_ERROR, SERVER_IS_NOT_READY),
        LifecycleState::Ready => (StatusCode::OK, SERVER_IS_READY),
        LifecycleState::ShuttingDown => {
            (StatusCode::INTERNAL_SERVER_ERROR, SERVER_IS_SHUTTING_DOWN)
        }
    }
    .into_response()
}

async fn live(method: Method, State(state): State<Arc<StateCell>>) -> Response {
    if method != Method::GET {
        return StatusCode::NOT_FOUND.into_response();
    }
    match state.get() {
        LifecycleState::ShuttingDown => {
            (StatusCode::INTERNAL_SERVER_ERROR, SERVER_IS_SHUTTING_DOWN)
        }
        _ => (StatusCode::OK, SERVER_IS_NOT_SHUTTING_DOWN),
    }
    .into_response()
}

async fn ready(method: Method, State(state): State<Arc<StateCell>>) -> Response {
    if method != Method::GET {
        return StatusCode::NOT_FOUND.into_response();
    }
    match state.get() {
        LifecycleState::NotReady => (StatusCode::INTERNAL_SERVER_ERROR, SERVER_IS_NOT_READY),
        // Readiness stays 200 while shutting down: the pod must remain routable
        // for connections the proxies are still draining. /health carries the
        // unhealthy signal during that window.
        LifecycleState::Ready | LifecycleState::ShuttingDown => (StatusCode::OK, SERVER_IS_READY),
    }
    .into_response()
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
