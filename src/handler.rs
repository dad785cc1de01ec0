//! Shutdown handler registry.

use std::future::Future;
use std::sync::Mutex;

use futures::future::BoxFuture;

/// Boxed cleanup action invoked once during shutdown. Failures are logged by
/// the coordinator and do not interrupt the remaining handlers.
pub type ShutdownHandler = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Append-only ordered list of shutdown handlers. The coordinator snapshots
/// the list exactly once; registration after the snapshot still succeeds but
/// those handlers are never invoked.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    handlers: Mutex<Vec<ShutdownHandler>>,
}

impl HandlerRegistry {
    pub(crate) fn register<F, Fut>(&self, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: ShutdownHandler = Box::new(move || Box::pin(handler()));
        self.handlers
            .lock()
            .expect("handler registry lock poisoned")
            .push(boxed);
    }

    /// Take every handler registered so far, in registration order.
    pub(crate) fn snapshot(&self) -> Vec<ShutdownHandler> {
        std::mem::take(
            &mut *self
                .handlers
                .lock()
                .expect("handler registry lock poisoned"),
        )
    }
}
