//! In-flight-work beacons. Shutdown handlers do not run while any beacon is
//! live; each retirement is pushed to the coordinator through a watch channel.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::LifecycleError;

pub(crate) struct BeaconRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    live: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
    finalized: AtomicBool,
    count_tx: watch::Sender<usize>,
}

impl BeaconRegistry {
    pub(crate) fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(RegistryInner {
                live: Mutex::new(HashSet::new()),
                next_id: AtomicU64::new(0),
                finalized: AtomicBool::new(false),
                count_tx,
            }),
        }
    }

    /// Insert a new beacon. Succeeds at any point before the registry is
    /// finalized, including during the grace period and the drain wait.
    pub(crate) fn create(&self, context: Option<Value>) -> Result<Beacon, LifecycleError> {
        if self.inner.finalized.load(Ordering::SeqCst) {
            return Err(LifecycleError::LifecycleFinalized);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut live = self.inner.live.lock().expect("beacon registry lock poisoned");
            live.insert(id);
            self.inner.count_tx.send_replace(live.len());
        }
        debug!(beacon = id, context = ?context, "Lifecycle: beacon created");
        Ok(Beacon {
            id,
            context,
            registry: self.inner.clone(),
            retired: AtomicBool::new(false),
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        *self.inner.count_tx.borrow() == 0
    }

    /// Resolves once no live beacons remain; immediate if the set is empty.
    pub(crate) async fn await_empty(&self) {
        let mut rx = self.inner.count_tx.subscribe();
        // The sender lives in the registry, so the channel cannot close under us.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// After finalization, `create` fails with `LifecycleFinalized`.
    pub(crate) fn finalize(&self) {
        self.inner.finalized.store(true, Ordering::SeqCst);
    }
}

impl RegistryInner {
    fn retire(&self, id: u64) {
        let mut live = self.live.lock().expect("beacon registry lock poisoned");
        live.remove(&id);
        self.count_tx.send_replace(live.len());
    }
}

/// Token for one outstanding unit of work. Shutdown waits until every beacon
/// has been retired before running handlers. Dropping a beacon without calling
/// [`die`](Beacon::die) retires it with a warning, so a leaked token cannot
/// wedge shutdown.
pub struct Beacon {
    id: u64,
    context: Option<Value>,
    registry: Arc<RegistryInner>,
    retired: AtomicBool,
}

impl Beacon {
    /// Retire this beacon. A second call on the same beacon fails.
    pub fn die(&self) -> Result<(), LifecycleError> {
        if self.retired.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::BeaconAlreadyRetired { id: self.id });
        }
        self.registry.retire(self.id);
        debug!(beacon = self.id, context = ?self.context, "Lifecycle: beacon retired");
        Ok(())
    }
}

impl Drop for Beacon {
    fn drop(&mut self) {
        if !self.retired.swap(true, Ordering::SeqCst) {
            self.registry.retire(self.id);
            warn!(
                beacon = self.id,
                context = ?self.context,
                "Lifecycle: beacon dropped without die(), retiring"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn await_empty_is_immediate_when_no_beacons() {
        let registry = BeaconRegistry::new();
        assert!(registry.is_empty());
        registry.await_empty().await;
    }

    #[tokio::test]
    async fn retirement_unblocks_await_empty() {
        let registry = BeaconRegistry::new();
        let beacon = registry.create(None).expect("create failed");
        assert!(!registry.is_empty());

        let wait = {
            let inner = registry.inner.clone();
            tokio::spawn(async move {
                let mut rx = inner.count_tx.subscribe();
                let _ = rx.wait_for(|count| *count == 0).await;
            })
        };
        beacon.die().expect("die failed");
        tokio::time::timeout(std::time::Duration::from_secs(1), wait)
            .await
            .expect("await_empty never resolved")
            .expect("wait task panicked");
    }

    #[tokio::test]
    async fn drop_retires_outstanding_beacon() {
        let registry = BeaconRegistry::new();
        let beacon = registry.create(None).expect("create failed");
        drop(beacon);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn create_fails_after_finalize() {
        let registry = BeaconRegistry::new();
        registry.finalize();
        assert!(matches!(
            registry.create(None),
            Err(LifecycleError::LifecycleFinalized)
        ));
    }
}
