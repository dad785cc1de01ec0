//! Error types surfaced to embedders.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors returned by [`Lifecycle`](crate::Lifecycle) operations. Shutdown
/// handler failures are logged and swallowed by the coordinator, never
/// surfaced here.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `die()` was called on a beacon that had already been retired.
    #[error("beacon {id} has already been retired")]
    BeaconAlreadyRetired { id: u64 },

    /// A beacon was requested after shutdown handlers had begun running.
    #[error("shutdown handlers have started, no further beacons may be created")]
    LifecycleFinalized,

    /// The probe server could not bind its listener.
    #[error("failed to bind probe server on {addr}")]
    ProbeBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
