//! Process-embedded Kubernetes lifecycle manager: HTTP probe endpoints driven by
//! a lifecycle state machine, and a graceful-shutdown protocol that coordinates
//! user-registered cleanup handlers, in-flight-work beacons, and a pre-shutdown
//! grace delay so upstream proxies stop routing traffic before the process does.
//!
//! The orchestrator probes `/health`, `/live`, and `/ready`; their responses are
//! pure functions of the lifecycle state. Shutdown waits for every live beacon
//! to retire, then runs handlers sequentially in registration order, closes the
//! probe server, and finally invokes the terminate collaborator.
//!
//! ```no_run
//! use lifeline::{Lifecycle, LifecycleOptions};
//!
//! # async fn example() -> Result<(), lifeline::LifecycleError> {
//! let lifecycle = Lifecycle::start(LifecycleOptions::default()).await?;
//! lifecycle.register_shutdown_handler(|| async {
//!     // flush buffers, close connections
//!     Ok(())
//! });
//! lifecycle.signal_ready();
//! # Ok(())
//! # }
//! ```

mod beacon;
mod error;
mod handler;
mod manager;
mod probes;
mod signals;
mod state;

pub use beacon::Beacon;
pub use error::LifecycleError;
pub use handler::ShutdownHandler;
pub use manager::{Lifecycle, LifecycleOptions, Terminate};
pub use signals::{default_signals, wait_for_shutdown_signal};
pub use state::LifecycleState;
