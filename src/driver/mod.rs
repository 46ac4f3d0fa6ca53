//! Driver core: dispatch loop, lifecycle and the host-facing provider
//!
//! 1. [`dispatcher`] - pulls streamer events and routes them
//! 2. [`lifecycle`] - typestate startup/shutdown ordering
//! 3. [`provider`] - host entry points wrapping the lifecycle
//!
//! # Threading
//!
//! ```text
//! host thread ──► DriverProvider::{init, run_frame, cleanup}
//!                      │ spawn / cancel + join
//!                      ▼
//! dispatch thread ──► EventDispatcher::run ──► DeviceRegistry ──► Host
//! ```

pub mod dispatcher;
pub mod lifecycle;
pub mod provider;

#[cfg(test)]
mod dispatcher_test;
#[cfg(test)]
mod lifecycle_test;

pub use dispatcher::{DispatchStats, EventDispatcher};
pub use lifecycle::{Driver, LifecycleState};
pub use provider::{DriverProvider, ProviderPhase};

use crate::streamer::StreamerError;

// Driver errors
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Initialization error: {0}")]
    InitializationError(#[from] StreamerError),

    #[error("Thread error: {0}")]
    ThreadError(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}
