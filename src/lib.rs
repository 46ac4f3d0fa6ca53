//! vrbridge - tracked-device core between a streaming subsystem and a VR host runtime
//!
//! The streamer produces device events, the [`driver`] dispatches them into the
//! [`device`] registry and the registry mirrors what the host needs through [`host`].

pub mod config;
pub mod device;
pub mod driver;
pub mod host;
pub mod streamer;

pub use config::{ConfigError, DriverSettings};
pub use driver::{DriverError, DriverProvider, ProviderPhase};
