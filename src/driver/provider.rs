//! Driver provider - host-facing entry points
//!
//! The host calls `init` once after loading the driver, `run_frame` on its own frame
//! schedule and `cleanup` before unloading. The provider owns the lifecycle machine
//! and keeps the registry reachable for host-thread reads in every phase.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::dispatcher::DispatchStats;
use super::lifecycle::{Driver, Running, Terminated, Uninitialized};
use super::DriverError;
use crate::config::DriverSettings;
use crate::device::DeviceRegistry;
use crate::host::{Host, HostEvent};
use crate::streamer::{GraphicsContext, Streamer};

/// Coarse phase as seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPhase {
    Uninitialized,
    Running,
    Terminated,
    Failed,
}

enum Stage {
    Uninitialized(Driver<Uninitialized>),
    Running(Driver<Running>),
    Terminated(Driver<Terminated>),
    Failed,
}

pub struct DriverProvider {
    stage: Stage,
    registry: Arc<RwLock<DeviceRegistry>>,
    graphics: GraphicsContext,
}

impl DriverProvider {
    pub fn new(
        settings: DriverSettings,
        streamer: Arc<dyn Streamer>,
        host: Arc<dyn Host>,
    ) -> Self {
        let driver = Driver::create(settings, streamer, host);
        Self {
            registry: driver.registry(),
            stage: Stage::Uninitialized(driver),
            graphics: GraphicsContext::default(),
        }
    }

    pub fn with_graphics(mut self, graphics: GraphicsContext) -> Self {
        self.graphics = graphics;
        self
    }

    pub fn phase(&self) -> ProviderPhase {
        match self.stage {
            Stage::Uninitialized(_) => ProviderPhase::Uninitialized,
            Stage::Running(_) => ProviderPhase::Running,
            Stage::Terminated(_) => ProviderPhase::Terminated,
            Stage::Failed => ProviderPhase::Failed,
        }
    }

    pub fn registry(&self) -> Arc<RwLock<DeviceRegistry>> {
        self.registry.clone()
    }

    /// Starts the driver. Only valid once, from the uninitialized phase.
    pub fn init(&mut self) -> Result<(), DriverError> {
        let stage = std::mem::replace(&mut self.stage, Stage::Failed);

        let driver = match stage {
            Stage::Uninitialized(driver) => driver,
            other => {
                self.stage = other;
                return Err(DriverError::InvalidStateTransition(format!(
                    "init called while {:?}",
                    self.phase()
                )));
            }
        };

        match driver.begin_initialization().initialize(self.graphics) {
            Ok(running) => {
                self.stage = Stage::Running(running);
                Ok(())
            }
            Err(e) => {
                // stage stays Failed; the host decides whether to reload us
                Err(e)
            }
        }
    }

    /// Stops the dispatcher and releases the streamer. Safe to call in any phase.
    pub fn cleanup(&mut self) {
        match std::mem::replace(&mut self.stage, Stage::Failed) {
            Stage::Running(driver) => {
                let terminated = driver.begin_shutdown().terminate();
                info!("Driver terminated");
                self.stage = Stage::Terminated(terminated);
            }
            Stage::Uninitialized(driver) => {
                debug!("Cleanup before init, nothing to release");
                self.stage = Stage::Uninitialized(driver);
            }
            Stage::Terminated(driver) => {
                debug!("Cleanup after termination, nothing to release");
                self.stage = Stage::Terminated(driver);
            }
            Stage::Failed => debug!("Cleanup after failed init, nothing to release"),
        }
    }

    /// Handles host events for this frame. Returns how many haptics requests were relayed.
    pub fn run_frame(&self, events: &[HostEvent]) -> usize {
        let Stage::Running(driver) = &self.stage else {
            if !events.is_empty() {
                warn!("Dropping {} host events outside the running phase", events.len());
            }
            return 0;
        };

        events
            .iter()
            .filter(|event| match event {
                HostEvent::HapticVibration { object_id, haptics } => {
                    driver.relay_haptics(*object_id, *haptics)
                }
                HostEvent::Other(kind) => {
                    debug!("Ignoring host event {}", kind);
                    false
                }
            })
            .count()
    }

    pub fn is_dispatching(&self) -> bool {
        match &self.stage {
            Stage::Running(driver) => driver.is_dispatching(),
            _ => false,
        }
    }

    pub fn dispatch_stats(&self) -> Option<DispatchStats> {
        match &self.stage {
            Stage::Terminated(driver) => driver.dispatch_stats().cloned(),
            _ => None,
        }
    }
}

impl Drop for DriverProvider {
    fn drop(&mut self) {
        if matches!(self.stage, Stage::Running(_)) {
            warn!("Driver dropped while running, shutting down");
            self.cleanup();
        }
    }
}
