//! Driver lifecycle with statum state machine
//!
//! Startup and shutdown are strictly ordered with respect to the dispatcher thread.
//! Each phase is a distinct type, so a skipped transition does not compile.
//!
//! # State Machine
//!
//! ```text
//! Uninitialized ──► Initializing ──► Running ──► ShuttingDown ──► Terminated
//!                        │
//!                        └──► Err(DriverError)  (streamer failed, nothing left live)
//! ```
//!
//! # Ordering guarantees
//!
//! - the HMD exists (and registration was attempted) before the dispatcher reads an event
//! - nothing is registered with the host unless the dispatcher thread exists
//! - the dispatcher is joined before the streamer releases its resources

use parking_lot::RwLock;
use statum::{machine, state};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatcher::{DispatchStats, EventDispatcher};
use super::DriverError;
use crate::config::DriverSettings;
use crate::device::{DeviceObject, DevicePath, DeviceRegistry, Hmd, ObjectId};
use crate::host::{Haptics, Host};
use crate::streamer::{GraphicsContext, Streamer};

const DISPATCHER_THREAD_NAME: &str = "vrbridge-dispatch";

/// Lifecycle phases of the driver
#[state]
#[derive(Debug, Clone)]
pub enum LifecycleState {
    Uninitialized, // HMD object exists, nothing started
    Initializing,  // acquiring graphics context and streamer
    Running,       // HMD registration attempted, dispatcher live
    ShuttingDown,  // dispatcher stopped and joined
    Terminated,    // streamer resources released
}

/// Driver core with compile-time phase safety via statum
#[machine]
pub struct Driver<S: LifecycleState> {
    settings: DriverSettings,
    streamer: Arc<dyn Streamer>,
    host: Arc<dyn Host>,
    registry: Arc<RwLock<DeviceRegistry>>,
    cancel: CancellationToken,
    dispatcher: Option<JoinHandle<DispatchStats>>,
    dispatch_stats: Option<DispatchStats>,
}

impl<S: LifecycleState> Driver<S> {
    pub fn registry(&self) -> Arc<RwLock<DeviceRegistry>> {
        self.registry.clone()
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }
}

impl Driver<Uninitialized> {
    /// Builds the driver and its HMD singleton. No event is needed for the HMD to exist.
    pub fn create(
        settings: DriverSettings,
        streamer: Arc<dyn Streamer>,
        host: Arc<dyn Host>,
    ) -> Self {
        let hmd = Arc::new(Hmd::new(streamer.serial_number(DevicePath::HEAD)));
        info!("Creating driver with HMD {}", hmd.serial_number());
        let registry = Arc::new(RwLock::new(DeviceRegistry::new(hmd, host.clone())));

        Self::new(
            settings,
            streamer,
            host,
            registry,
            CancellationToken::new(),
            None, // dispatcher
            None, // dispatch_stats
        )
    }

    pub fn begin_initialization(self) -> Driver<Initializing> {
        debug!("Transitioning to Initializing");
        self.transition()
    }
}

impl Driver<Initializing> {
    /// Brings up the streamer, registers the HMD and starts the dispatcher.
    ///
    /// A streamer failure is fatal for this instance. HMD registration failure is not:
    /// the HMD keeps receiving updates, the host just never sees them.
    ///
    /// The dispatcher thread is spawned first but held at a start gate, so a failed
    /// spawn leaves nothing registered with the host and no event is read before the
    /// HMD registration was attempted.
    pub fn initialize(mut self, graphics: GraphicsContext) -> Result<Driver<Running>, DriverError> {
        info!("Initializing streamer");
        if let Err(e) = self.streamer.initialize(&graphics) {
            error!("Streamer initialization failed: {}", e);
            return Err(DriverError::InitializationError(e));
        }

        let dispatcher = EventDispatcher::new(
            self.streamer.event_source(),
            self.registry.clone(),
            self.host.clone(),
            self.settings.clone(),
        );
        let cancel = self.cancel.clone();
        let (start_tx, start_rx) = oneshot::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(DISPATCHER_THREAD_NAME.to_string())
            .spawn(move || match start_rx.blocking_recv() {
                Ok(()) => dispatcher.run(cancel),
                Err(_) => {
                    debug!("Dispatcher released without start signal");
                    DispatchStats::default()
                }
            });

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn dispatcher thread: {}", e);
                self.streamer.shutdown();
                return Err(DriverError::ThreadError(e.to_string()));
            }
        };

        if self.registry.read().register_hmd().is_none() {
            warn!("Continuing without host registration for the HMD");
        }

        if start_tx.send(()).is_err() {
            warn!("Dispatcher thread exited before start");
        }
        self.dispatcher = Some(handle);
        info!("Driver running");
        Ok(self.transition())
    }
}

impl Driver<Running> {
    pub fn is_dispatching(&self) -> bool {
        self.dispatcher
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Forwards a host haptics request to the streamer if it targets a controller
    pub fn relay_haptics(&self, object_id: ObjectId, haptics: Haptics) -> bool {
        let controller = self.registry.read().controller_for_object(object_id);
        match controller {
            Some(controller) => {
                self.streamer.send_haptics(controller.path(), haptics);
                true
            }
            None => {
                debug!("Haptics for {} does not belong to a controller", object_id);
                false
            }
        }
    }

    /// Signals the dispatcher and waits for it to finish
    pub fn begin_shutdown(mut self) -> Driver<ShuttingDown> {
        info!("Stopping event dispatcher");
        self.cancel.cancel();

        match self.dispatcher.take() {
            Some(handle) => match handle.join() {
                Ok(stats) => {
                    debug!("Dispatcher joined: {:?}", stats);
                    self.dispatch_stats = Some(stats);
                }
                Err(_) => error!("Dispatcher thread panicked"),
            },
            None => debug!("No dispatcher to join"),
        }

        self.transition()
    }
}

impl Driver<ShuttingDown> {
    pub fn terminate(self) -> Driver<Terminated> {
        info!("Releasing streamer resources");
        self.streamer.shutdown();
        self.transition()
    }
}

impl Driver<Terminated> {
    pub fn dispatch_stats(&self) -> Option<&DispatchStats> {
        self.dispatch_stats.as_ref()
    }
}
