//! Streaming subsystem boundary
//!
//! The streamer produces typed device and configuration events and consumes haptics.
//! It is an external collaborator; this module only fixes the call contract:
//!
//! 1. [`Streamer`] - initialization, serial numbers, haptics, teardown
//! 2. [`EventSource`] - blocking "next event or timeout" pull
//! 3. [`loopback`] - channel-backed implementation for the demo binary and tests
//!
//! # Event flow
//!
//! ```text
//! Streamer ──► EventSource::read_event(timeout) ──► DriverEvent ──► EventDispatcher
//! ```

pub mod loopback;

use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::device::{
    ButtonEntry, DeviceMotion, DevicePath, DeviceProfile, HandType, Pose, Property, VideoConfig,
    ViewsConfig, HAND_SKELETON_JOINT_COUNT,
};
use crate::host::{Haptics, PlayAreaBounds};

pub use loopback::{ChannelEventSource, EventSender, LoopbackStreamer};

// Events produced by the streaming subsystem
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    DeviceConnected(DeviceProfile),
    DeviceDisconnected(DevicePath),
    OpenvrPropertyChanged {
        path: DevicePath,
        property: Property,
    },
    VideoConfigUpdated(VideoConfig),
    ViewsConfigUpdated(ViewsConfig),
    DevicePoseUpdated {
        path: DevicePath,
        motion: DeviceMotion,
        timestamp_ns: u64,
    },
    ButtonUpdated(ButtonEntry),
    HandSkeletonUpdated {
        hand: HandType,
        joints: Box<[Pose; HAND_SKELETON_JOINT_COUNT]>,
        timestamp_ns: u64,
    },
    BatteryUpdated {
        path: DevicePath,
        value: f32,
    },
    BoundsUpdated(PlayAreaBounds),
    RestartRequested,
    ShutdownRequested,
    // Tag the core does not know; dropped by the dispatcher
    Unrecognized(u32),
}

impl DriverEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DriverEvent::DeviceConnected(_) => "DeviceConnected",
            DriverEvent::DeviceDisconnected(_) => "DeviceDisconnected",
            DriverEvent::OpenvrPropertyChanged { .. } => "OpenvrPropertyChanged",
            DriverEvent::VideoConfigUpdated(_) => "VideoConfigUpdated",
            DriverEvent::ViewsConfigUpdated(_) => "ViewsConfigUpdated",
            DriverEvent::DevicePoseUpdated { .. } => "DevicePoseUpdated",
            DriverEvent::ButtonUpdated(_) => "ButtonUpdated",
            DriverEvent::HandSkeletonUpdated { .. } => "HandSkeletonUpdated",
            DriverEvent::BatteryUpdated { .. } => "BatteryUpdated",
            DriverEvent::BoundsUpdated(_) => "BoundsUpdated",
            DriverEvent::RestartRequested => "RestartRequested",
            DriverEvent::ShutdownRequested => "ShutdownRequested",
            DriverEvent::Unrecognized(_) => "Unrecognized",
        }
    }
}

/// Graphics interop handles passed to the streamer on initialization
///
/// On Vulkan hosts this carries the device proc-address entry point; elsewhere it stays
/// empty and the streamer creates its own context.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphicsContext {
    pub vk_get_device_proc_addr: Option<usize>,
}

// Streamer errors
#[derive(Debug, thiserror::Error)]
pub enum StreamerError {
    #[error("Failed to initialize streamer: {0}")]
    InitializationError(String),

    #[error("Event channel closed: {0}")]
    ChannelClosed(String),
}

/// Blocking pull of the next event
#[cfg_attr(test, automock)]
pub trait EventSource: Send + Sync {
    /// Waits at most `timeout`; `None` means nothing arrived in time.
    fn read_event(&self, timeout: Duration) -> Option<DriverEvent>;
}

#[cfg_attr(test, automock)]
pub trait Streamer: Send + Sync {
    fn initialize(&self, graphics: &GraphicsContext) -> Result<(), StreamerError>;

    fn event_source(&self) -> Arc<dyn EventSource>;

    fn serial_number(&self, path: DevicePath) -> String;

    fn send_haptics(&self, path: DevicePath, haptics: Haptics);

    /// Releases subsystem resources. Only called once the dispatcher has stopped.
    fn shutdown(&self);
}
