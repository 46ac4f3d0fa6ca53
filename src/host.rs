//! Host runtime boundary
//!
//! The host owns the canonical device list. The core only talks to it through the
//! [`Host`] trait: one-time registration, vendor notifications keyed by identity handle,
//! property writes, the play-area sink and restart/quit requests.
//!
//! [`ChannelHost`] is an in-process host that assigns handles itself and publishes every
//! call as a [`HostCommand`] on a tokio channel.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::device::{DeviceClass, DevicePath, ObjectId, Property, TrackedDevice};

/// Vendor events the core raises for a registered device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VendorEvent {
    WirelessReconnect,
    WirelessDisconnect,
}

// Play-area rectangle in meters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayAreaBounds {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Host rejected device {serial} ({class}): {reason}")]
    DeviceRejected {
        serial: String,
        class: DeviceClass,
        reason: String,
    },

    #[error("Unknown object id: {0}")]
    UnknownObject(ObjectId),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

/// Calls the core makes into the host runtime
#[cfg_attr(test, automock)]
pub trait Host: Send + Sync {
    /// One-time registration. The returned handle keys every later call for the device.
    /// Called with no registry lock held.
    fn add_device(
        &self,
        serial: &str,
        class: DeviceClass,
        device: TrackedDevice,
    ) -> Result<ObjectId, HostError>;

    fn notify(&self, object_id: ObjectId, event: VendorEvent);

    fn set_property(&self, object_id: ObjectId, property: &Property) -> Result<(), HostError>;

    fn set_chaperone(&self, bounds: PlayAreaBounds);

    fn request_restart(&self, reason: &str);

    fn request_quit(&self);
}

/// Haptics request raised by the host for a controller's haptics component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Haptics {
    pub duration_s: f32,
    pub frequency: f32,
    pub amplitude: f32,
}

/// Events the host hands to the driver once per frame
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    HapticVibration { object_id: ObjectId, haptics: Haptics },
    Other(u32),
}

/// Everything [`ChannelHost`] was asked to do, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    AddDevice {
        serial: String,
        class: DeviceClass,
        path: DevicePath,
        object_id: ObjectId,
    },
    Notify {
        object_id: ObjectId,
        event: VendorEvent,
    },
    SetProperty {
        object_id: ObjectId,
        property: Property,
    },
    SetChaperone(PlayAreaBounds),
    RequestRestart(String),
    RequestQuit,
}

/// In-process host publishing its calls on a channel
pub struct ChannelHost {
    command_sender: mpsc::Sender<HostCommand>,
    next_object_id: AtomicU32,
    devices: Mutex<HashMap<ObjectId, TrackedDevice>>,
    reject_competing_hmd: bool,
}

impl ChannelHost {
    pub fn new(command_sender: mpsc::Sender<HostCommand>, reject_competing_hmd: bool) -> Self {
        Self {
            command_sender,
            next_object_id: AtomicU32::new(0),
            devices: Mutex::new(HashMap::new()),
            reject_competing_hmd,
        }
    }

    /// Object registered under `object_id`, as the host would call back into it
    pub fn device(&self, object_id: ObjectId) -> Option<TrackedDevice> {
        self.devices.lock().get(&object_id).cloned()
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    fn publish(&self, command: HostCommand) -> Result<(), HostError> {
        match self.command_sender.try_send(command) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Failed to publish host command: {}", e);
                Err(HostError::ChannelError(e.to_string()))
            }
        }
    }
}

impl Host for ChannelHost {
    fn add_device(
        &self,
        serial: &str,
        class: DeviceClass,
        device: TrackedDevice,
    ) -> Result<ObjectId, HostError> {
        let mut devices = self.devices.lock();

        if class == DeviceClass::Hmd
            && self.reject_competing_hmd
            && devices.values().any(|d| d.class() == DeviceClass::Hmd)
        {
            return Err(HostError::DeviceRejected {
                serial: serial.to_string(),
                class,
                reason: "another HMD is already active".to_string(),
            });
        }

        let object_id = ObjectId(self.next_object_id.fetch_add(1, Ordering::Relaxed));
        let path = device.path();
        devices.insert(object_id, device);
        drop(devices);

        info!("Host registered {} {} as {}", class, serial, object_id);
        // registration stands even if nobody listens for the command
        let _ = self.publish(HostCommand::AddDevice {
            serial: serial.to_string(),
            class,
            path,
            object_id,
        });
        Ok(object_id)
    }

    fn notify(&self, object_id: ObjectId, event: VendorEvent) {
        debug!("Host notify {} {:?}", object_id, event);
        let _ = self.publish(HostCommand::Notify { object_id, event });
    }

    fn set_property(&self, object_id: ObjectId, property: &Property) -> Result<(), HostError> {
        if !self.devices.lock().contains_key(&object_id) {
            return Err(HostError::UnknownObject(object_id));
        }
        self.publish(HostCommand::SetProperty {
            object_id,
            property: property.clone(),
        })
    }

    fn set_chaperone(&self, bounds: PlayAreaBounds) {
        let _ = self.publish(HostCommand::SetChaperone(bounds));
    }

    fn request_restart(&self, reason: &str) {
        info!("Host restart requested: {}", reason);
        let _ = self.publish(HostCommand::RequestRestart(reason.to_string()));
    }

    fn request_quit(&self) {
        info!("Host quit requested");
        let _ = self.publish(HostCommand::RequestQuit);
    }
}

/// Drains whatever commands are queued without waiting
pub fn drain_commands(receiver: &mut mpsc::Receiver<HostCommand>) -> Vec<HostCommand> {
    let mut commands = Vec::new();
    while let Ok(command) = receiver.try_recv() {
        commands.push(command);
    }
    commands
}
