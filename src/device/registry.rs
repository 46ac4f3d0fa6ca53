//! Device registry - path lookup and creation policy
//!
//! The registry owns every device object through three containers: the HMD singleton,
//! two optional controller slots and a growable tracker list. Each tracker is its own
//! allocation, so growing the list never moves an object a lookup or the host still
//! refers to. The path map only stores [`DeviceSlot`] keys into those containers.
//!
//! # Churn policy
//!
//! ```text
//! CONNECT(path)  unknown ──► create + insert slot ──► host.add_device
//!                known   ──► mark connected ──► host.notify(WirelessReconnect)
//! ```
//!
//! A connect is split at the arrow into the host: [`DeviceRegistry::insert_or_reconnect`]
//! needs `&mut self`, while [`PendingConnect::complete`] only needs the host, so the
//! dispatcher calls into the host without holding the registry write lock.
//!
//! ```text
//! DISCONNECT     known   ──► host.notify(WirelessDisconnect), clear pose, mark disconnected
//!                unknown ──► no-op
//! ```
//!
//! Entries are never removed; the host's identity handle has to stay valid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::controller::ButtonEntry;
use super::{
    Controller, DeviceClass, DeviceMotion, DeviceObject, DevicePath, GenericTracker, HandType,
    Hmd, InteractionProfile, ObjectId, Pose, Property, TrackedDevice, HAND_SKELETON_JOINT_COUNT,
};
use crate::host::{Host, VendorEvent};

/// Payload of a connect event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub top_level_path: DevicePath,
    pub interaction_profile: u64,
    pub serial_number: String,
}

// Key into the owning containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceSlot {
    Hmd,
    LeftController,
    RightController,
    GenericTracker(usize),
}

/// What a connect event resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Created { object_id: Option<ObjectId> },
    Reconnected { object_id: Option<ObjectId> },
}

/// Connect whose host side is still outstanding
#[derive(Debug)]
pub enum PendingConnect {
    Created { device: TrackedDevice, serial: String },
    Reconnected(TrackedDevice),
}

impl PendingConnect {
    /// Registers a new object with the host or notifies it of a reconnect
    pub fn complete(self, host: &dyn Host) -> ConnectOutcome {
        match self {
            PendingConnect::Created { device, serial } => {
                let class = device.class();
                let path = device.path();
                let object_id = match host.add_device(&serial, class, device.clone()) {
                    Ok(object_id) => {
                        device.as_object().assign_object_id(object_id);
                        info!("Created {} {} ({}) as {}", class, path, serial, object_id);
                        Some(object_id)
                    }
                    Err(e) => {
                        warn!(
                            "Host registration of {} {} failed, device stays unobserved: {}",
                            class, path, e
                        );
                        None
                    }
                };
                ConnectOutcome::Created { object_id }
            }
            PendingConnect::Reconnected(device) => {
                let object_id = device.object_id();
                match object_id {
                    Some(id) => host.notify(id, VendorEvent::WirelessReconnect),
                    None => debug!(
                        "Reconnect of unregistered device {}, host not notified",
                        device.path()
                    ),
                }
                ConnectOutcome::Reconnected { object_id }
            }
        }
    }
}

pub struct DeviceRegistry {
    host: Arc<dyn Host>,
    hmd: Arc<Hmd>,
    left_controller: Option<Arc<Controller>>,
    right_controller: Option<Arc<Controller>>,
    generic_trackers: Vec<Arc<GenericTracker>>,
    tracked_devices: HashMap<DevicePath, DeviceSlot>,
}

impl DeviceRegistry {
    /// Creates the registry with the HMD already in place under the head path
    pub fn new(hmd: Arc<Hmd>, host: Arc<dyn Host>) -> Self {
        let mut tracked_devices = HashMap::new();
        tracked_devices.insert(DevicePath::HEAD, DeviceSlot::Hmd);

        Self {
            host,
            hmd,
            left_controller: None,
            right_controller: None,
            generic_trackers: Vec::new(),
            tracked_devices,
        }
    }

    pub fn hmd(&self) -> &Arc<Hmd> {
        &self.hmd
    }

    pub fn left_controller(&self) -> Option<&Arc<Controller>> {
        self.left_controller.as_ref()
    }

    pub fn right_controller(&self) -> Option<&Arc<Controller>> {
        self.right_controller.as_ref()
    }

    pub fn generic_trackers(&self) -> &[Arc<GenericTracker>] {
        &self.generic_trackers
    }

    /// Number of live entries, the HMD included
    pub fn len(&self) -> usize {
        self.tracked_devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked_devices.is_empty()
    }

    pub fn contains(&self, path: DevicePath) -> bool {
        self.tracked_devices.contains_key(&path)
    }

    pub fn lookup(&self, path: DevicePath) -> Option<TrackedDevice> {
        let slot = self.tracked_devices.get(&path)?;
        self.resolve(*slot)
    }

    fn resolve(&self, slot: DeviceSlot) -> Option<TrackedDevice> {
        match slot {
            DeviceSlot::Hmd => Some(TrackedDevice::Hmd(self.hmd.clone())),
            DeviceSlot::LeftController => self
                .left_controller
                .clone()
                .map(TrackedDevice::Controller),
            DeviceSlot::RightController => self
                .right_controller
                .clone()
                .map(TrackedDevice::Controller),
            DeviceSlot::GenericTracker(index) => self
                .generic_trackers
                .get(index)
                .cloned()
                .map(TrackedDevice::GenericTracker),
        }
    }

    /// Registers the HMD with the host. A refusal leaves the HMD live but unobserved.
    pub fn register_hmd(&self) -> Option<ObjectId> {
        if let Some(object_id) = self.hmd.object_id() {
            debug!("HMD already registered as {}", object_id);
            return Some(object_id);
        }

        let serial = self.hmd.serial_number().to_string();
        match self
            .host
            .add_device(&serial, DeviceClass::Hmd, TrackedDevice::Hmd(self.hmd.clone()))
        {
            Ok(object_id) => {
                self.hmd.assign_object_id(object_id);
                info!("HMD {} registered as {}", serial, object_id);
                Some(object_id)
            }
            Err(e) => {
                warn!(
                    "HMD registration failed, continuing with an unobserved HMD: {}",
                    e
                );
                None
            }
        }
    }

    /// First connect creates and registers the object; later connects only notify.
    ///
    /// The interaction profile is fixed at first connect. A reconnect reporting a
    /// different profile keeps the original one.
    pub fn register_or_reconnect(&mut self, profile: &DeviceProfile) -> ConnectOutcome {
        let pending = self.insert_or_reconnect(profile);
        pending.complete(self.host.as_ref())
    }

    /// Structural half of a connect: creates and inserts the object, or marks a known
    /// one connected. Host calls are left to [`PendingConnect::complete`] so callers can
    /// make them after releasing the registry lock.
    pub fn insert_or_reconnect(&mut self, profile: &DeviceProfile) -> PendingConnect {
        let path = profile.top_level_path;

        if let Some(device) = self.lookup(path) {
            if let TrackedDevice::Controller(controller) = &device {
                let reported = InteractionProfile::from_id(profile.interaction_profile);
                if reported != controller.interaction_profile() {
                    info!(
                        "Controller {} reconnected with profile {}, keeping {}",
                        path,
                        reported,
                        controller.interaction_profile()
                    );
                }
            }

            device.as_object().set_connected(true);
            info!("Device {} reconnected", path);
            return PendingConnect::Reconnected(device);
        }

        let serial = if profile.serial_number.is_empty() {
            path.to_string()
        } else {
            profile.serial_number.clone()
        };

        let (device, slot) = match path.hand() {
            Some(hand) => {
                let controller = Arc::new(Controller::new(
                    hand,
                    InteractionProfile::from_id(profile.interaction_profile),
                    serial.clone(),
                ));
                let slot = match hand {
                    HandType::Left => {
                        self.left_controller = Some(controller.clone());
                        DeviceSlot::LeftController
                    }
                    HandType::Right => {
                        self.right_controller = Some(controller.clone());
                        DeviceSlot::RightController
                    }
                };
                (TrackedDevice::Controller(controller), slot)
            }
            None => {
                let tracker = Arc::new(GenericTracker::new(path, serial.clone()));
                self.generic_trackers.push(tracker.clone());
                (
                    TrackedDevice::GenericTracker(tracker),
                    DeviceSlot::GenericTracker(self.generic_trackers.len() - 1),
                )
            }
        };
        self.tracked_devices.insert(path, slot);

        PendingConnect::Created { device, serial }
    }

    /// Returns false for unknown paths, which are ignored
    pub fn disconnect(&self, path: DevicePath) -> bool {
        let Some(device) = self.lookup(path) else {
            debug!("Disconnect for unknown device {}, ignoring", path);
            return false;
        };

        let object = device.as_object();
        if let Some(object_id) = object.object_id() {
            self.host.notify(object_id, VendorEvent::WirelessDisconnect);
        }
        object.clear_pose();
        object.set_connected(false);
        info!("Device {} disconnected", path);
        true
    }

    pub fn set_property(&self, path: DevicePath, property: Property) -> bool {
        match self.lookup(path) {
            Some(device) => {
                device.as_object().set_prop(property, self.host.as_ref());
                true
            }
            None => {
                debug!("Property {:?} for unknown device {}, ignoring", property.key, path);
                false
            }
        }
    }

    pub fn update_pose(&self, path: DevicePath, motion: DeviceMotion, timestamp_ns: u64) -> bool {
        match self.lookup(path) {
            Some(device) => {
                device.as_object().update_pose(motion, timestamp_ns);
                true
            }
            None => false,
        }
    }

    /// Offers the update to both controller slots. Returns whether one accepted it.
    pub fn update_button(&self, entry: &ButtonEntry) -> bool {
        let left = self
            .left_controller
            .as_ref()
            .is_some_and(|c| c.try_update_button(entry));
        let right = self
            .right_controller
            .as_ref()
            .is_some_and(|c| c.try_update_button(entry));

        if !left && !right {
            debug!("Button {:016x} not accepted by any controller", entry.path_id);
        }
        left || right
    }

    pub fn update_hand_skeleton(
        &self,
        hand: HandType,
        joints: [Pose; HAND_SKELETON_JOINT_COUNT],
        timestamp_ns: u64,
    ) -> bool {
        let controller = match hand {
            HandType::Left => self.left_controller.as_ref(),
            HandType::Right => self.right_controller.as_ref(),
        };

        match controller {
            Some(controller) => {
                controller.update_hand_skeleton(joints, timestamp_ns);
                true
            }
            None => {
                debug!("Hand skeleton for missing {:?} controller, dropping", hand);
                false
            }
        }
    }

    /// Battery goes straight to the host's property store, not the device's map
    pub fn set_battery(&self, path: DevicePath, percentage: f32) -> bool {
        let Some(object_id) = self.lookup(path).and_then(|d| d.object_id()) else {
            debug!("Battery update for unknown or unregistered device {}", path);
            return false;
        };

        if let Err(e) = self.host.set_property(object_id, &Property::battery(percentage)) {
            warn!("Failed to set battery of {}: {}", path, e);
        }
        true
    }

    /// Controller owning a host handle, used to route host haptics back
    pub fn controller_for_object(&self, object_id: ObjectId) -> Option<Arc<Controller>> {
        [self.left_controller.as_ref(), self.right_controller.as_ref()]
            .into_iter()
            .flatten()
            .find(|c| c.object_id() == Some(object_id))
            .cloned()
    }
}
