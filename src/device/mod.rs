//! Tracked device state objects
//!
//! Every physical entity the streamer reports gets exactly one state object for the
//! lifetime of the process:
//!
//! 1. [`hmd`] - the head-mounted display singleton, created with the driver
//! 2. [`controller`] - left/right hand controllers, created on first connect
//! 3. [`generic_tracker`] - any other tracked path, created on first connect
//! 4. [`registry`] - path lookup, creation policy and event routing
//!
//! # Architecture
//!
//! ```text
//! DevicePath ──► DeviceRegistry ──► TrackedDevice ──► {Hmd, Controller, GenericTracker}
//!                 (slot keys)        (Arc handles)         (per-object locks)
//! ```
//!
//! Objects are shared with the host thread through `Arc`, and all mutable state sits
//! behind a per-object lock so host reads never race the dispatcher.

pub mod controller;
pub mod generic_tracker;
pub mod hmd;
pub mod profile;
pub mod registry;


use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

pub use controller::{
    ButtonEntry, ButtonValue, Controller, HandSkeleton, HAND_SKELETON_JOINT_COUNT,
};
pub use generic_tracker::GenericTracker;
pub use hmd::{Fov, Hmd, VideoConfig, ViewsConfig};
pub use profile::{HandType, InteractionProfile};
pub use registry::{ConnectOutcome, DeviceProfile, DeviceRegistry, PendingConnect};

use crate::host::Host;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a, usable in const context so well-known paths are constants.
pub const fn hash_path(path: &str) -> u64 {
    let bytes = path.as_bytes();
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

pub const HEAD_PATH_STR: &str = "/user/head";
pub const LEFT_HAND_PATH_STR: &str = "/user/hand/left";
pub const RIGHT_HAND_PATH_STR: &str = "/user/hand/right";

/// Stable identifier of a logical device slot
///
/// Survives connect/disconnect churn. The three well-known paths are constants; any
/// other path (body trackers, props) is hashed from its string form at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DevicePath(pub u64);

impl DevicePath {
    pub const HEAD: DevicePath = DevicePath(hash_path(HEAD_PATH_STR));
    pub const LEFT_HAND: DevicePath = DevicePath(hash_path(LEFT_HAND_PATH_STR));
    pub const RIGHT_HAND: DevicePath = DevicePath(hash_path(RIGHT_HAND_PATH_STR));

    pub fn from_path(path: &str) -> Self {
        DevicePath(hash_path(path))
    }

    /// Class of the object that gets created for this path on first connect
    pub fn device_class(&self) -> DeviceClass {
        match *self {
            DevicePath::HEAD => DeviceClass::Hmd,
            DevicePath::LEFT_HAND | DevicePath::RIGHT_HAND => DeviceClass::Controller,
            _ => DeviceClass::GenericTracker,
        }
    }

    pub fn hand(&self) -> Option<HandType> {
        match *self {
            DevicePath::LEFT_HAND => Some(HandType::Left),
            DevicePath::RIGHT_HAND => Some(HandType::Right),
            _ => None,
        }
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DevicePath::HEAD => write!(f, "{}", HEAD_PATH_STR),
            DevicePath::LEFT_HAND => write!(f, "{}", LEFT_HAND_PATH_STR),
            DevicePath::RIGHT_HAND => write!(f, "{}", RIGHT_HAND_PATH_STR),
            DevicePath(id) => write!(f, "tracker:{:016x}", id),
        }
    }
}

/// Host-side device class used on registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Hmd,
    Controller,
    GenericTracker,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Hmd => write!(f, "HMD"),
            DeviceClass::Controller => write!(f, "Controller"),
            DeviceClass::GenericTracker => write!(f, "GenericTracker"),
        }
    }
}

/// Identity handle assigned by the host on first registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// Position in meters, orientation as a unit quaternion (x, y, z, w)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub orientation: [f32; 4],
    pub position: [f32; 3],
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            orientation: [0.0, 0.0, 0.0, 1.0],
            position: [0.0; 3],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMotion {
    pub pose: Pose,
    pub linear_velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
}

/// Last pose reported for a device, with the streamer's timestamp
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedPose {
    pub motion: DeviceMotion,
    pub timestamp_ns: u64,
}

/// Host property keys the core touches directly. Everything else passes through as raw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    DeviceBatteryPercentage,
    Raw(u32),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Float(f32),
    Int32(i32),
    Uint64(u64),
    Double(f64),
    Vector3([f32; 3]),
    String(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: PropertyKey,
    pub value: PropertyValue,
}

impl Property {
    pub fn battery(percentage: f32) -> Self {
        Self {
            key: PropertyKey::DeviceBatteryPercentage,
            value: PropertyValue::Float(percentage),
        }
    }
}

/// State every device kind carries
///
/// The identity handle is written once; pose and properties are guarded separately so a
/// pose update never waits on a property write from the other thread.
#[derive(Debug)]
pub struct DeviceCommon {
    path: DevicePath,
    serial_number: String,
    object_id: OnceLock<ObjectId>,
    connected: AtomicBool,
    pose: RwLock<Option<TimedPose>>,
    properties: RwLock<HashMap<PropertyKey, PropertyValue>>,
}

impl DeviceCommon {
    pub fn new(path: DevicePath, serial_number: impl Into<String>) -> Self {
        Self {
            path,
            serial_number: serial_number.into(),
            object_id: OnceLock::new(),
            connected: AtomicBool::new(true),
            pose: RwLock::new(None),
            properties: RwLock::new(HashMap::new()),
        }
    }
}

/// Capability set shared by all device kinds
///
/// Implementors only expose their [`DeviceCommon`]; the behavior lives in the provided
/// methods so every kind handles poses and properties identically.
pub trait DeviceObject: Send + Sync {
    fn common(&self) -> &DeviceCommon;

    fn class(&self) -> DeviceClass;

    fn path(&self) -> DevicePath {
        self.common().path
    }

    fn serial_number(&self) -> &str {
        &self.common().serial_number
    }

    fn object_id(&self) -> Option<ObjectId> {
        self.common().object_id.get().copied()
    }

    /// Stores the host handle. Returns false if one was already assigned.
    fn assign_object_id(&self, object_id: ObjectId) -> bool {
        match self.common().object_id.set(object_id) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "Device {} already has identity handle {:?}, ignoring {}",
                    self.path(),
                    self.object_id(),
                    object_id
                );
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.common().connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        self.common().connected.store(connected, Ordering::Release);
    }

    /// Last write wins by arrival; the timestamp is stored, not compared.
    fn update_pose(&self, motion: DeviceMotion, timestamp_ns: u64) {
        *self.common().pose.write() = Some(TimedPose {
            motion,
            timestamp_ns,
        });
    }

    fn clear_pose(&self) {
        debug!("Clearing pose of {}", self.path());
        *self.common().pose.write() = None;
    }

    fn pose(&self) -> Option<TimedPose> {
        *self.common().pose.read()
    }

    /// Records the value and mirrors it to the host when the device is registered.
    /// A failing host call is logged and otherwise ignored.
    fn set_prop(&self, property: Property, host: &dyn Host) {
        self.common()
            .properties
            .write()
            .insert(property.key, property.value.clone());

        if let Some(object_id) = self.object_id() {
            if let Err(e) = host.set_property(object_id, &property) {
                warn!(
                    "Host rejected property {:?} for {}: {}",
                    property.key,
                    self.path(),
                    e
                );
            }
        }
    }

    fn property(&self, key: PropertyKey) -> Option<PropertyValue> {
        self.common().properties.read().get(&key).cloned()
    }
}

/// Closed set of device kinds, handed to lookups and to the host
///
/// Cloning only bumps reference counts; the object behind it never moves.
#[derive(Clone, Debug)]
pub enum TrackedDevice {
    Hmd(Arc<Hmd>),
    Controller(Arc<Controller>),
    GenericTracker(Arc<GenericTracker>),
}

impl TrackedDevice {
    pub fn as_object(&self) -> &dyn DeviceObject {
        match self {
            TrackedDevice::Hmd(hmd) => hmd.as_ref(),
            TrackedDevice::Controller(controller) => controller.as_ref(),
            TrackedDevice::GenericTracker(tracker) => tracker.as_ref(),
        }
    }

    pub fn as_controller(&self) -> Option<&Arc<Controller>> {
        match self {
            TrackedDevice::Controller(controller) => Some(controller),
            _ => None,
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.as_object().class()
    }

    pub fn path(&self) -> DevicePath {
        self.as_object().path()
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        self.as_object().object_id()
    }

    pub fn pose(&self) -> Option<TimedPose> {
        self.as_object().pose()
    }

    pub fn is_connected(&self) -> bool {
        self.as_object().is_connected()
    }

    pub fn property(&self, key: PropertyKey) -> Option<PropertyValue> {
        self.as_object().property(key)
    }

    /// Same underlying object, not just equal state
    pub fn ptr_eq(&self, other: &TrackedDevice) -> bool {
        match (self, other) {
            (TrackedDevice::Hmd(a), TrackedDevice::Hmd(b)) => Arc::ptr_eq(a, b),
            (TrackedDevice::Controller(a), TrackedDevice::Controller(b)) => Arc::ptr_eq(a, b),
            (TrackedDevice::GenericTracker(a), TrackedDevice::GenericTracker(b)) => {
                Arc::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}
