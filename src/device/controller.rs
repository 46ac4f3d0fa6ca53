//! Hand controllers
//!
//! The interaction profile is fixed at construction. It determines the button table the
//! controller accepts from broadcast button updates; ids outside that table belong to the
//! other hand or to a different profile and are refused.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use super::profile::ComponentKind;
use super::{DeviceClass, DeviceCommon, DeviceObject, DevicePath, HandType, InteractionProfile, Pose};

pub const HAND_SKELETON_JOINT_COUNT: usize = 26;

// Button value
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ButtonValue {
    Binary(bool),
    Scalar(f32),
}

/// Button update as reported by the streamer: component id plus value
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ButtonEntry {
    pub path_id: u64,
    pub value: ButtonValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandSkeleton {
    pub joints: [Pose; HAND_SKELETON_JOINT_COUNT],
    pub timestamp_ns: u64,
}

#[derive(Debug)]
pub struct Controller {
    common: DeviceCommon,
    hand: HandType,
    interaction_profile: InteractionProfile,
    buttons: HashMap<u64, (String, ComponentKind)>,
    button_states: RwLock<HashMap<u64, ButtonValue>>,
    hand_skeleton: RwLock<Option<HandSkeleton>>,
}

impl Controller {
    pub fn new(
        hand: HandType,
        interaction_profile: InteractionProfile,
        serial_number: impl Into<String>,
    ) -> Self {
        let path = match hand {
            HandType::Left => DevicePath::LEFT_HAND,
            HandType::Right => DevicePath::RIGHT_HAND,
        };
        let buttons = interaction_profile.button_table(hand);
        info!(
            "Creating {:?} controller with profile {} ({} buttons)",
            hand,
            interaction_profile,
            buttons.len()
        );

        Self {
            common: DeviceCommon::new(path, serial_number),
            hand,
            interaction_profile,
            buttons,
            button_states: RwLock::new(HashMap::new()),
            hand_skeleton: RwLock::new(None),
        }
    }

    pub fn hand(&self) -> HandType {
        self.hand
    }

    pub fn interaction_profile(&self) -> InteractionProfile {
        self.interaction_profile
    }

    /// Applies the update if the button belongs to this controller.
    pub fn try_update_button(&self, entry: &ButtonEntry) -> bool {
        let Some((path, kind)) = self.buttons.get(&entry.path_id) else {
            return false;
        };

        match (kind, entry.value) {
            (ComponentKind::Binary, ButtonValue::Scalar(_))
            | (ComponentKind::Scalar, ButtonValue::Binary(_)) => {
                debug!("Button {} got {:?} for a {:?} component", path, entry.value, kind);
            }
            _ => {}
        }

        self.button_states.write().insert(entry.path_id, entry.value);
        true
    }

    pub fn button(&self, path_id: u64) -> Option<ButtonValue> {
        self.button_states.read().get(&path_id).copied()
    }

    pub fn update_hand_skeleton(&self, joints: [Pose; HAND_SKELETON_JOINT_COUNT], timestamp_ns: u64) {
        *self.hand_skeleton.write() = Some(HandSkeleton {
            joints,
            timestamp_ns,
        });
    }

    pub fn hand_skeleton(&self) -> Option<HandSkeleton> {
        self.hand_skeleton.read().clone()
    }
}

impl DeviceObject for Controller {
    fn common(&self) -> &DeviceCommon {
        &self.common
    }

    fn class(&self) -> DeviceClass {
        DeviceClass::Controller
    }
}
