//! Interaction profiles and the button components they expose
//!
//! A controller decides whether a broadcast button update belongs to it by looking the
//! button id up in the component table built from its profile and hand side.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::{hash_path, LEFT_HAND_PATH_STR, RIGHT_HAND_PATH_STR};

pub const OCULUS_TOUCH_PROFILE: &str = "/interaction_profiles/oculus/touch_controller";
pub const VALVE_INDEX_PROFILE: &str = "/interaction_profiles/valve/index_controller";
pub const HTC_VIVE_PROFILE: &str = "/interaction_profiles/htc/vive_controller";

// Hand side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandType {
    Left,
    Right,
}

impl HandType {
    pub fn path_str(&self) -> &'static str {
        match self {
            HandType::Left => LEFT_HAND_PATH_STR,
            HandType::Right => RIGHT_HAND_PATH_STR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Binary,
    Scalar,
}

/// Interaction profile reported with the first connect of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionProfile {
    OculusTouch,
    ValveIndex,
    HtcVive,
    Unknown(u64),
}

impl InteractionProfile {
    pub fn from_id(id: u64) -> Self {
        if id == hash_path(OCULUS_TOUCH_PROFILE) {
            InteractionProfile::OculusTouch
        } else if id == hash_path(VALVE_INDEX_PROFILE) {
            InteractionProfile::ValveIndex
        } else if id == hash_path(HTC_VIVE_PROFILE) {
            InteractionProfile::HtcVive
        } else {
            InteractionProfile::Unknown(id)
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            InteractionProfile::OculusTouch => hash_path(OCULUS_TOUCH_PROFILE),
            InteractionProfile::ValveIndex => hash_path(VALVE_INDEX_PROFILE),
            InteractionProfile::HtcVive => hash_path(HTC_VIVE_PROFILE),
            InteractionProfile::Unknown(id) => *id,
        }
    }

    // Components relative to the hand path
    fn components(&self, hand: HandType) -> &'static [(&'static str, ComponentKind)] {
        use ComponentKind::*;

        match (self, hand) {
            (InteractionProfile::OculusTouch, HandType::Left) => &[
                ("/input/x/click", Binary),
                ("/input/x/touch", Binary),
                ("/input/y/click", Binary),
                ("/input/y/touch", Binary),
                ("/input/menu/click", Binary),
                ("/input/squeeze/value", Scalar),
                ("/input/trigger/value", Scalar),
                ("/input/trigger/touch", Binary),
                ("/input/thumbstick/x", Scalar),
                ("/input/thumbstick/y", Scalar),
                ("/input/thumbstick/click", Binary),
                ("/input/thumbstick/touch", Binary),
                ("/input/thumbrest/touch", Binary),
            ],
            (InteractionProfile::OculusTouch, HandType::Right) => &[
                ("/input/a/click", Binary),
                ("/input/a/touch", Binary),
                ("/input/b/click", Binary),
                ("/input/b/touch", Binary),
                ("/input/system/click", Binary),
                ("/input/squeeze/value", Scalar),
                ("/input/trigger/value", Scalar),
                ("/input/trigger/touch", Binary),
                ("/input/thumbstick/x", Scalar),
                ("/input/thumbstick/y", Scalar),
                ("/input/thumbstick/click", Binary),
                ("/input/thumbstick/touch", Binary),
                ("/input/thumbrest/touch", Binary),
            ],
            (InteractionProfile::ValveIndex, _) => &[
                ("/input/system/click", Binary),
                ("/input/system/touch", Binary),
                ("/input/a/click", Binary),
                ("/input/a/touch", Binary),
                ("/input/b/click", Binary),
                ("/input/b/touch", Binary),
                ("/input/squeeze/value", Scalar),
                ("/input/squeeze/force", Scalar),
                ("/input/trigger/click", Binary),
                ("/input/trigger/value", Scalar),
                ("/input/trigger/touch", Binary),
                ("/input/thumbstick/x", Scalar),
                ("/input/thumbstick/y", Scalar),
                ("/input/thumbstick/click", Binary),
                ("/input/thumbstick/touch", Binary),
                ("/input/trackpad/x", Scalar),
                ("/input/trackpad/y", Scalar),
                ("/input/trackpad/force", Scalar),
                ("/input/trackpad/touch", Binary),
            ],
            (InteractionProfile::HtcVive, _) => &[
                ("/input/system/click", Binary),
                ("/input/squeeze/click", Binary),
                ("/input/menu/click", Binary),
                ("/input/trigger/click", Binary),
                ("/input/trigger/value", Scalar),
                ("/input/trackpad/x", Scalar),
                ("/input/trackpad/y", Scalar),
                ("/input/trackpad/click", Binary),
                ("/input/trackpad/touch", Binary),
            ],
            (InteractionProfile::Unknown(_), _) => &[],
        }
    }

    /// Button id -> (full path, kind) for one hand
    pub fn button_table(&self, hand: HandType) -> HashMap<u64, (String, ComponentKind)> {
        self.components(hand)
            .iter()
            .map(|(component, kind)| {
                let full_path = format!("{}{}", hand.path_str(), component);
                (hash_path(&full_path), (full_path, *kind))
            })
            .collect()
    }
}

impl fmt::Display for InteractionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionProfile::OculusTouch => write!(f, "Oculus Touch"),
            InteractionProfile::ValveIndex => write!(f, "Valve Index"),
            InteractionProfile::HtcVive => write!(f, "HTC Vive"),
            InteractionProfile::Unknown(id) => write!(f, "Unknown({:016x})", id),
        }
    }
}

/// Id of a button component, as the streamer reports it
pub fn button_id(hand: HandType, component: &str) -> u64 {
    hash_path(&format!("{}{}", hand.path_str(), component))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_ids_round_trip_through_known_paths() {
        for profile in [
            InteractionProfile::OculusTouch,
            InteractionProfile::ValveIndex,
            InteractionProfile::HtcVive,
        ] {
            assert_eq!(InteractionProfile::from_id(profile.id()), profile);
        }
        assert_eq!(
            InteractionProfile::from_id(42),
            InteractionProfile::Unknown(42)
        );
    }

    #[test]
    fn touch_tables_are_hand_specific() {
        let left = InteractionProfile::OculusTouch.button_table(HandType::Left);
        let right = InteractionProfile::OculusTouch.button_table(HandType::Right);

        assert!(left.contains_key(&button_id(HandType::Left, "/input/x/click")));
        assert!(!right.contains_key(&button_id(HandType::Right, "/input/x/click")));
        assert!(right.contains_key(&button_id(HandType::Right, "/input/a/click")));
        // same component on the other hand is a different id
        assert!(!left.contains_key(&button_id(HandType::Right, "/input/trigger/value")));
    }

    #[test]
    fn unknown_profile_accepts_nothing() {
        assert!(InteractionProfile::Unknown(7)
            .button_table(HandType::Left)
            .is_empty());
    }
}
