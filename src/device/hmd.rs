//! Head-mounted display singleton
//!
//! Besides the common pose/property state the HMD is the sink for the display
//! configuration events: the preferred render resolution and the per-eye view setup.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{DeviceClass, DeviceCommon, DeviceObject, DevicePath};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    pub preferred_view_width: u32,
    pub preferred_view_height: u32,
}

// Field of view in radians, angles measured from the view axis
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Fov {
    pub left: f32,
    pub right: f32,
    pub up: f32,
    pub down: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewsConfig {
    pub ipd_m: f32,
    pub fov: [Fov; 2],
}

#[derive(Debug)]
pub struct Hmd {
    common: DeviceCommon,
    video_config: RwLock<Option<VideoConfig>>,
    views_config: RwLock<Option<ViewsConfig>>,
}

impl Hmd {
    pub fn new(serial_number: impl Into<String>) -> Self {
        Self {
            common: DeviceCommon::new(DevicePath::HEAD, serial_number),
            video_config: RwLock::new(None),
            views_config: RwLock::new(None),
        }
    }

    pub fn update_video_config(&self, config: VideoConfig) {
        info!(
            "HMD video config: {}x{} per view",
            config.preferred_view_width, config.preferred_view_height
        );
        *self.video_config.write() = Some(config);
    }

    pub fn update_views_config(&self, config: ViewsConfig) {
        debug!("HMD views config: ipd={:.4}m fov={:?}", config.ipd_m, config.fov);
        *self.views_config.write() = Some(config);
    }

    pub fn video_config(&self) -> Option<VideoConfig> {
        *self.video_config.read()
    }

    pub fn views_config(&self) -> Option<ViewsConfig> {
        *self.views_config.read()
    }
}

impl DeviceObject for Hmd {
    fn common(&self) -> &DeviceCommon {
        &self.common
    }

    fn class(&self) -> DeviceClass {
        DeviceClass::Hmd
    }
}
