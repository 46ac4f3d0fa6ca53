use super::{DeviceClass, DeviceCommon, DeviceObject, DevicePath};

/// Any tracked path that is neither the head nor a hand
#[derive(Debug)]
pub struct GenericTracker {
    common: DeviceCommon,
}

impl GenericTracker {
    pub fn new(path: DevicePath, serial_number: impl Into<String>) -> Self {
        Self {
            common: DeviceCommon::new(path, serial_number),
        }
    }
}

impl DeviceObject for GenericTracker {
    fn common(&self) -> &DeviceCommon {
        &self.common
    }

    fn class(&self) -> DeviceClass {
        DeviceClass::GenericTracker
    }
}
