//! Channel-backed streamer
//!
//! Events pushed through an [`EventSender`] come out of [`ChannelEventSource::read_event`]
//! in order. The demo binary scripts a session with it and the lifecycle tests drive the
//! real dispatcher thread through it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{DriverEvent, EventSource, GraphicsContext, Streamer, StreamerError};
use crate::device::DevicePath;
use crate::host::Haptics;

/// Producer half, cloneable across threads
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<DriverEvent>,
}

impl EventSender {
    pub fn send(&self, event: DriverEvent) -> Result<(), StreamerError> {
        self.sender
            .send(event)
            .map_err(|e| StreamerError::ChannelClosed(e.to_string()))
    }
}

pub struct ChannelEventSource {
    receiver: Mutex<mpsc::Receiver<DriverEvent>>,
}

impl ChannelEventSource {
    pub fn channel() -> (Self, EventSender) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                receiver: Mutex::new(receiver),
            },
            EventSender { sender },
        )
    }
}

impl EventSource for ChannelEventSource {
    fn read_event(&self, timeout: Duration) -> Option<DriverEvent> {
        let receiver = self.receiver.lock();
        match receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // keep the bounded-wait contract even with no producer left
                drop(receiver);
                std::thread::sleep(timeout);
                None
            }
        }
    }
}

/// In-process streamer with a fixed HMD serial
pub struct LoopbackStreamer {
    source: Arc<ChannelEventSource>,
    hmd_serial: String,
    fail_initialization: bool,
    initialized: AtomicBool,
    shut_down: AtomicBool,
    haptics: Mutex<Vec<(DevicePath, Haptics)>>,
}

impl LoopbackStreamer {
    pub fn new(hmd_serial: impl Into<String>) -> (Self, EventSender) {
        let (source, sender) = ChannelEventSource::channel();
        (
            Self {
                source: Arc::new(source),
                hmd_serial: hmd_serial.into(),
                fail_initialization: false,
                initialized: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                haptics: Mutex::new(Vec::new()),
            },
            sender,
        )
    }

    /// Streamer whose initialization always fails
    pub fn failing(hmd_serial: impl Into<String>) -> (Self, EventSender) {
        let (mut streamer, sender) = Self::new(hmd_serial);
        streamer.fail_initialization = true;
        (streamer, sender)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn sent_haptics(&self) -> Vec<(DevicePath, Haptics)> {
        self.haptics.lock().clone()
    }
}

impl Streamer for LoopbackStreamer {
    fn initialize(&self, graphics: &GraphicsContext) -> Result<(), StreamerError> {
        debug!("Loopback streamer initializing with {:?}", graphics);
        if self.fail_initialization {
            return Err(StreamerError::InitializationError(
                "loopback streamer configured to fail".to_string(),
            ));
        }
        self.initialized.store(true, Ordering::Release);
        info!("Loopback streamer initialized");
        Ok(())
    }

    fn event_source(&self) -> Arc<dyn EventSource> {
        self.source.clone()
    }

    fn serial_number(&self, path: DevicePath) -> String {
        if path == DevicePath::HEAD {
            self.hmd_serial.clone()
        } else {
            format!("{}-{}", self.hmd_serial, path)
        }
    }

    fn send_haptics(&self, path: DevicePath, haptics: Haptics) {
        debug!("Haptics for {}: {:?}", path, haptics);
        self.haptics.lock().push((path, haptics));
    }

    fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            warn!("Loopback streamer shut down without being initialized");
        }
        self.shut_down.store(true, Ordering::Release);
        info!("Loopback streamer shut down");
    }
}
