//! Event dispatcher - routes streamer events to the registry and the host
//!
//! Runs on its own thread as a blocking pull loop. Each iteration waits at most the
//! configured poll timeout, so a cancelled token is observed within one timeout even
//! when the streamer is silent.
//!
//! # Routing
//!
//! ```text
//! DeviceConnected ─────────► registry.insert_or_reconnect (write lock), then host
//! DeviceDisconnected ──────► registry.disconnect
//! OpenvrPropertyChanged ───► registry.set_property
//! DevicePoseUpdated ───────► registry.update_pose
//! ButtonUpdated ───────────► both controller slots
//! HandSkeletonUpdated ─────► controller slot of that hand
//! BatteryUpdated ──────────► host property store
//! Video/ViewsConfigUpdated ► HMD
//! BoundsUpdated ───────────► host chaperone
//! Restart/ShutdownRequested ► host, fire-and-forget
//! ```

use chrono::Local;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DriverSettings;
use crate::device::DeviceRegistry;
use crate::host::Host;
use crate::streamer::{DriverEvent, EventSource};

/// Counters kept by the dispatch loop
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events that changed state or reached the host
    pub applied: u64,
    /// Events for unknown devices, missing controller slots or unrecognized tags
    pub dropped: u64,
    /// Polls that timed out without an event
    pub idle_polls: u64,
}

pub struct EventDispatcher {
    source: Arc<dyn EventSource>,
    registry: Arc<RwLock<DeviceRegistry>>,
    host: Arc<dyn Host>,
    settings: DriverSettings,
    stats: DispatchStats,
}

impl EventDispatcher {
    pub fn new(
        source: Arc<dyn EventSource>,
        registry: Arc<RwLock<DeviceRegistry>>,
        host: Arc<dyn Host>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            source,
            registry,
            host,
            settings,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Routes one event. Returns false when it was dropped.
    pub fn dispatch(&mut self, event: DriverEvent) -> bool {
        debug!("Dispatching {}", event.name());

        let applied = match event {
            DriverEvent::DeviceConnected(profile) => {
                let pending = self.registry.write().insert_or_reconnect(&profile);
                // host calls happen after the write guard is gone
                pending.complete(self.host.as_ref());
                true
            }
            DriverEvent::DeviceDisconnected(path) => self.registry.read().disconnect(path),
            DriverEvent::OpenvrPropertyChanged { path, property } => {
                self.registry.read().set_property(path, property)
            }
            DriverEvent::VideoConfigUpdated(config) => {
                self.registry.read().hmd().update_video_config(config);
                true
            }
            DriverEvent::ViewsConfigUpdated(config) => {
                self.registry.read().hmd().update_views_config(config);
                true
            }
            DriverEvent::DevicePoseUpdated {
                path,
                motion,
                timestamp_ns,
            } => self.registry.read().update_pose(path, motion, timestamp_ns),
            DriverEvent::ButtonUpdated(entry) => self.registry.read().update_button(&entry),
            DriverEvent::HandSkeletonUpdated {
                hand,
                joints,
                timestamp_ns,
            } => self
                .registry
                .read()
                .update_hand_skeleton(hand, *joints, timestamp_ns),
            DriverEvent::BatteryUpdated { path, value } => {
                self.registry.read().set_battery(path, value)
            }
            DriverEvent::BoundsUpdated(bounds) => {
                info!("Play area bounds {:.2}m x {:.2}m", bounds.width, bounds.height);
                self.host.set_chaperone(bounds);
                true
            }
            DriverEvent::RestartRequested => {
                self.host.request_restart(&self.settings.restart_reason);
                true
            }
            DriverEvent::ShutdownRequested => {
                self.host.request_quit();
                true
            }
            DriverEvent::Unrecognized(tag) => {
                debug!("Ignoring event with unrecognized tag {}", tag);
                false
            }
        };

        if applied {
            self.stats.applied += 1;
        } else {
            self.stats.dropped += 1;
        }
        applied
    }

    /// Pulls and dispatches until `cancel` fires, then returns the counters
    pub fn run(mut self, cancel: CancellationToken) -> DispatchStats {
        let poll_timeout = self.settings.poll_timeout();
        let stats_interval = self.settings.stats_interval();
        info!(
            "Starting event dispatch loop with {}ms poll timeout",
            poll_timeout.as_millis()
        );

        let mut window_events = 0u64;
        let mut last_log_time = Local::now();

        while !cancel.is_cancelled() {
            if let Some(event) = self.source.read_event(poll_timeout) {
                if cancel.is_cancelled() {
                    debug!("Discarding {} read after stop signal", event.name());
                    break;
                }
                self.dispatch(event);
                window_events += 1;
            } else {
                self.stats.idle_polls += 1;
            }

            let now = Local::now();
            if now - last_log_time > stats_interval {
                let seconds = (now - last_log_time).num_seconds().max(1);
                info!(
                    "Dispatcher stats: {} events in last {} seconds (avg {:.2}/sec), {} applied, {} dropped total",
                    window_events,
                    seconds,
                    window_events as f64 / seconds as f64,
                    self.stats.applied,
                    self.stats.dropped
                );
                window_events = 0;
                last_log_time = now;
            }
        }

        if self.stats.dropped > self.stats.applied && self.stats.applied > 0 {
            warn!(
                "More events dropped ({}) than applied ({}) this session",
                self.stats.dropped, self.stats.applied
            );
        }
        info!("Event dispatch loop stopped: {:?}", self.stats);
        self.stats
    }
}
