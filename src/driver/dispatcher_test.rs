use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::dispatcher::{DispatchStats, EventDispatcher};
use crate::config::DriverSettings;
use crate::device::profile::{button_id, OCULUS_TOUCH_PROFILE};
use crate::device::{
    hash_path, ButtonEntry, ButtonValue, DeviceMotion, DeviceObject, DevicePath, DeviceProfile,
    DeviceRegistry, HandType, Hmd, ObjectId, Pose, VideoConfig, ViewsConfig,
    HAND_SKELETON_JOINT_COUNT,
};
use crate::host::{
    drain_commands, ChannelHost, HostCommand, MockHost, PlayAreaBounds, VendorEvent,
};
use crate::streamer::{ChannelEventSource, DriverEvent, MockEventSource};

struct Fixture {
    dispatcher: EventDispatcher,
    registry: Arc<RwLock<DeviceRegistry>>,
    commands: mpsc::Receiver<HostCommand>,
}

fn settings() -> DriverSettings {
    DriverSettings {
        poll_timeout_ms: 10,
        ..DriverSettings::default()
    }
}

fn fixture() -> Fixture {
    let (tx, commands) = mpsc::channel(256);
    let host = Arc::new(ChannelHost::new(tx, false));
    let registry = Arc::new(RwLock::new(DeviceRegistry::new(
        Arc::new(Hmd::new("HMD-0")),
        host.clone(),
    )));
    let (source, _sender) = ChannelEventSource::channel();
    let dispatcher = EventDispatcher::new(Arc::new(source), registry.clone(), host, settings());

    Fixture {
        dispatcher,
        registry,
        commands,
    }
}

fn connect(path: DevicePath, interaction_profile: &str) -> DriverEvent {
    DriverEvent::DeviceConnected(DeviceProfile {
        top_level_path: path,
        interaction_profile: hash_path(interaction_profile),
        serial_number: format!("SN-{}", path.0),
    })
}

#[test]
fn connect_then_reconnect_is_routed_to_registry() {
    let mut f = fixture();

    assert!(f.dispatcher.dispatch(connect(DevicePath::LEFT_HAND, OCULUS_TOUCH_PROFILE)));
    assert!(f.dispatcher.dispatch(connect(DevicePath::LEFT_HAND, OCULUS_TOUCH_PROFILE)));

    let commands = drain_commands(&mut f.commands);
    assert!(matches!(commands[0], HostCommand::AddDevice { .. }));
    assert!(matches!(
        commands[1],
        HostCommand::Notify {
            event: VendorEvent::WirelessReconnect,
            ..
        }
    ));
    assert_eq!(commands.len(), 2);
    assert!(f.registry.read().left_controller().is_some());
}

#[test]
fn events_for_unknown_devices_are_dropped() {
    let mut f = fixture();
    let ghost = DevicePath::from_path("/user/body/ghost");

    assert!(!f.dispatcher.dispatch(DriverEvent::DevicePoseUpdated {
        path: ghost,
        motion: DeviceMotion::default(),
        timestamp_ns: 1,
    }));
    assert!(!f.dispatcher.dispatch(DriverEvent::DeviceDisconnected(ghost)));
    assert!(!f.dispatcher.dispatch(DriverEvent::BatteryUpdated {
        path: ghost,
        value: 0.1,
    }));
    assert!(!f.dispatcher.dispatch(DriverEvent::Unrecognized(77)));

    assert_eq!(
        f.dispatcher.stats(),
        &DispatchStats {
            applied: 0,
            dropped: 4,
            idle_polls: 0,
        }
    );
    assert!(drain_commands(&mut f.commands).is_empty());
}

#[test]
fn button_with_no_controllers_is_dropped_silently() {
    let mut f = fixture();

    let applied = f.dispatcher.dispatch(DriverEvent::ButtonUpdated(ButtonEntry {
        path_id: button_id(HandType::Right, "/input/a/click"),
        value: ButtonValue::Binary(true),
    }));

    assert!(!applied);
    assert!(drain_commands(&mut f.commands).is_empty());
}

#[test]
fn display_configs_land_on_hmd() {
    let mut f = fixture();
    let video = VideoConfig {
        preferred_view_width: 2016,
        preferred_view_height: 2240,
    };
    let views = ViewsConfig {
        ipd_m: 0.063,
        ..ViewsConfig::default()
    };

    f.dispatcher.dispatch(DriverEvent::VideoConfigUpdated(video));
    f.dispatcher.dispatch(DriverEvent::ViewsConfigUpdated(views));

    let registry = f.registry.read();
    assert_eq!(registry.hmd().video_config(), Some(video));
    assert_eq!(registry.hmd().views_config(), Some(views));
}

#[test]
fn host_signals_are_forwarded() {
    let mut f = fixture();
    let bounds = PlayAreaBounds {
        width: 2.0,
        height: 3.5,
    };

    f.dispatcher.dispatch(DriverEvent::BoundsUpdated(bounds));
    f.dispatcher.dispatch(DriverEvent::RestartRequested);
    f.dispatcher.dispatch(DriverEvent::ShutdownRequested);

    assert_eq!(
        drain_commands(&mut f.commands),
        vec![
            HostCommand::SetChaperone(bounds),
            HostCommand::RequestRestart(settings().restart_reason),
            HostCommand::RequestQuit,
        ]
    );
}

#[test]
fn hand_skeleton_follows_hand_side() {
    let mut f = fixture();
    f.dispatcher
        .dispatch(connect(DevicePath::RIGHT_HAND, OCULUS_TOUCH_PROFILE));

    let skeleton = |hand| DriverEvent::HandSkeletonUpdated {
        hand,
        joints: Box::new([Pose::default(); HAND_SKELETON_JOINT_COUNT]),
        timestamp_ns: 42,
    };

    assert!(!f.dispatcher.dispatch(skeleton(HandType::Left)));
    assert!(f.dispatcher.dispatch(skeleton(HandType::Right)));

    let registry = f.registry.read();
    let right = registry.right_controller().unwrap();
    assert_eq!(right.hand_skeleton().map(|s| s.timestamp_ns), Some(42));
}

#[test]
fn run_returns_promptly_after_cancel_with_silent_source() {
    let (tx, _commands) = mpsc::channel(16);
    let host = Arc::new(ChannelHost::new(tx, false));
    let registry = Arc::new(RwLock::new(DeviceRegistry::new(
        Arc::new(Hmd::new("HMD-0")),
        host.clone(),
    )));

    let mut source = MockEventSource::new();
    source.expect_read_event().returning(|timeout| {
        std::thread::sleep(timeout);
        None
    });

    let dispatcher = EventDispatcher::new(Arc::new(source), registry, host, settings());
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = std::thread::spawn(move || dispatcher.run(token));

    std::thread::sleep(Duration::from_millis(50));
    let stopped_at = Instant::now();
    cancel.cancel();
    let stats = handle.join().unwrap();

    // one poll timeout plus scheduling slack
    assert!(stopped_at.elapsed() < Duration::from_millis(500));
    assert!(stats.idle_polls > 0);
    assert_eq!(stats.applied, 0);
}

#[test]
fn run_applies_queued_events_in_arrival_order() {
    let (tx, _commands) = mpsc::channel(16);
    let host = Arc::new(ChannelHost::new(tx, false));
    let registry = Arc::new(RwLock::new(DeviceRegistry::new(
        Arc::new(Hmd::new("HMD-0")),
        host.clone(),
    )));
    let (source, sender) = ChannelEventSource::channel();

    let mut first = DeviceMotion::default();
    first.pose.position = [1.0, 0.0, 0.0];
    let mut second = DeviceMotion::default();
    second.pose.position = [2.0, 0.0, 0.0];
    sender
        .send(DriverEvent::DevicePoseUpdated {
            path: DevicePath::HEAD,
            motion: first,
            timestamp_ns: 100,
        })
        .unwrap();
    sender
        .send(DriverEvent::DevicePoseUpdated {
            path: DevicePath::HEAD,
            motion: second,
            timestamp_ns: 50,
        })
        .unwrap();

    let dispatcher =
        EventDispatcher::new(Arc::new(source), registry.clone(), host, settings());
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = std::thread::spawn(move || dispatcher.run(token));

    let deadline = Instant::now() + Duration::from_secs(2);
    while registry.read().hmd().pose().map(|p| p.timestamp_ns) != Some(50) {
        assert!(Instant::now() < deadline, "dispatcher never applied the second pose");
        std::thread::sleep(Duration::from_millis(5));
    }
    cancel.cancel();
    let stats = handle.join().unwrap();

    assert_eq!(stats.applied, 2);
    assert_eq!(
        registry.read().hmd().pose().unwrap().motion.pose.position,
        [2.0, 0.0, 0.0]
    );
}

#[test]
fn event_read_after_stop_signal_is_discarded() {
    let (tx, _commands) = mpsc::channel(16);
    let host = Arc::new(ChannelHost::new(tx, false));
    let registry = Arc::new(RwLock::new(DeviceRegistry::new(
        Arc::new(Hmd::new("HMD-0")),
        host.clone(),
    )));
    let cancel = CancellationToken::new();

    // the stop signal lands while read_event is blocked
    let token = cancel.clone();
    let mut source = MockEventSource::new();
    source.expect_read_event().times(1).returning(move |_| {
        token.cancel();
        Some(DriverEvent::DevicePoseUpdated {
            path: DevicePath::HEAD,
            motion: DeviceMotion::default(),
            timestamp_ns: 5,
        })
    });

    let dispatcher = EventDispatcher::new(Arc::new(source), registry.clone(), host, settings());
    let stats = dispatcher.run(cancel);

    assert_eq!(stats.applied, 0);
    assert_eq!(registry.read().hmd().pose(), None);
}

#[test]
fn host_registration_runs_without_registry_write_lock() {
    let registry_slot: Arc<OnceLock<Arc<RwLock<DeviceRegistry>>>> = Arc::new(OnceLock::new());
    let readable_during_add = Arc::new(AtomicBool::new(false));

    let mut host = MockHost::new();
    let slot = registry_slot.clone();
    let readable = readable_during_add.clone();
    host.expect_add_device().times(1).returning(move |_, _, _| {
        // a host thread reading the registry must not be blocked here
        let can_read = slot.get().is_some_and(|r| r.try_read().is_some());
        readable.store(can_read, Ordering::SeqCst);
        Ok(ObjectId(3))
    });
    host.expect_notify().never();
    let host = Arc::new(host);

    let registry = Arc::new(RwLock::new(DeviceRegistry::new(
        Arc::new(Hmd::new("HMD-0")),
        host.clone(),
    )));
    assert!(registry_slot.set(registry.clone()).is_ok());
    let (source, _sender) = ChannelEventSource::channel();
    let mut dispatcher = EventDispatcher::new(Arc::new(source), registry.clone(), host, settings());

    assert!(dispatcher.dispatch(connect(DevicePath::LEFT_HAND, OCULUS_TOUCH_PROFILE)));

    assert!(readable_during_add.load(Ordering::SeqCst));
    assert_eq!(
        registry.read().left_controller().and_then(|c| c.object_id()),
        Some(ObjectId(3))
    );
}
