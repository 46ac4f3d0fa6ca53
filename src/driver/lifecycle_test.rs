use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::{DriverError, DriverProvider, ProviderPhase};
use crate::config::DriverSettings;
use crate::device::profile::{button_id, OCULUS_TOUCH_PROFILE};
use crate::device::{
    hash_path, ButtonEntry, ButtonValue, DeviceClass, DeviceMotion, DeviceObject, DevicePath,
    DeviceProfile, HandType, Hmd, ObjectId, TrackedDevice,
};
use crate::host::{
    drain_commands, ChannelHost, Haptics, Host, HostCommand, HostEvent, MockHost, PlayAreaBounds,
};
use crate::streamer::{
    DriverEvent, EventSender, EventSource, GraphicsContext, LoopbackStreamer, MockEventSource,
    MockStreamer, Streamer, StreamerError,
};

struct Harness {
    provider: DriverProvider,
    streamer: Arc<LoopbackStreamer>,
    host: Arc<ChannelHost>,
    events: EventSender,
    commands: mpsc::Receiver<HostCommand>,
}

fn settings() -> DriverSettings {
    DriverSettings {
        poll_timeout_ms: 10,
        ..DriverSettings::default()
    }
}

fn harness_with(streamer: LoopbackStreamer, events: EventSender, reject_competing_hmd: bool) -> Harness {
    let (tx, commands) = mpsc::channel(256);
    let host = Arc::new(ChannelHost::new(tx, reject_competing_hmd));
    let streamer = Arc::new(streamer);
    let provider = DriverProvider::new(settings(), streamer.clone(), host.clone());

    Harness {
        provider,
        streamer,
        host,
        events,
        commands,
    }
}

fn harness() -> Harness {
    let (streamer, events) = LoopbackStreamer::new("HMD-TEST");
    harness_with(streamer, events, false)
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn connect(path: DevicePath) -> DriverEvent {
    DriverEvent::DeviceConnected(DeviceProfile {
        top_level_path: path,
        interaction_profile: hash_path(OCULUS_TOUCH_PROFILE),
        serial_number: format!("SN-{}", path.0),
    })
}

#[test]
fn init_registers_hmd_and_starts_dispatcher() {
    let mut h = harness();
    assert_eq!(h.provider.phase(), ProviderPhase::Uninitialized);
    assert!(!h.provider.is_dispatching());

    h.provider.init().unwrap();

    assert_eq!(h.provider.phase(), ProviderPhase::Running);
    assert!(h.provider.is_dispatching());
    assert!(h.streamer.is_initialized());

    let registry = h.provider.registry();
    let hmd = registry.read().hmd().clone();
    assert_eq!(hmd.serial_number(), "HMD-TEST");
    assert_eq!(hmd.object_id(), Some(ObjectId(0)));
    assert_eq!(h.host.device_count(), 1);

    h.provider.cleanup();
    assert_eq!(h.provider.phase(), ProviderPhase::Terminated);
    assert!(h.streamer.is_shut_down());
    assert!(!h.provider.is_dispatching());
}

#[test]
fn hmd_exists_before_init() {
    let h = harness();
    let registry = h.provider.registry();
    let registry = registry.read();

    assert!(registry.contains(DevicePath::HEAD));
    assert_eq!(registry.hmd().object_id(), None);
}

#[test]
fn failed_streamer_leaves_nothing_running() {
    let (streamer, events) = LoopbackStreamer::failing("HMD-TEST");
    let mut h = harness_with(streamer, events, false);

    let result = h.provider.init();

    assert!(matches!(result, Err(DriverError::InitializationError(_))));
    assert_eq!(h.provider.phase(), ProviderPhase::Failed);
    assert!(!h.provider.is_dispatching());
    assert_eq!(h.host.device_count(), 0);

    h.provider.cleanup();
    assert_eq!(h.provider.phase(), ProviderPhase::Failed);
    assert!(!h.streamer.is_shut_down());
}

#[test]
fn streamer_failure_skips_registration_and_teardown() {
    let mut streamer = MockStreamer::new();
    streamer
        .expect_serial_number()
        .returning(|_| "MOCK-HMD".to_string());
    streamer
        .expect_initialize()
        .withf(|graphics| graphics.vk_get_device_proc_addr == Some(0x1000))
        .times(1)
        .returning(|_| Err(StreamerError::InitializationError("no device".to_string())));
    streamer.expect_event_source().never();
    streamer.expect_shutdown().never();

    let mut host = MockHost::new();
    host.expect_add_device().never();

    let mut provider = DriverProvider::new(settings(), Arc::new(streamer), Arc::new(host))
        .with_graphics(GraphicsContext {
            vk_get_device_proc_addr: Some(0x1000),
        });

    assert!(provider.init().is_err());
    provider.cleanup();
    assert_eq!(provider.phase(), ProviderPhase::Failed);
}

#[test]
fn rejected_hmd_still_runs_unobserved() {
    let (streamer, events) = LoopbackStreamer::new("HMD-TEST");
    let mut h = harness_with(streamer, events, true);

    // another HMD driver got there first
    h.host
        .add_device(
            "OTHER",
            DeviceClass::Hmd,
            TrackedDevice::Hmd(Arc::new(Hmd::new("OTHER"))),
        )
        .unwrap();

    h.provider.init().unwrap();
    assert_eq!(h.provider.phase(), ProviderPhase::Running);

    let registry = h.provider.registry();
    assert_eq!(registry.read().hmd().object_id(), None);

    h.events
        .send(DriverEvent::DevicePoseUpdated {
            path: DevicePath::HEAD,
            motion: DeviceMotion::default(),
            timestamp_ns: 7,
        })
        .unwrap();
    wait_until("HMD pose", || {
        registry.read().hmd().pose().map(|p| p.timestamp_ns) == Some(7)
    });

    h.provider.cleanup();
}

#[test]
fn second_init_is_rejected() {
    let mut h = harness();
    h.provider.init().unwrap();

    let again = h.provider.init();

    assert!(matches!(again, Err(DriverError::InvalidStateTransition(_))));
    assert_eq!(h.provider.phase(), ProviderPhase::Running);
    assert!(h.provider.is_dispatching());
    h.provider.cleanup();
}

#[test]
fn cleanup_is_idempotent() {
    let mut h = harness();
    h.provider.cleanup();
    assert_eq!(h.provider.phase(), ProviderPhase::Uninitialized);

    h.provider.init().unwrap();
    h.provider.cleanup();
    h.provider.cleanup();

    assert_eq!(h.provider.phase(), ProviderPhase::Terminated);
    assert!(h.provider.dispatch_stats().is_some());
}

#[test]
fn events_flow_through_dispatcher_thread() {
    let mut h = harness();
    h.provider.init().unwrap();
    let registry = h.provider.registry();

    h.events.send(connect(DevicePath::LEFT_HAND)).unwrap();
    h.events
        .send(DriverEvent::ButtonUpdated(ButtonEntry {
            path_id: button_id(HandType::Left, "/input/trigger/value"),
            value: ButtonValue::Scalar(0.75),
        }))
        .unwrap();
    h.events
        .send(DriverEvent::BoundsUpdated(PlayAreaBounds {
            width: 2.0,
            height: 2.0,
        }))
        .unwrap();

    let trigger = button_id(HandType::Left, "/input/trigger/value");
    wait_until("trigger value", || {
        registry
            .read()
            .left_controller()
            .and_then(|c| c.button(trigger))
            == Some(ButtonValue::Scalar(0.75))
    });

    h.provider.cleanup();
    let stats = h.provider.dispatch_stats().unwrap();
    assert!(stats.applied >= 2);

    let commands = drain_commands(&mut h.commands);
    assert!(commands.iter().any(|c| matches!(
        c,
        HostCommand::AddDevice {
            path: DevicePath::LEFT_HAND,
            ..
        }
    )));
}

#[test]
fn cleanup_leaves_later_events_unread() {
    let mut h = harness();
    h.provider.init().unwrap();
    h.provider.cleanup();
    assert!(!h.provider.is_dispatching());

    let late = DriverEvent::DevicePoseUpdated {
        path: DevicePath::HEAD,
        motion: DeviceMotion::default(),
        timestamp_ns: 99,
    };
    h.events.send(late.clone()).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let registry = h.provider.registry();
    assert_eq!(registry.read().hmd().pose(), None);
    // still queued: the joined dispatcher never pulled it
    let source = h.streamer.event_source();
    assert_eq!(source.read_event(Duration::from_millis(10)), Some(late));
}

#[test]
fn hmd_registration_happens_before_first_read() {
    let registered = Arc::new(AtomicBool::new(false));
    let read_too_early = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));

    let mut source = MockEventSource::new();
    {
        let registered = registered.clone();
        let read_too_early = read_too_early.clone();
        let reads = reads.clone();
        source.expect_read_event().returning(move |timeout| {
            if !registered.load(Ordering::SeqCst) {
                read_too_early.store(true, Ordering::SeqCst);
            }
            reads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(timeout);
            None
        });
    }
    let source: Arc<dyn EventSource> = Arc::new(source);

    let mut streamer = MockStreamer::new();
    streamer
        .expect_serial_number()
        .returning(|_| "MOCK-HMD".to_string());
    streamer.expect_initialize().times(1).returning(|_| Ok(()));
    streamer
        .expect_event_source()
        .times(1)
        .returning(move || source.clone());
    streamer.expect_shutdown().times(1).return_const(());

    let mut host = MockHost::new();
    {
        let registered = registered.clone();
        host.expect_add_device().times(1).returning(move |_, class, _| {
            assert_eq!(class, DeviceClass::Hmd);
            // give an early dispatcher time to read if the gate were missing
            std::thread::sleep(Duration::from_millis(30));
            registered.store(true, Ordering::SeqCst);
            Ok(ObjectId(0))
        });
    }

    let mut provider = DriverProvider::new(settings(), Arc::new(streamer), Arc::new(host));
    provider.init().unwrap();
    wait_until("first read", || reads.load(Ordering::SeqCst) > 0);
    provider.cleanup();

    assert!(!read_too_early.load(Ordering::SeqCst));
}

#[test]
fn run_frame_relays_haptics_to_controllers_only() {
    let mut h = harness();
    h.provider.init().unwrap();
    let registry = h.provider.registry();

    h.events.send(connect(DevicePath::RIGHT_HAND)).unwrap();
    wait_until("right controller", || {
        registry
            .read()
            .right_controller()
            .is_some_and(|c| c.object_id().is_some())
    });

    let controller_id = registry.read().right_controller().unwrap().object_id().unwrap();
    let hmd_id = registry.read().hmd().object_id().unwrap();
    let haptics = Haptics {
        duration_s: 0.1,
        frequency: 160.0,
        amplitude: 0.5,
    };

    let relayed = h.provider.run_frame(&[
        HostEvent::HapticVibration {
            object_id: controller_id,
            haptics,
        },
        HostEvent::HapticVibration {
            object_id: hmd_id,
            haptics,
        },
        HostEvent::Other(3),
    ]);

    assert_eq!(relayed, 1);
    assert_eq!(
        h.streamer.sent_haptics(),
        vec![(DevicePath::RIGHT_HAND, haptics)]
    );

    h.provider.cleanup();
    assert_eq!(
        h.provider.run_frame(&[HostEvent::HapticVibration {
            object_id: controller_id,
            haptics,
        }]),
        0
    );
}

#[test]
fn drop_while_running_shuts_down() {
    let mut h = harness();
    h.provider.init().unwrap();
    let streamer = h.streamer.clone();

    drop(h.provider);

    assert!(streamer.is_shut_down());
}
