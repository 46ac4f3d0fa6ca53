use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use vrbridge::device::profile::{button_id, OCULUS_TOUCH_PROFILE};
use vrbridge::device::{
    hash_path, ButtonEntry, ButtonValue, DeviceMotion, DeviceObject, DevicePath, DeviceProfile,
    HandType, VideoConfig, ViewsConfig,
};
use vrbridge::host::{ChannelHost, Haptics, HostCommand, HostEvent, PlayAreaBounds};
use vrbridge::streamer::{DriverEvent, EventSender, LoopbackStreamer};
use vrbridge::{DriverProvider, DriverSettings};

const HMD_SERIAL: &str = "VRB-HMD-0001";
const WAIST_TRACKER_PATH: &str = "/user/vive_tracker_htcx/role/waist";

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = DriverSettings::load();
    info!("Starting driver with {:?}", settings);

    let (command_sender, command_receiver) = mpsc::channel(1000);
    let host = Arc::new(ChannelHost::new(
        command_sender,
        settings.reject_competing_hmd,
    ));
    let (streamer, events) = LoopbackStreamer::new(HMD_SERIAL);

    let mut provider = DriverProvider::new(settings, Arc::new(streamer), host);
    provider
        .init()
        .map_err(|e| eyre!("Failed to initialize driver: {}", e))?;

    let host_log = tokio::spawn(log_host_commands(command_receiver));
    let session = tokio::spawn(run_scripted_session(events));

    // Host frame loop: one haptics pulse per second on the left controller once it exists
    let registry = provider.registry();
    let mut frames = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = frames.tick() => {
                let left = registry.read().left_controller().and_then(|c| c.object_id());
                let host_events: Vec<HostEvent> = left
                    .map(|object_id| HostEvent::HapticVibration {
                        object_id,
                        haptics: Haptics {
                            duration_s: 0.05,
                            frequency: 160.0,
                            amplitude: 0.3,
                        },
                    })
                    .into_iter()
                    .collect();
                let relayed = provider.run_frame(&host_events);
                debug!("Frame relayed {} haptics requests", relayed);
            }
        }
    }

    session.abort();
    provider.cleanup();
    if let Some(stats) = provider.dispatch_stats() {
        info!("Dispatcher finished: {:?}", stats);
    }

    // the registry handle and the provider hold the last command senders
    drop(registry);
    drop(provider);
    if let Err(e) = host_log.await {
        warn!("Host command logger ended abnormally: {}", e);
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn log_host_commands(mut receiver: mpsc::Receiver<HostCommand>) {
    while let Some(command) = receiver.recv().await {
        match command {
            HostCommand::AddDevice {
                serial,
                class,
                path,
                object_id,
            } => info!("Host: added {} {} at {} as {}", class, serial, path, object_id),
            HostCommand::SetProperty {
                object_id,
                property,
            } => debug!("Host: {} property {:?}", object_id, property),
            other => info!("Host: {:?}", other),
        }
    }
    debug!("Host command channel closed");
}

/// Plays a short synthetic session: display setup, three devices, then motion
async fn run_scripted_session(events: EventSender) {
    let started = Instant::now();
    let waist = DevicePath::from_path(WAIST_TRACKER_PATH);

    let setup = [
        DriverEvent::VideoConfigUpdated(VideoConfig {
            preferred_view_width: 1832,
            preferred_view_height: 1920,
        }),
        DriverEvent::ViewsConfigUpdated(ViewsConfig {
            ipd_m: 0.063,
            ..ViewsConfig::default()
        }),
        DriverEvent::BoundsUpdated(PlayAreaBounds {
            width: 2.5,
            height: 2.0,
        }),
        connect(DevicePath::LEFT_HAND, "VRB-CTRL-L"),
        connect(DevicePath::RIGHT_HAND, "VRB-CTRL-R"),
        connect(waist, "VRB-TRK-WAIST"),
    ];
    for event in setup {
        if let Err(e) = events.send(event) {
            warn!("Session script stopped: {}", e);
            return;
        }
    }

    let trigger = button_id(HandType::Right, "/input/trigger/value");
    let mut ticker = tokio::time::interval(Duration::from_millis(20));
    let mut tick = 0u64;

    loop {
        ticker.tick().await;
        tick += 1;
        let timestamp_ns = started.elapsed().as_nanos() as u64;
        let phase = (tick as f32 * 0.05).sin();

        let mut batch = Vec::with_capacity(5);
        for (path, offset) in [
            (DevicePath::HEAD, [0.0, 1.7, 0.0]),
            (DevicePath::LEFT_HAND, [-0.25, 1.2, -0.3]),
            (DevicePath::RIGHT_HAND, [0.25, 1.2, -0.3]),
        ] {
            let mut motion = DeviceMotion::default();
            motion.pose.position = [offset[0] + 0.05 * phase, offset[1], offset[2]];
            batch.push(DriverEvent::DevicePoseUpdated {
                path,
                motion,
                timestamp_ns,
            });
        }
        batch.push(DriverEvent::ButtonUpdated(ButtonEntry {
            path_id: trigger,
            value: ButtonValue::Scalar(phase.abs()),
        }));
        if tick % 500 == 0 {
            batch.push(DriverEvent::BatteryUpdated {
                path: DevicePath::LEFT_HAND,
                value: (1.0 - tick as f32 / 50_000.0).max(0.0),
            });
        }

        for event in batch {
            if let Err(e) = events.send(event) {
                warn!("Session script stopped: {}", e);
                return;
            }
        }
    }
}

fn connect(path: DevicePath, serial: &str) -> DriverEvent {
    DriverEvent::DeviceConnected(DeviceProfile {
        top_level_path: path,
        interaction_profile: hash_path(OCULUS_TOUCH_PROFILE),
        serial_number: serial.to_string(),
    })
}
