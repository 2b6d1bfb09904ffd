use bcore_driver::domain::models::{
    format_battery, ControllerEvent, FunctionInfo, MessageSeverity, StatusMessage,
};
use bcore_driver::domain::motion::{SensorAvailability, SensorSample, STANDARD_GRAVITY};
use bcore_driver::domain::profile::DeviceIdentity;
use bcore_driver::domain::settings::SettingsService;
use bcore_driver::domain::steering::{SteeringEvent, SteeringInputModel};
use bcore_driver::infrastructure::logging::init_logger;
use bcore_driver::infrastructure::profile_store::{JsonProfileStore, ProfileStore};
use bcore_driver::infrastructure::session::simulated::{SimulatedDevice, SimulatedTransport};
use bcore_driver::infrastructure::session::{ControllerHandle, ControllerService};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

const DEFAULT_DEMO_SECS: u64 = 3;
const SENSOR_PERIOD: Duration = Duration::from_millis(20);

fn main() -> anyhow::Result<()> {
    let mut settings = SettingsService::new()?;

    let _logging_guard = init_logger(&settings.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting bCore driver (simulated link)");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(&mut settings))
}

async fn run(settings: &mut SettingsService) -> anyhow::Result<()> {
    let identity = settings
        .get()
        .last_device
        .clone()
        .unwrap_or_else(|| DeviceIdentity::new("bCore-SIM", "00:00:00:00:00:01"));

    let store = JsonProfileStore::new(settings.profile_dir()?);
    let profile = store.load_or_default(&identity)?;
    info!(
        "Using profile '{}' from {}",
        profile.display_name,
        store.dir().display()
    );

    let device = SimulatedDevice::new(identity.clone(), FunctionInfo::new(0b0111, 0b1111, true));
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let (transport, link) = SimulatedTransport::new(vec![device], transport_tx);
    let tick = Duration::from_millis(settings.get().tick_interval_ms.max(1));
    let (service, handle, mut events) = ControllerService::new(transport, transport_rx, tick);
    let task = service.spawn();

    let sensors = SensorAvailability {
        accelerometer: true,
        magnetometer: false,
    };
    let mut steering = SteeringInputModel::new(sensors, settings.get().accel_window);
    steering.apply_profile(&profile);

    handle.connect(profile)?;
    if let Err(e) = settings.remember_device(identity) {
        warn!("Could not save settings: {}", e);
    }

    let demo_secs = std::env::var("BCORE_DEMO_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_DEMO_SECS);
    let deadline = time::sleep_until(Instant::now() + Duration::from_secs(demo_secs));
    tokio::pin!(deadline);

    let mut sensor_timer = time::interval(SENSOR_PERIOD);
    let started = Instant::now();

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(event) => on_event(event, &handle, &mut steering)?,
                None => break,
            },
            _ = sensor_timer.tick() => {
                let sample = tilt_sample(started.elapsed());
                if let Some(SteeringEvent::Steering(value)) = steering.handle_sensor(sample) {
                    handle.set_steer(value)?;
                }
            }
        }
    }

    handle.disconnect()?;
    handle.shutdown()?;
    let scheduler = task.await?;
    info!(
        "Demo finished: {} commands sent, final frame {:02X?}",
        link.commands().len(),
        scheduler.frame().as_burst()
    );
    Ok(())
}

fn on_event(
    event: ControllerEvent,
    handle: &ControllerHandle,
    steering: &mut SteeringInputModel,
) -> anyhow::Result<()> {
    match event {
        ControllerEvent::Connected => info!("Connected"),
        ControllerEvent::Disconnected => {
            info!("Disconnected");
            steering.on_disconnected();
        }
        ControllerEvent::Initialized {
            functions,
            burst_enabled,
        } => {
            info!(
                "Device ready: sub servo {}, burst {}",
                functions.has_sub_servo(),
                burst_enabled
            );
            steering.on_visibility_changed(true);
            handle.set_motor_speed(30)?;
        }
        ControllerEvent::BatteryVoltage(millivolts) => info!("{}", format_battery(millivolts)),
        ControllerEvent::LogMessage(StatusMessage { message, severity }) => match severity {
            MessageSeverity::Error => error!("{}", message),
            MessageSeverity::Warning => warn!("{}", message),
            MessageSeverity::Success => info!("{}", message),
        },
    }
    Ok(())
}

/// Handset rocking side to side, about once every two seconds
fn tilt_sample(elapsed: Duration) -> SensorSample {
    let phase = elapsed.as_secs_f32() * std::f32::consts::PI;
    let lateral = STANDARD_GRAVITY as f32 * 0.6 * phase.sin();
    SensorSample::Accelerometer([0.0, lateral, STANDARD_GRAVITY as f32])
}
