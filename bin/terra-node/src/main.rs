use std::path::PathBuf;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use terra_cycle::{CycleConfig, CycleOutcome, DisplaySchedule, NodeKernel};
use terra_linux::setup::{self, BackendKind};
use terra_linux::{ConsoleDisplay, LogPublisher, SimulatedSensor, SystemClock};

#[derive(Parser)]
struct Cli {
    /// eeprom (survives restarts) or retained (survives sleep only)
    #[arg(long, default_value = "eeprom")] backend: BackendKind,
    #[arg(long, default_value = "terra-eeprom.bin")] state: PathBuf,
    /// Minimum seconds between reports
    #[arg(long, default_value = "30")] interval: u32,
    /// Wake cycles to run; 0 runs until interrupted
    #[arg(long, default_value = "0")] cycles: u64,
    /// Simulated deep-sleep length between cycles
    #[arg(long, default_value = "5000")] sleep_ms: u64,
    #[arg(long, default_value = "10")] max_skips: u32,
    #[arg(long, default_value = "0.2")] min_delta: f32,
    /// Display-on window, HH:MM-HH:MM (stored in the slot store)
    #[arg(long)] schedule: Option<String>,
    #[arg(long, default_value = "0", allow_hyphen_values = true)] utc_offset: i32,
    /// Temperature-only probe (DS18B20)
    #[arg(long)] no_humidity: bool,
    /// Fraction of sensor reads that fail
    #[arg(long, default_value = "0.0")] sensor_faults: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!(">>> TERRA NODE: v{} <<<", env!("CARGO_PKG_VERSION"));
    info!("Backend: {} / interval {}s / sleep {}ms", cli.backend, cli.interval, cli.sleep_ms);

    let store = setup::open_store(cli.backend, &cli.state)?;

    let config = CycleConfig {
        interval_secs: cli.interval,
        max_skips: cli.max_skips,
        min_delta_c: cli.min_delta,
        utc_offset_secs: cli.utc_offset,
        ..CycleConfig::default()
    };

    let sensor = SimulatedSensor::new(21.0, !cli.no_humidity).with_fault_rate(cli.sensor_faults);

    let mut kernel = NodeKernel::new(
        store,
        Box::new(sensor), Box::new(LogPublisher::new()), Box::new(ConsoleDisplay::new()),
        Box::new(SystemClock::new()),
        config,
    );

    kernel.boot(&mut rand::thread_rng());

    if let Some(text) = &cli.schedule {
        let schedule = DisplaySchedule::parse(text)
            .with_context(|| format!("invalid --schedule '{}'", text))?;
        if let Err(e) = kernel.configure_schedule(schedule) {
            warn!("schedule not stored: {}", e);
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("Signal received. Stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    info!("Node Active. Entering wake/sleep loop...");
    let mut cycle = 0u64;

    while running.load(Ordering::SeqCst) {
        cycle += 1;
        match kernel.poll() {
            CycleOutcome::Published(m) => info!("[CYCLE {}] published {:.2} °C", cycle, m.temperature_c),
            CycleOutcome::Skipped { count } => info!("[CYCLE {}] unchanged, skip #{}", cycle, count),
            CycleOutcome::TooEarly { remaining_secs } => info!("[CYCLE {}] next report in {}s", cycle, remaining_secs),
            CycleOutcome::Unsynced => warn!("[CYCLE {}] clock not synced", cycle),
            CycleOutcome::SensorFault => warn!("[CYCLE {}] sensor fault", cycle),
            CycleOutcome::PublishFault => warn!("[CYCLE {}] publish fault", cycle),
        }

        if cli.cycles != 0 && cycle >= cli.cycles {
            break;
        }

        // Deep sleep, woken early by a signal.
        let mut slept = 0;
        while slept < cli.sleep_ms && running.load(Ordering::SeqCst) {
            let step = (cli.sleep_ms - slept).min(100);
            std::thread::sleep(Duration::from_millis(step));
            slept += step;
        }
    }

    info!(
        "Stopped after {} cycles (device {:08x}, {} consecutive skips)",
        cycle,
        kernel.device_id(),
        kernel.skipped_updates()
    );
    Ok(())
}
