use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use colored::Colorize;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use terra_core::{TerraError, TerraResult};
use terra_hal::{DisplayPanel, EnvironmentSensor, Measurement, PlatformClock, Publisher};

pub mod setup;

/// Wall clock from the host, optionally held back to mimic a pending NTP sync.
pub struct SystemClock {
    started: Instant,
    sync_delay: Duration,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::with_sync_delay(Duration::ZERO)
    }

    pub fn with_sync_delay(sync_delay: Duration) -> Self {
        Self { started: Instant::now(), sync_delay }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformClock for SystemClock {
    fn now_epoch(&self) -> Option<u32> {
        if self.started.elapsed() < self.sync_delay {
            return None;
        }
        let secs = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        u32::try_from(secs).ok()
    }
}

/// Random-walk stand-in for a BME280 (or a DS18B20 when humidity is off).
pub struct SimulatedSensor {
    rng: StdRng,
    temperature_c: f32,
    humidity_pct: Option<f32>,
    fault_rate: f64,
}

impl SimulatedSensor {
    pub fn new(start_c: f32, with_humidity: bool) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            temperature_c: start_c,
            humidity_pct: with_humidity.then_some(45.0),
            fault_rate: 0.0,
        }
    }

    pub fn seeded(seed: u64, start_c: f32, with_humidity: bool) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), ..Self::new(start_c, with_humidity) }
    }

    /// Fraction of reads that fail, as a flaky I2C bus would.
    pub fn with_fault_rate(mut self, rate: f64) -> Self {
        self.fault_rate = rate.clamp(0.0, 1.0);
        self
    }
}

impl EnvironmentSensor for SimulatedSensor {
    fn read(&mut self) -> TerraResult<Measurement> {
        if self.fault_rate > 0.0 && self.rng.gen_bool(self.fault_rate) {
            warn!("[SENSOR] no response from probe");
            return Err(TerraError::SensorFailure);
        }

        self.temperature_c += self.rng.gen_range(-0.4..=0.4);
        if let Some(h) = self.humidity_pct.as_mut() {
            *h = (*h + self.rng.gen_range(-1.5..=1.5)).clamp(0.0, 100.0);
        }

        Ok(Measurement { temperature_c: self.temperature_c, humidity_pct: self.humidity_pct })
    }
}

/// Message bus stand-in: every publish goes to the log.
#[derive(Default)]
pub struct LogPublisher {
    published: usize,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> usize {
        self.published
    }
}

impl Publisher for LogPublisher {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> TerraResult<()> {
        let body = std::str::from_utf8(payload).map_err(|_| TerraError::PublishFailure)?;
        self.published += 1;
        info!(">>> [MQTT] #{} {} <- {}", self.published, topic, body);
        Ok(())
    }
}

/// Terminal rendering of the OLED panel.
#[derive(Default)]
pub struct ConsoleDisplay {
    on: bool,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplayPanel for ConsoleDisplay {
    fn set_power(&mut self, on: bool) {
        self.on = on;
        if on {
            println!("{}", "[display on]".green());
        } else {
            println!("{}", "[display off]".dimmed());
        }
    }

    fn show(&mut self, m: &Measurement) {
        if !self.on {
            return;
        }
        let temp = format!("{:>6.2} °C", m.temperature_c);
        let temp = match m.temperature_c {
            t if t < 18.0 => temp.blue(),
            t if t > 28.0 => temp.red(),
            _ => temp.green(),
        };
        match m.humidity_pct {
            Some(h) => println!("{}  {:>5.1} %", temp.bold(), h),
            None => println!("{}", temp.bold()),
        }
    }
}
