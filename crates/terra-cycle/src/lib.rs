#![no_std]
extern crate alloc;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;

use log::{info, warn};
use rand_core::RngCore;

use terra_core::{Slot, TerraResult};
use terra_hal::{DisplayPanel, EnvironmentSensor, Measurement, PlatformClock, Publisher, StorageBackend};
use terra_store::SlotStore;

pub mod schedule;
pub use schedule::DisplaySchedule;

#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Minimum seconds between two reports.
    pub interval_secs: u32,
    /// Unchanged readings allowed before a report is forced.
    pub max_skips: u32,
    /// Temperature change that always triggers a report. Compared against the
    /// last reading this kernel published, so it only applies from the second
    /// report after `new`.
    pub min_delta_c: f32,
    pub utc_offset_secs: i32,
    pub topic: String,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_skips: 10,
            min_delta_c: 0.2,
            utc_offset_secs: 0,
            topic: String::from("ha/sensor/tempsensor/status"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// No wall-clock time yet; nothing measured or persisted.
    Unsynced,
    TooEarly { remaining_secs: u32 },
    SensorFault,
    /// Reading too close to the last report; `count` consecutive skips so far.
    Skipped { count: u32 },
    PublishFault,
    Published(Measurement),
}

/// One sensor node: wakes, measures, decides whether to report.
///
/// Everything that must outlive a sleep cycle lives in the slot store, except
/// the last published temperature: no slot holds it, so a kernel rebuilt after
/// a wake always reports its first reading. Store failures are logged and the
/// cycle carries on with defaults.
pub struct NodeKernel<B> {
    store: SlotStore<B>,
    sensor: Box<dyn EnvironmentSensor>,
    publisher: Box<dyn Publisher>,
    display: Box<dyn DisplayPanel>,
    clock: Box<dyn PlatformClock>,
    config: CycleConfig,

    device_id: u32,
    // RAM only.
    last_published: Option<f32>,
    display_on: Option<bool>,
}

impl<B: StorageBackend> NodeKernel<B> {
    pub fn new(
        store: SlotStore<B>,
        sensor: Box<dyn EnvironmentSensor>,
        publisher: Box<dyn Publisher>,
        display: Box<dyn DisplayPanel>,
        clock: Box<dyn PlatformClock>,
        config: CycleConfig,
    ) -> Self {
        Self {
            store, sensor, publisher, display, clock, config,
            device_id: 0,
            last_published: None,
            display_on: None,
        }
    }

    /// Probe the store and make sure a device id exists.
    pub fn boot<R: RngCore>(&mut self, rng: &mut R) -> u32 {
        if let Err(e) = self.store.begin() {
            warn!(">>> [BOOT] store probe failed: {}", e);
        }

        self.device_id = match self.store.get_slot(Slot::DeviceId) {
            Ok(id) if id != 0 && id != u32::MAX => id,
            _ => {
                let id = loop {
                    let candidate = rng.next_u32();
                    if candidate != 0 && candidate != u32::MAX {
                        break candidate;
                    }
                };
                info!(">>> [BOOT] assigned device id {:08x}", id);
                self.persist(Slot::DeviceId, id);
                id
            }
        };

        info!(">>> [BOOT] device {:08x} ready", self.device_id);
        self.device_id
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn store(&self) -> &SlotStore<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SlotStore<B> {
        &mut self.store
    }

    pub fn into_store(self) -> SlotStore<B> {
        self.store
    }

    /// Persist the display window. The four slots are written one by one;
    /// an error part-way leaves the earlier ones updated.
    pub fn configure_schedule(&mut self, schedule: DisplaySchedule) -> TerraResult<()> {
        self.store.set_slot(Slot::ScheduleStartHour, schedule.start_hour as u32)?;
        self.store.set_slot(Slot::ScheduleStartMinute, schedule.start_minute as u32)?;
        self.store.set_slot(Slot::ScheduleEndHour, schedule.end_hour as u32)?;
        self.store.set_slot(Slot::ScheduleEndMinute, schedule.end_minute as u32)?;
        info!("display schedule {:?} stored", schedule);
        Ok(())
    }

    /// The stored window, if every slot holds a valid clock value.
    pub fn schedule(&mut self) -> Option<DisplaySchedule> {
        let sh = self.store.get_slot(Slot::ScheduleStartHour).ok()?;
        let sm = self.store.get_slot(Slot::ScheduleStartMinute).ok()?;
        let eh = self.store.get_slot(Slot::ScheduleEndHour).ok()?;
        let em = self.store.get_slot(Slot::ScheduleEndMinute).ok()?;
        DisplaySchedule::new(sh, sm, eh, em).ok()
    }

    /// Consecutive cycles without a report; 0 when the store has nothing.
    pub fn skipped_updates(&mut self) -> u32 {
        self.store.get_slot(Slot::SkippedUpdates).unwrap_or(0)
    }

    /// Run one wake cycle.
    ///
    /// The first valid reading after `new` is always published; change
    /// detection needs a previous report from this same kernel.
    pub fn poll(&mut self) -> CycleOutcome {
        let now = match self.clock.now_epoch() {
            Some(t) => t,
            None => return CycleOutcome::Unsynced,
        };

        self.apply_schedule(now);

        // 1. INTERVAL CHECK
        // A timestamp from the future is stale data, not a reason to wait.
        if let Ok(last) = self.store.get_slot(Slot::LastMeasure) {
            if last <= now && now - last < self.config.interval_secs {
                return CycleOutcome::TooEarly { remaining_secs: self.config.interval_secs - (now - last) };
            }
        }

        // 2. MEASURE
        let reading = match self.sensor.read() {
            Ok(m) => m,
            Err(e) => {
                warn!("[CYCLE] sensor read failed: {}", e);
                self.bump_skips();
                return CycleOutcome::SensorFault;
            }
        };
        if self.display_on != Some(false) {
            self.display.show(&reading);
        }

        // 3. CHANGE DETECTION
        let unchanged = match self.last_published {
            Some(prev) => {
                let delta = reading.temperature_c - prev;
                let delta = if delta < 0.0 { -delta } else { delta };
                delta < self.config.min_delta_c
            }
            None => false,
        };
        if unchanged && self.skipped_updates() < self.config.max_skips {
            let count = self.bump_skips();
            return CycleOutcome::Skipped { count };
        }

        // 4. REPORT
        let payload = self.payload(now, &reading);
        if let Err(e) = self.publisher.publish(&self.config.topic, payload.as_bytes()) {
            warn!("[CYCLE] publish failed: {}", e);
            self.bump_skips();
            return CycleOutcome::PublishFault;
        }

        self.persist(Slot::LastMeasure, now);
        self.persist(Slot::SkippedUpdates, 0);
        self.last_published = Some(reading.temperature_c);
        CycleOutcome::Published(reading)
    }

    fn payload(&self, now: u32, m: &Measurement) -> String {
        match m.humidity_pct {
            Some(h) => format!(
                "{{\"device\":\"{:08x}\",\"time\":{},\"temperature\":{:.2},\"humidity\":{:.1}}}",
                self.device_id, now, m.temperature_c, h
            ),
            None => format!(
                "{{\"device\":\"{:08x}\",\"time\":{},\"temperature\":{:.2}}}",
                self.device_id, now, m.temperature_c
            ),
        }
    }

    fn apply_schedule(&mut self, now: u32) {
        let minute = schedule::minute_of_day(now, self.config.utc_offset_secs);
        let want_on = self.schedule().map(|s| s.is_active(minute)).unwrap_or(true);

        if self.display_on != Some(want_on) {
            info!("[DISPLAY] {}", if want_on { "on" } else { "off" });
            self.display.set_power(want_on);
            self.display_on = Some(want_on);
        }
    }

    fn bump_skips(&mut self) -> u32 {
        let count = self.skipped_updates().saturating_add(1);
        self.persist(Slot::SkippedUpdates, count);
        count
    }

    fn persist(&mut self, slot: Slot, value: u32) {
        if let Err(e) = self.store.set_slot(slot, value) {
            warn!("[STORE] could not persist {}: {}", slot.name(), e);
        }
    }
}
