#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;
use alloc::boxed::Box;

use terra_core::TerraResult;

/// How long writes to a backend survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Survives full power-off, but only after `commit()`.
    NonVolatile,
    /// Survives deep sleep while the hold-up domain is powered; lost on cold boot.
    SleepRetained,
}

/// Storage Medium Metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendProperties {
    pub capacity: usize,
    pub durability: Durability,
}

impl BackendProperties {
    pub fn needs_commit(&self) -> bool {
        self.durability == Durability::NonVolatile
    }
}

/// Raw byte region beneath the slot store.
///
/// Offsets are relative to the start of the reserved region. Every access is
/// bounds-checked against `properties().capacity`; a range that does not fit
/// fails with `OutOfRange` and touches nothing. Failures are never retried here.
pub trait StorageBackend: Send {
    fn properties(&self) -> BackendProperties;

    /// Fill `buf` with the bytes at `offset..offset + buf.len()`.
    fn read_raw(&mut self, offset: usize, buf: &mut [u8]) -> TerraResult<()>;

    /// Store `data` at `offset`. Not durable on non-volatile media until `commit()`.
    fn write_raw(&mut self, offset: usize, data: &[u8]) -> TerraResult<()>;

    /// Flush pending writes. Idempotent; a no-op when nothing is buffered.
    fn commit(&mut self) -> TerraResult<()>;
}

// Lets the runtime pick a backend at startup and hand the store a trait object.
impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn properties(&self) -> BackendProperties {
        (**self).properties()
    }
    fn read_raw(&mut self, offset: usize, buf: &mut [u8]) -> TerraResult<()> {
        (**self).read_raw(offset, buf)
    }
    fn write_raw(&mut self, offset: usize, data: &[u8]) -> TerraResult<()> {
        (**self).write_raw(offset, data)
    }
    fn commit(&mut self) -> TerraResult<()> {
        (**self).commit()
    }
}

/// Whole-image flash primitive underneath the EEPROM emulation.
///
/// `load` fills the caller's buffer from the medium (erased bytes read 0xFF);
/// `program` replaces the stored image. Both must stay within `capacity()`.
pub trait FlashMedium: Send {
    fn capacity(&self) -> usize;
    fn load(&mut self, buf: &mut [u8]) -> TerraResult<()>;
    fn program(&mut self, image: &[u8]) -> TerraResult<()>;
}

/// One reading from the environment sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature_c: f32,
    /// `None` on temperature-only probes (DS18B20).
    pub humidity_pct: Option<f32>,
}

/// Temperature / humidity probe (BME280, DS18B20, ...).
pub trait EnvironmentSensor: Send {
    fn read(&mut self) -> TerraResult<Measurement>;
}

/// Message-bus uplink.
pub trait Publisher: Send {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> TerraResult<()>;
}

/// Small status display (SSD1306 class).
pub trait DisplayPanel: Send {
    fn set_power(&mut self, on: bool);
    fn show(&mut self, measurement: &Measurement);
}

/// The Wall Clock.
pub trait PlatformClock: Send + Sync {
    /// Seconds since the Unix epoch, or `None` until time sync has completed.
    fn now_epoch(&self) -> Option<u32>;
}
