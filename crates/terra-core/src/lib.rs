#![no_std]
#[cfg(feature = "std")]
extern crate std;

/// Sentinel marking a store that has been written at least once.
pub const STORE_COOKIE: u32 = 8472;

/// Every slot is one little-endian u32.
pub const SLOT_WIDTH: usize = 4;

/// Logical slot indices. Adding a variant changes the persisted layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Slot {
    DeviceId = 0,
    ScheduleStartHour = 1,
    ScheduleStartMinute = 2,
    ScheduleEndHour = 3,
    ScheduleEndMinute = 4,
    LastMeasure = 5,
    SkippedUpdates = 6,
}

impl Slot {
    pub const COUNT: usize = 7;

    pub const ALL: [Slot; Slot::COUNT] = [
        Slot::DeviceId,
        Slot::ScheduleStartHour,
        Slot::ScheduleStartMinute,
        Slot::ScheduleEndHour,
        Slot::ScheduleEndMinute,
        Slot::LastMeasure,
        Slot::SkippedUpdates,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Slot::DeviceId => "device_id",
            Slot::ScheduleStartHour => "schedule_start_hour",
            Slot::ScheduleStartMinute => "schedule_start_minute",
            Slot::ScheduleEndHour => "schedule_end_hour",
            Slot::ScheduleEndMinute => "schedule_end_minute",
            Slot::LastMeasure => "last_measure",
            Slot::SkippedUpdates => "skipped_updates",
        }
    }
}

/// Width of the cookie at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieWidth {
    /// 2 bytes, the byte-addressable EEPROM image.
    Short,
    /// 4 bytes, the word-addressed retained block.
    Word,
}

impl CookieWidth {
    pub const fn bytes(self) -> usize {
        match self {
            CookieWidth::Short => 2,
            CookieWidth::Word => 4,
        }
    }
}

/// Direct-mapped image: cookie at 0, then `slot_count` slots back to back.
///
/// All values are encoded little-endian with a fixed width, so an image
/// written on one target decodes identically on any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub cookie: CookieWidth,
    pub slot_count: usize,
}

impl Layout {
    /// EEPROM emulated over flash: u16 cookie, u32 slots.
    pub const EEPROM: Layout = Layout { cookie: CookieWidth::Short, slot_count: Slot::COUNT };

    /// Sleep-retained memory: word cookie, word slots.
    pub const RETAINED: Layout = Layout { cookie: CookieWidth::Word, slot_count: Slot::COUNT };

    pub const fn new(cookie: CookieWidth, slot_count: usize) -> Self {
        Self { cookie, slot_count }
    }

    pub const fn cookie_width(&self) -> usize {
        self.cookie.bytes()
    }

    /// Bytes a backend must provide to hold this layout.
    pub const fn required_capacity(&self) -> usize {
        self.cookie.bytes() + self.slot_count * SLOT_WIDTH
    }

    pub const fn fits(&self, capacity: usize) -> bool {
        self.required_capacity() <= capacity
    }

    /// Byte offset of slot `index`. Indices past `slot_count` are rejected.
    pub fn slot_offset(&self, index: usize) -> TerraResult<usize> {
        if index >= self.slot_count {
            return Err(TerraError::OutOfRange);
        }
        index
            .checked_mul(SLOT_WIDTH)
            .and_then(|o| o.checked_add(self.cookie.bytes()))
            .ok_or(TerraError::OutOfRange)
    }

    /// Encodes `cookie` into `buf` and returns the bytes to write at offset 0.
    pub fn encode_cookie<'a>(&self, cookie: u32, buf: &'a mut [u8; 4]) -> &'a [u8] {
        match self.cookie {
            CookieWidth::Short => {
                buf[0..2].copy_from_slice(&(cookie as u16).to_le_bytes());
                &buf[0..2]
            }
            CookieWidth::Word => {
                *buf = cookie.to_le_bytes();
                &buf[..]
            }
        }
    }

    pub fn decode_cookie(&self, bytes: &[u8]) -> TerraResult<u32> {
        match self.cookie {
            CookieWidth::Short => {
                let raw: [u8; 2] = bytes.try_into().map_err(|_| TerraError::OutOfRange)?;
                Ok(u16::from_le_bytes(raw) as u32)
            }
            CookieWidth::Word => {
                let raw: [u8; 4] = bytes.try_into().map_err(|_| TerraError::OutOfRange)?;
                Ok(u32::from_le_bytes(raw))
            }
        }
    }

    pub const fn encode_slot(value: u32) -> [u8; SLOT_WIDTH] {
        value.to_le_bytes()
    }

    pub const fn decode_slot(bytes: [u8; SLOT_WIDTH]) -> u32 {
        u32::from_le_bytes(bytes)
    }
}

pub type TerraResult<T> = Result<T, TerraError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerraError {
    /// No valid cookie: the store has never been written (or was corrupted).
    NotInitialized,
    /// Slot index or byte range outside the reserved region.
    OutOfRange,
    /// The underlying medium reported a failure.
    BackendIo,
    SensorFailure,
    PublishFailure,
    InvalidConfig,
}

impl core::fmt::Display for TerraError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TerraError {}
