use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use log::info;

use terra_core::{CookieWidth, Layout, STORE_COOKIE};
use terra_hal::StorageBackend;
use terra_store::fs_backend::FileFlash;
use terra_store::{EmulatedEeprom, RetainedMemory, SlotStore};

/// One flash sector reserved for the emulated EEPROM.
pub const FLASH_SECTOR: usize = 4096;

pub const EEPROM_SIZE: usize = Layout::EEPROM.required_capacity();

/// Which retention mechanism this image stores its slots in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Flash-emulated EEPROM, persisted to a host file.
    Eeprom,
    /// RTC user memory; lives only as long as this process.
    Retained,
}

impl BackendKind {
    pub fn layout(self) -> Layout {
        match self {
            BackendKind::Eeprom => Layout::EEPROM,
            BackendKind::Retained => Layout::RETAINED,
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eeprom" | "flash" => Ok(BackendKind::Eeprom),
            "retained" | "rtc" => Ok(BackendKind::Retained),
            other => Err(format!("unknown backend '{}' (expected eeprom or retained)", other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Eeprom => write!(f, "eeprom"),
            BackendKind::Retained => write!(f, "retained"),
        }
    }
}

/// What a raw cookie value says about an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieState {
    Valid,
    /// Still the erased pattern: never written.
    Erased,
    /// Anything else, including the zero left by a factory reset.
    Foreign(u32),
}

impl CookieState {
    pub fn classify(cookie: u32, layout: Layout) -> Self {
        let erased = match layout.cookie {
            CookieWidth::Short => 0xFFFF,
            CookieWidth::Word => u32::MAX,
        };
        if cookie == STORE_COOKIE {
            CookieState::Valid
        } else if cookie == erased {
            CookieState::Erased
        } else {
            CookieState::Foreign(cookie)
        }
    }
}

/// Open the EEPROM image at `path`.
pub fn open_eeprom(path: &Path) -> anyhow::Result<EmulatedEeprom<FileFlash>> {
    let flash = FileFlash::new(path, FLASH_SECTOR)
        .with_context(|| format!("cannot prepare {}", path.display()))?;
    EmulatedEeprom::open(flash, EEPROM_SIZE)
        .with_context(|| format!("cannot load EEPROM image {}", path.display()))
}

/// The single place a backend is chosen. Everything above it sees a `StorageBackend`.
pub fn open_backend(kind: BackendKind, path: &Path) -> anyhow::Result<Box<dyn StorageBackend>> {
    let backend: Box<dyn StorageBackend> = match kind {
        BackendKind::Eeprom => {
            info!(">>> [SETUP] EEPROM image {}", path.display());
            Box::new(open_eeprom(path)?)
        }
        BackendKind::Retained => {
            // A fresh process is a cold boot: retained memory holds noise.
            info!(">>> [SETUP] retained memory (cold boot)");
            Box::new(RetainedMemory::cold_boot(&mut rand::thread_rng()))
        }
    };
    Ok(backend)
}

pub fn open_store(kind: BackendKind, path: &Path) -> anyhow::Result<SlotStore<Box<dyn StorageBackend>>> {
    let backend = open_backend(kind, path)?;
    SlotStore::new(backend, kind.layout()).context("layout does not fit backend")
}
