#![no_std]
#![forbid(unsafe_code)]
#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod backend;
#[cfg(feature = "std")]
pub mod fs_backend;
pub mod retained;
pub mod shared;

pub use backend::{EmulatedEeprom, MemoryFlash};
pub use retained::{RetainedMemory, RETAINED_BYTES, RETAINED_WORDS};
pub use shared::SharedStore;

use log::{debug, info, warn};
use terra_core::{Layout, Slot, TerraError, TerraResult, STORE_COOKIE};
use terra_hal::StorageBackend;

/// Integer-indexed value store on top of a raw backend.
///
/// A single cookie at offset 0 gates every slot: once any slot has been
/// written, all slots read back as valid, including ones never written in
/// this image. Untouched slots then return whatever the medium held.
pub struct SlotStore<B> {
    backend: B,
    layout: Layout,
    initialized: bool,
}

impl<B: StorageBackend> SlotStore<B> {
    /// Wrap `backend`. Fails if `layout` does not fit its capacity.
    /// The store reports uninitialized until `begin()` finds a cookie.
    pub fn new(backend: B, layout: Layout) -> TerraResult<Self> {
        let props = backend.properties();
        if !layout.fits(props.capacity) {
            warn!(
                "layout needs {} bytes, backend has {}",
                layout.required_capacity(),
                props.capacity
            );
            return Err(TerraError::OutOfRange);
        }
        Ok(Self { backend, layout, initialized: false })
    }

    /// Probe the cookie and cache the result.
    ///
    /// Calling again re-derives the flag from the current backend content.
    /// A failed read leaves the store uninitialized.
    pub fn begin(&mut self) -> TerraResult<bool> {
        self.initialized = false;

        let width = self.layout.cookie_width();
        let mut raw = [0u8; 4];
        self.backend.read_raw(0, &mut raw[..width])?;
        let cookie = self.layout.decode_cookie(&raw[..width])?;

        self.initialized = cookie == STORE_COOKIE;
        if self.initialized {
            info!(">>> [STORE] cookie valid, {} slots readable", self.layout.slot_count);
        } else {
            info!(">>> [STORE] no cookie (found {}), store uninitialized", cookie);
        }
        Ok(self.initialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Hand the medium back, e.g. to carry it across a sleep cycle.
    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn get(&mut self, index: usize) -> TerraResult<u32> {
        let offset = self.layout.slot_offset(index)?;
        if !self.initialized {
            return Err(TerraError::NotInitialized);
        }

        let mut raw = [0u8; 4];
        self.backend.read_raw(offset, &mut raw)?;
        Ok(Layout::decode_slot(raw))
    }

    /// Write one slot and commit.
    ///
    /// Order: bounds, cookie (first write only), value, commit, flag. The flag
    /// is raised only once all of those succeed; any failure leaves it as it was.
    /// If the first write fails after the cookie went out, the previous cookie
    /// bytes are put back so a later `begin()` still reads an empty store.
    pub fn set(&mut self, index: usize, value: u32) -> TerraResult<()> {
        let offset = self.layout.slot_offset(index)?;

        let width = self.layout.cookie_width();
        let mut prior = [0u8; 4];
        if !self.initialized {
            self.backend.read_raw(0, &mut prior[..width])?;
            let mut raw = [0u8; 4];
            let cookie = self.layout.encode_cookie(STORE_COOKIE, &mut raw);
            self.backend.write_raw(0, cookie)?;
        }

        let written = self
            .backend
            .write_raw(offset, &Layout::encode_slot(value))
            .and_then(|()| self.backend.commit());

        if let Err(e) = written {
            if !self.initialized {
                if let Err(undo) = self.backend.write_raw(0, &prior[..width]) {
                    warn!(">>> [STORE] cookie rollback failed: {}", undo);
                }
            }
            return Err(e);
        }

        if !self.initialized {
            info!(">>> [STORE] first write, cookie committed");
            self.initialized = true;
        }
        debug!("slot {} <- {}", index, value);
        Ok(())
    }

    /// The cookie as it currently sits in the backend, whatever the flag says.
    pub fn stored_cookie(&mut self) -> TerraResult<u32> {
        let width = self.layout.cookie_width();
        let mut raw = [0u8; 4];
        self.backend.read_raw(0, &mut raw[..width])?;
        self.layout.decode_cookie(&raw[..width])
    }

    pub fn get_slot(&mut self, slot: Slot) -> TerraResult<u32> {
        self.get(slot.index())
    }

    pub fn set_slot(&mut self, slot: Slot, value: u32) -> TerraResult<()> {
        self.set(slot.index(), value)
    }

    /// Factory reset: invalidate the cookie, zero every slot, commit.
    ///
    /// The flag drops before any I/O, so a failed erase still reads as
    /// uninitialized for the rest of this session.
    pub fn erase(&mut self) -> TerraResult<()> {
        self.initialized = false;

        let mut raw = [0u8; 4];
        let cookie = self.layout.encode_cookie(0, &mut raw);
        self.backend.write_raw(0, cookie)?;
        for index in 0..self.layout.slot_count {
            let offset = self.layout.slot_offset(index)?;
            self.backend.write_raw(offset, &Layout::encode_slot(0))?;
        }
        self.backend.commit()?;

        info!(">>> [STORE] erased");
        Ok(())
    }
}
