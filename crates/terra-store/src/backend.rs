use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

use log::{debug, warn};
use terra_core::{TerraError, TerraResult};
use terra_hal::{BackendProperties, Durability, FlashMedium, StorageBackend};

/// Erased NOR flash reads back as all ones.
pub const ERASED_BYTE: u8 = 0xFF;

/// Bounds check shared by every backend: `offset..offset + len` within `capacity`.
pub(crate) fn region(capacity: usize, offset: usize, len: usize) -> TerraResult<Range<usize>> {
    let end = offset.checked_add(len).ok_or(TerraError::OutOfRange)?;
    if end > capacity {
        return Err(TerraError::OutOfRange);
    }
    Ok(offset..end)
}

/// Byte-addressable EEPROM emulated over a flash medium.
///
/// Reads and writes go to a RAM shadow loaded once by `open`. Nothing reaches
/// the medium until `commit()`, which programs the whole shadow if it changed.
pub struct EmulatedEeprom<M> {
    medium: M,
    shadow: Vec<u8>,
    dirty: bool,
}

impl<M: FlashMedium> EmulatedEeprom<M> {
    /// Reserve `size` bytes at the start of `medium` and load them.
    pub fn open(mut medium: M, size: usize) -> TerraResult<Self> {
        if size > medium.capacity() {
            warn!("EEPROM size {} exceeds flash capacity {}", size, medium.capacity());
            return Err(TerraError::OutOfRange);
        }

        let mut shadow = vec![ERASED_BYTE; size];
        medium.load(&mut shadow)?;
        debug!("EEPROM shadow loaded ({} bytes)", size);

        Ok(Self { medium, shadow, dirty: false })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    /// Drops the shadow, including any uncommitted writes.
    pub fn into_medium(self) -> M {
        self.medium
    }
}

impl<M: FlashMedium> StorageBackend for EmulatedEeprom<M> {
    fn properties(&self) -> BackendProperties {
        BackendProperties { capacity: self.shadow.len(), durability: Durability::NonVolatile }
    }

    fn read_raw(&mut self, offset: usize, buf: &mut [u8]) -> TerraResult<()> {
        let range = region(self.shadow.len(), offset, buf.len())?;
        buf.copy_from_slice(&self.shadow[range]);
        Ok(())
    }

    fn write_raw(&mut self, offset: usize, data: &[u8]) -> TerraResult<()> {
        let range = region(self.shadow.len(), offset, data.len())?;
        let target = &mut self.shadow[range];
        if target != data {
            target.copy_from_slice(data);
            self.dirty = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> TerraResult<()> {
        if !self.dirty {
            return Ok(());
        }
        // Dirty stays set on failure so the next commit retries the flush.
        self.medium.program(&self.shadow)?;
        self.dirty = false;
        Ok(())
    }
}

/// In-RAM flash medium.
///
/// Supports fault injection and program counting for exercising the store's
/// failure paths without hardware.
#[derive(Debug, Clone)]
pub struct MemoryFlash {
    data: Vec<u8>,
    program_count: usize,
    fail_programs: usize,
    fail_loads: usize,
}

impl MemoryFlash {
    /// A fully erased part.
    pub fn new(capacity: usize) -> Self {
        Self { data: vec![ERASED_BYTE; capacity], program_count: 0, fail_programs: 0, fail_loads: 0 }
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Number of successful `program` calls.
    pub fn program_count(&self) -> usize {
        self.program_count
    }

    /// The next `count` programs fail with `BackendIo` and leave the data untouched.
    pub fn fail_next_programs(&mut self, count: usize) {
        self.fail_programs = count;
    }

    pub fn fail_next_loads(&mut self, count: usize) {
        self.fail_loads = count;
    }

    /// Overwrite bytes directly, as a brown-out during programming would.
    pub fn inject_corruption(&mut self, offset: usize, pattern: &[u8]) {
        let end = (offset + pattern.len()).min(self.data.len());
        if offset < end {
            self.data[offset..end].copy_from_slice(&pattern[..end - offset]);
        }
    }
}

impl FlashMedium for MemoryFlash {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn load(&mut self, buf: &mut [u8]) -> TerraResult<()> {
        if self.fail_loads > 0 {
            self.fail_loads -= 1;
            return Err(TerraError::BackendIo);
        }
        let range = region(self.data.len(), 0, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn program(&mut self, image: &[u8]) -> TerraResult<()> {
        if self.fail_programs > 0 {
            self.fail_programs -= 1;
            return Err(TerraError::BackendIo);
        }
        let range = region(self.data.len(), 0, image.len())?;
        self.data[range].copy_from_slice(image);
        self.program_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_bounds() {
        assert_eq!(region(30, 26, 4), Ok(26..30));
        assert_eq!(region(30, 27, 4), Err(TerraError::OutOfRange));
        assert_eq!(region(30, usize::MAX, 1), Err(TerraError::OutOfRange));
        assert_eq!(region(30, 30, 0), Ok(30..30));
    }

    #[test]
    fn test_unchanged_write_stays_clean() {
        let mut eeprom = EmulatedEeprom::open(MemoryFlash::new(64), 30).unwrap();

        eeprom.write_raw(0, &[ERASED_BYTE, ERASED_BYTE]).unwrap();
        assert!(!eeprom.is_dirty());

        eeprom.write_raw(0, &[0x18, 0x21]).unwrap();
        assert!(eeprom.is_dirty());
    }

    #[test]
    fn test_corruption_clamped_to_capacity() {
        let mut flash = MemoryFlash::new(4);
        flash.inject_corruption(2, &[0xAA; 8]);
        assert_eq!(flash.contents(), &[0xFF, 0xFF, 0xAA, 0xAA]);
    }
}
