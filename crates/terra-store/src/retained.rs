use rand_core::RngCore;
use zeroize::Zeroize;

use terra_core::TerraResult;
use terra_hal::{BackendProperties, Durability, StorageBackend};

use crate::backend::region;

/// Words of user memory kept alive by the RTC power domain.
pub const RETAINED_WORDS: usize = 16;
pub const RETAINED_BYTES: usize = RETAINED_WORDS * 4;

/// Memory block that survives deep sleep but not a cold boot.
///
/// Writes land immediately; there is nothing to flush. The block is owned by
/// value, so whoever carries it across a sleep cycle decides what survives.
#[derive(Clone)]
pub struct RetainedMemory {
    block: [u8; RETAINED_BYTES],
}

impl RetainedMemory {
    /// Power-on content after a full power cycle: arbitrary.
    pub fn cold_boot<R: RngCore>(rng: &mut R) -> Self {
        let mut block = [0u8; RETAINED_BYTES];
        rng.fill_bytes(&mut block);
        Self { block }
    }

    /// Power-on content on parts that clear the domain on brown-out.
    pub fn zeroed() -> Self {
        Self { block: [0u8; RETAINED_BYTES] }
    }

    pub fn from_bytes(block: [u8; RETAINED_BYTES]) -> Self {
        Self { block }
    }

    pub fn as_bytes(&self) -> &[u8; RETAINED_BYTES] {
        &self.block
    }

    /// The hold-up domain lost power: contents become arbitrary.
    pub fn power_loss<R: RngCore>(&mut self, rng: &mut R) {
        rng.fill_bytes(&mut self.block);
    }

    pub fn wipe(&mut self) {
        self.block.zeroize();
    }
}

impl StorageBackend for RetainedMemory {
    fn properties(&self) -> BackendProperties {
        BackendProperties { capacity: RETAINED_BYTES, durability: Durability::SleepRetained }
    }

    fn read_raw(&mut self, offset: usize, buf: &mut [u8]) -> TerraResult<()> {
        let range = region(RETAINED_BYTES, offset, buf.len())?;
        buf.copy_from_slice(&self.block[range]);
        Ok(())
    }

    fn write_raw(&mut self, offset: usize, data: &[u8]) -> TerraResult<()> {
        let range = region(RETAINED_BYTES, offset, data.len())?;
        self.block[range].copy_from_slice(data);
        Ok(())
    }

    fn commit(&mut self) -> TerraResult<()> {
        Ok(())
    }
}
