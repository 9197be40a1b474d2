use terra_core::{CookieWidth, Layout, Slot, TerraError, TerraResult, STORE_COOKIE};
use terra_hal::{BackendProperties, StorageBackend};
use terra_store::{EmulatedEeprom, MemoryFlash, SlotStore};

/// Wraps a backend and records every access.
struct Recorder<B> {
    inner: B,
    reads: usize,
    writes: Vec<(usize, Vec<u8>)>,
    commits: usize,
    fail_write_at: Option<usize>,
}

impl<B> Recorder<B> {
    fn new(inner: B) -> Self {
        Self { inner, reads: 0, writes: Vec::new(), commits: 0, fail_write_at: None }
    }

    fn cookie_writes(&self) -> usize {
        self.writes.iter().filter(|(offset, _)| *offset == 0).count()
    }

    fn io_count(&self) -> usize {
        self.reads + self.writes.len() + self.commits
    }
}

impl<B: StorageBackend> StorageBackend for Recorder<B> {
    fn properties(&self) -> BackendProperties {
        self.inner.properties()
    }
    fn read_raw(&mut self, offset: usize, buf: &mut [u8]) -> TerraResult<()> {
        self.reads += 1;
        self.inner.read_raw(offset, buf)
    }
    fn write_raw(&mut self, offset: usize, data: &[u8]) -> TerraResult<()> {
        if self.fail_write_at == Some(offset) {
            return Err(TerraError::BackendIo);
        }
        self.writes.push((offset, data.to_vec()));
        self.inner.write_raw(offset, data)
    }
    fn commit(&mut self) -> TerraResult<()> {
        self.commits += 1;
        self.inner.commit()
    }
}

fn eeprom(flash: MemoryFlash) -> EmulatedEeprom<MemoryFlash> {
    let size = Layout::EEPROM.required_capacity();
    EmulatedEeprom::open(flash, size).unwrap()
}

fn fresh_store() -> SlotStore<Recorder<EmulatedEeprom<MemoryFlash>>> {
    let mut store = SlotStore::new(Recorder::new(eeprom(MemoryFlash::new(64))), Layout::EEPROM).unwrap();
    store.begin().unwrap();
    store
}

#[test]
fn test_cold_start_is_uninitialized() {
    let store = fresh_store();
    assert!(!store.is_initialized());

    let mut store = store;
    for slot in Slot::ALL {
        assert_eq!(store.get_slot(slot), Err(TerraError::NotInitialized));
    }
}

#[test]
fn test_get_before_begin_does_not_crash() {
    let mut flash = MemoryFlash::new(64);
    flash.inject_corruption(0, &[0x18, 0x21]);

    // Valid cookie on the medium, but nobody probed it yet.
    let mut store = SlotStore::new(eeprom(flash), Layout::EEPROM).unwrap();
    assert_eq!(store.get(0), Err(TerraError::NotInitialized));

    assert_eq!(store.begin(), Ok(true));
    assert!(store.get(0).is_ok());
}

#[test]
fn test_round_trip_every_slot() {
    let mut store = fresh_store();
    let values = [0, 1, 450, 0x7FFF_FFFF, u32::MAX, 1_700_000_000, 3];

    for (slot, value) in Slot::ALL.into_iter().zip(values) {
        store.set_slot(slot, value).unwrap();
        assert_eq!(store.get_slot(slot), Ok(value));
    }
    for (slot, value) in Slot::ALL.into_iter().zip(values) {
        assert_eq!(store.get_slot(slot), Ok(value));
    }
}

#[test]
fn test_out_of_range_performs_no_io() {
    let mut store = fresh_store();
    let before = store.backend().io_count();

    assert_eq!(store.get(Slot::COUNT), Err(TerraError::OutOfRange));
    assert_eq!(store.set(Slot::COUNT, 1), Err(TerraError::OutOfRange));
    assert_eq!(store.set(usize::MAX, 1), Err(TerraError::OutOfRange));

    assert_eq!(store.backend().io_count(), before);
    assert!(!store.is_initialized());
}

#[test]
fn test_out_of_range_wins_over_not_initialized() {
    let mut store = fresh_store();
    assert_eq!(store.get(99), Err(TerraError::OutOfRange));
}

#[test]
fn test_cookie_written_once() {
    let mut store = fresh_store();

    store.set(0, 11).unwrap();
    store.set(1, 22).unwrap();
    store.set(0, 33).unwrap();

    assert_eq!(store.backend().cookie_writes(), 1);

    let mut raw = [0u8; 2];
    let mut backend = store.into_backend();
    backend.read_raw(0, &mut raw).unwrap();
    assert_eq!(u16::from_le_bytes(raw) as u32, STORE_COOKIE);

    // A fresh store over the same medium sees the same cookie.
    let flash = backend.inner.into_medium();
    assert_eq!(&flash.contents()[0..2], &raw);
    let mut reopened = SlotStore::new(eeprom(flash), Layout::EEPROM).unwrap();
    assert_eq!(reopened.begin(), Ok(true));
    assert_eq!(reopened.get(0), Ok(33));
    assert_eq!(reopened.get(1), Ok(22));
}

#[test]
fn test_set_commits_every_write() {
    let mut store = fresh_store();
    store.set_slot(Slot::LastMeasure, 100).unwrap();
    store.set_slot(Slot::SkippedUpdates, 2).unwrap();
    assert_eq!(store.backend().commits, 2);
}

#[test]
fn test_cookie_gates_whole_store() {
    // 4 slots of 4 bytes behind a 2-byte cookie.
    let layout = Layout::new(CookieWidth::Short, 4);
    let mut flash = MemoryFlash::new(layout.required_capacity());
    // Left over in slot 3 from an earlier image.
    flash.inject_corruption(layout.slot_offset(3).unwrap(), &[0x2A, 0, 0, 0]);

    let eeprom = EmulatedEeprom::open(flash, layout.required_capacity()).unwrap();
    let mut store = SlotStore::new(eeprom, layout).unwrap();
    store.begin().unwrap();

    assert_eq!(store.get(3), Err(TerraError::NotInitialized));
    store.set(2, 450).unwrap();
    assert_eq!(store.get(2), Ok(450));

    // Slot 3 was never written through the store, yet it reads back as valid.
    assert_eq!(store.get(3), Ok(42));
    // Slot 0 likewise returns the erased pattern.
    assert_eq!(store.get(0), Ok(u32::MAX));
}

#[test]
fn test_failed_commit_keeps_flag_down() {
    let mut flash = MemoryFlash::new(64);
    flash.fail_next_programs(1);
    let mut store = SlotStore::new(eeprom(flash), Layout::EEPROM).unwrap();
    store.begin().unwrap();

    assert_eq!(store.set(2, 450), Err(TerraError::BackendIo));
    assert!(!store.is_initialized());
    assert_eq!(store.get(2), Err(TerraError::NotInitialized));

    // Nothing reached the medium.
    let flash = store.into_backend().into_medium();
    assert_eq!(flash.program_count(), 0);
    assert!(flash.contents().iter().all(|&b| b == 0xFF));
}

#[test]
fn test_retry_after_failed_commit() {
    let mut flash = MemoryFlash::new(64);
    flash.fail_next_programs(1);
    let mut store = SlotStore::new(eeprom(flash), Layout::EEPROM).unwrap();
    store.begin().unwrap();

    assert!(store.set(2, 450).is_err());
    store.set(2, 451).unwrap();
    assert!(store.is_initialized());
    assert_eq!(store.get(2), Ok(451));
}

#[test]
fn test_begin_after_failed_first_commit_sees_empty_store() {
    let mut flash = MemoryFlash::new(64);
    flash.fail_next_programs(1);
    let mut store = SlotStore::new(eeprom(flash), Layout::EEPROM).unwrap();
    store.begin().unwrap();

    assert_eq!(store.set(2, 450), Err(TerraError::BackendIo));

    // The shadow is still dirty with the value, but the cookie was rolled back.
    assert_eq!(store.begin(), Ok(false));
    assert_eq!(store.get(2), Err(TerraError::NotInitialized));
    assert_eq!(store.stored_cookie(), Ok(0xFFFF));
    assert_eq!(store.backend().medium().program_count(), 0);
}

#[test]
fn test_begin_after_failed_first_value_write_sees_empty_store() {
    let mut recorder = Recorder::new(eeprom(MemoryFlash::new(64)));
    recorder.fail_write_at = Layout::EEPROM.slot_offset(4).ok();
    let mut store = SlotStore::new(recorder, Layout::EEPROM).unwrap();
    store.begin().unwrap();

    assert_eq!(store.set(4, 9), Err(TerraError::BackendIo));
    assert_eq!(store.begin(), Ok(false));
    assert_eq!(store.get(0), Err(TerraError::NotInitialized));

    // Sentinel out, then the erased bytes back in.
    let cookie_writes: Vec<_> = store
        .backend()
        .writes
        .iter()
        .filter(|(offset, _)| *offset == 0)
        .map(|(_, data)| data.clone())
        .collect();
    assert_eq!(cookie_writes, vec![vec![0x18, 0x21], vec![0xFF, 0xFF]]);
}

#[test]
fn test_stored_cookie_ignores_flag() {
    let mut store = fresh_store();
    assert_eq!(store.stored_cookie(), Ok(0xFFFF));

    store.set_slot(Slot::DeviceId, 1).unwrap();
    assert_eq!(store.stored_cookie(), Ok(STORE_COOKIE));

    store.erase().unwrap();
    assert_eq!(store.stored_cookie(), Ok(0));
    assert!(!store.is_initialized());
}

#[test]
fn test_failed_value_write_keeps_flag_down() {
    let mut recorder = Recorder::new(eeprom(MemoryFlash::new(64)));
    recorder.fail_write_at = Layout::EEPROM.slot_offset(1).ok();
    let mut store = SlotStore::new(recorder, Layout::EEPROM).unwrap();
    store.begin().unwrap();

    assert_eq!(store.set(1, 7), Err(TerraError::BackendIo));
    assert!(!store.is_initialized());
    assert_eq!(store.backend().commits, 0);
}

#[test]
fn test_failed_write_after_init_leaves_other_slots_readable() {
    let mut store = fresh_store();
    store.set(0, 5).unwrap();

    let mut backend = store.into_backend();
    backend.fail_write_at = Layout::EEPROM.slot_offset(1).ok();
    let mut store = SlotStore::new(backend, Layout::EEPROM).unwrap();
    store.begin().unwrap();

    assert_eq!(store.set(1, 9), Err(TerraError::BackendIo));
    assert!(store.is_initialized());
    assert_eq!(store.get(0), Ok(5));
}

#[test]
fn test_corrupt_cookie_reads_as_uninitialized() {
    let mut store = fresh_store();
    store.set(0, 1234).unwrap();
    let mut flash = store.into_backend().inner.into_medium();

    flash.inject_corruption(0, &[0xAA]);

    let mut store = SlotStore::new(eeprom(flash), Layout::EEPROM).unwrap();
    assert_eq!(store.begin(), Ok(false));
    assert_eq!(store.get(0), Err(TerraError::NotInitialized));

    // The next write reclaims the store.
    store.set(1, 1).unwrap();
    assert_eq!(store.get(1), Ok(1));
}

#[test]
fn test_layout_must_fit_backend() {
    let small = EmulatedEeprom::open(MemoryFlash::new(64), 16).unwrap();
    assert!(matches!(SlotStore::new(small, Layout::EEPROM), Err(TerraError::OutOfRange)));
}

#[test]
fn test_erase_resets_store() {
    let mut store = fresh_store();
    store.set_slot(Slot::DeviceId, 77).unwrap();

    store.erase().unwrap();
    assert!(!store.is_initialized());
    assert_eq!(store.get_slot(Slot::DeviceId), Err(TerraError::NotInitialized));

    assert_eq!(store.begin(), Ok(false));
}
