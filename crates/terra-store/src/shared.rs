use spin::Mutex;

use terra_core::{Slot, TerraResult};
use terra_hal::StorageBackend;

use crate::SlotStore;

/// A `SlotStore` reachable from more than one execution context.
///
/// Every operation holds the lock for its full cookie-check-then-write
/// sequence, so no reader can observe a half-written cookie + value pair.
pub struct SharedStore<B> {
    inner: Mutex<SlotStore<B>>,
}

impl<B: StorageBackend> SharedStore<B> {
    pub fn new(store: SlotStore<B>) -> Self {
        Self { inner: Mutex::new(store) }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_initialized()
    }

    pub fn get(&self, index: usize) -> TerraResult<u32> {
        self.inner.lock().get(index)
    }

    pub fn set(&self, index: usize, value: u32) -> TerraResult<()> {
        self.inner.lock().set(index, value)
    }

    /// Read-modify-write of one slot as a single critical section.
    /// An uninitialized store reads as 0.
    pub fn update(&self, slot: Slot, f: impl FnOnce(u32) -> u32) -> TerraResult<u32> {
        let mut store = self.inner.lock();
        let current = if store.is_initialized() { store.get_slot(slot)? } else { 0 };
        let next = f(current);
        store.set_slot(slot, next)?;
        Ok(next)
    }

    /// Run `f` with exclusive access to the store.
    pub fn with<T>(&self, f: impl FnOnce(&mut SlotStore<B>) -> T) -> T {
        f(&mut self.inner.lock())
    }

    pub fn into_inner(self) -> SlotStore<B> {
        self.inner.into_inner()
    }
}
