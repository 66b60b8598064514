//! Bounded FIFO for passing values from interrupt context to threads.
//!
//! `put` never blocks, so event callbacks and interrupt handlers can feed
//! it; when the queue is full the value is dropped and counted. `get` blocks
//! the calling thread on the queue's occupancy semaphore until data arrives.

use super::semaphore::Semaphore;
use crate::arch::Arch;
use crate::critical::CriticalSection;
use crate::errors::{KernelError, KernelResult};
use crate::kernel::Kernel;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use log::warn;
use portable_atomic::{AtomicU32, AtomicUsize, Ordering};

/// Fixed-capacity ring buffer of `CAP` values.
///
/// `stored` counts written slots not yet read and alone decides whether the
/// queue is full. The occupancy semaphore only drives blocking: while a
/// woken consumer has not yet read its value, the semaphore is already one
/// below `stored`.
pub struct Fifo<T: Copy, const CAP: usize> {
    slots: UnsafeCell<[MaybeUninit<T>; CAP]>,
    put_index: AtomicUsize,
    get_index: AtomicUsize,
    /// Slots written by `put` and not yet read
    stored: AtomicUsize,
    occupancy: Semaphore,
    /// Values dropped because the queue was full
    lost: AtomicU32,
}

// Safety: slot access is serialized by kernel critical sections and the
// occupancy semaphore guarantees `get` only reads written slots.
unsafe impl<T: Copy + Send, const CAP: usize> Sync for Fifo<T, CAP> {}

impl<T: Copy, const CAP: usize> Fifo<T, CAP> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        assert!(CAP > 0, "fifo capacity must be non-zero");
        Self {
            // Safety: an array of MaybeUninit needs no initialization
            slots: UnsafeCell::new(unsafe { MaybeUninit::uninit().assume_init() }),
            put_index: AtomicUsize::new(0),
            get_index: AtomicUsize::new(0),
            stored: AtomicUsize::new(0),
            occupancy: Semaphore::new(0),
            lost: AtomicU32::new(0),
        }
    }

    /// Empty the queue and clear the lost counter.
    ///
    /// Must not be called while a thread is blocked in `get`.
    pub fn init<A: Arch, const N: usize, const S: usize>(&self, kernel: &Kernel<A, N, S>) {
        kernel.critical(|| {
            self.put_index.store(0, Ordering::Release);
            self.get_index.store(0, Ordering::Release);
            self.stored.store(0, Ordering::Release);
            self.lost.store(0, Ordering::Release);
            kernel.init_semaphore(&self.occupancy, 0);
        });
    }

    /// Append `value` without blocking.
    ///
    /// Returns `FifoFull` and drops the value if `CAP` values are already
    /// stored. Safe to call from interrupt context.
    pub fn put<A: Arch, const N: usize, const S: usize>(
        &self,
        kernel: &Kernel<A, N, S>,
        value: T,
    ) -> KernelResult<()> {
        let _cs = CriticalSection::enter(kernel.arch());

        let stored = self.stored.load(Ordering::Acquire);
        if stored >= CAP {
            let lost = self.lost.load(Ordering::Acquire).saturating_add(1);
            self.lost.store(lost, Ordering::Release);
            warn!("fifo full, {} values lost", lost);
            return Err(KernelError::FifoFull);
        }

        let index = self.put_index.load(Ordering::Acquire);
        // Safety: inside a critical section; the slot is free because fewer
        // than CAP values are stored
        unsafe {
            (*self.slots.get())[index].write(value);
        }
        self.put_index.store((index + 1) % CAP, Ordering::Release);
        self.stored.store(stored + 1, Ordering::Release);
        kernel.signal(&self.occupancy);
        Ok(())
    }

    /// Remove the oldest value, blocking until one is available.
    ///
    /// Must be called from a thread, never from interrupt context.
    pub fn get<A: Arch, const N: usize, const S: usize>(&self, kernel: &Kernel<A, N, S>) -> T {
        kernel.wait(&self.occupancy);
        debug_assert!(
            !kernel.tcb(kernel.current()).is_blocked_on(&self.occupancy),
            "fifo get resumed while still blocked"
        );

        kernel.critical(|| self.take_front())
    }

    /// Remove the oldest value if one is stored, without blocking.
    ///
    /// Safe to call from interrupt context.
    pub fn try_get<A: Arch, const N: usize, const S: usize>(
        &self,
        kernel: &Kernel<A, N, S>,
    ) -> Option<T> {
        let _cs = CriticalSection::enter(kernel.arch());
        if self.occupancy.value() <= 0 {
            return None;
        }
        self.occupancy.take();
        Some(self.take_front())
    }

    /// Caller holds a critical section and has consumed one unit of
    /// occupancy.
    fn take_front(&self) -> T {
        let index = self.get_index.load(Ordering::Acquire);
        // Safety: the slot was written by `put` before its occupancy unit was
        // signalled, and no other reader holds that unit
        let value = unsafe { (*self.slots.get())[index].assume_init() };
        self.get_index.store((index + 1) % CAP, Ordering::Release);
        let stored = self.stored.load(Ordering::Acquire);
        self.stored.store(stored - 1, Ordering::Release);
        value
    }

    /// Values currently stored, including one a woken consumer has not yet
    /// read.
    pub fn len(&self) -> usize {
        self.stored.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values dropped by `put` because the queue was full.
    pub fn lost(&self) -> u32 {
        self.lost.load(Ordering::Acquire)
    }

    pub const fn capacity(&self) -> usize {
        CAP
    }

    #[cfg(test)]
    pub(crate) fn occupancy(&self) -> &Semaphore {
        &self.occupancy
    }
}

impl<T: Copy, const CAP: usize> Default for Fifo<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}
