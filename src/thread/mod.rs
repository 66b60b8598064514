//! Thread control blocks.
//!
//! A fixed pool of `Tcb`s linked into a closed ring by their `next` field.
//! The scheduler walks the ring; semaphores and sleep only ever flip the
//! `blocked_on` and `sleep_ticks` fields.

use crate::sync::Semaphore;
use portable_atomic::{AtomicU32, AtomicUsize, Ordering};

/// Index of a thread in the kernel's fixed pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(usize);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ThreadId {
    /// Create a thread ID from a pool slot index.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the pool slot index.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Scheduling state of a thread as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Thread is the one on the CPU
    Running,
    /// Thread may be selected by the scheduler
    Ready,
    /// Thread waits for a semaphore signal
    Blocked,
    /// Thread waits for its sleep countdown to expire
    Sleeping,
}

// `blocked_on` value meaning "not blocked". No semaphore lives at address 0.
const NOT_BLOCKED: usize = 0;

/// Per-thread kernel record.
///
/// Fields are atomics so the record can be shared between thread and
/// interrupt context, but every write happens under a critical section.
#[derive(Debug)]
pub struct Tcb {
    /// Saved stack pointer, stale while the thread is running
    sp: AtomicUsize,
    /// Index of the next TCB in ring order
    next: AtomicUsize,
    /// Address of the semaphore this thread is blocked on
    blocked_on: AtomicUsize,
    /// Remaining ticks of sleep
    sleep_ticks: AtomicU32,
}

impl Tcb {
    pub const fn new() -> Self {
        Self {
            sp: AtomicUsize::new(0),
            next: AtomicUsize::new(0),
            blocked_on: AtomicUsize::new(NOT_BLOCKED),
            sleep_ticks: AtomicU32::new(0),
        }
    }

    /// Saved stack pointer of the thread.
    pub fn saved_sp(&self) -> usize {
        self.sp.load(Ordering::Acquire)
    }

    /// Next TCB in ring order.
    pub fn next(&self) -> ThreadId {
        ThreadId(self.next.load(Ordering::Acquire))
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_on.load(Ordering::Acquire) != NOT_BLOCKED
    }

    /// Whether the thread is blocked on this particular semaphore.
    pub fn is_blocked_on(&self, sem: &Semaphore) -> bool {
        self.blocked_on.load(Ordering::Acquire) == sem.id()
    }

    pub fn sleep_ticks(&self) -> u32 {
        self.sleep_ticks.load(Ordering::Acquire)
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleep_ticks() != 0
    }

    /// A thread is eligible iff it is neither blocked nor sleeping.
    pub fn is_eligible(&self) -> bool {
        !self.is_blocked() && !self.is_sleeping()
    }

    /// State of the thread, ignoring whether it is the current one.
    pub fn state(&self) -> ThreadState {
        if self.is_blocked() {
            ThreadState::Blocked
        } else if self.is_sleeping() {
            ThreadState::Sleeping
        } else {
            ThreadState::Ready
        }
    }

    /// Link into the ring with a fresh context, eligible to run.
    pub(crate) fn reset(&self, next: ThreadId, sp: usize) {
        self.next.store(next.0, Ordering::Release);
        self.sp.store(sp, Ordering::Release);
        self.blocked_on.store(NOT_BLOCKED, Ordering::Release);
        self.sleep_ticks.store(0, Ordering::Release);
    }

    pub(crate) fn save_sp(&self, sp: usize) {
        self.sp.store(sp, Ordering::Release);
    }

    pub(crate) fn block_on(&self, sem: &Semaphore) {
        self.blocked_on.store(sem.id(), Ordering::Release);
    }

    pub(crate) fn unblock(&self) {
        self.blocked_on.store(NOT_BLOCKED, Ordering::Release);
    }

    pub(crate) fn set_sleep(&self, ticks: u32) {
        self.sleep_ticks.store(ticks, Ordering::Release);
    }

    /// Advance the sleep countdown by one tick.
    ///
    /// Returns `true` on the tick the countdown reaches zero. Never goes
    /// below zero.
    pub(crate) fn count_down(&self) -> bool {
        match self.sleep_ticks.load(Ordering::Acquire) {
            0 => false,
            ticks => {
                self.sleep_ticks.store(ticks - 1, Ordering::Release);
                ticks == 1
            }
        }
    }
}

impl Default for Tcb {
    fn default() -> Self {
        Self::new()
    }
}
