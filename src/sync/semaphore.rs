//! Counting semaphore.
//!
//! Only the counter lives here. A negative value's magnitude is the number
//! of threads blocked on the semaphore; those threads are found by scanning
//! the TCB ring for ones whose `blocked_on` names this semaphore's address.
//! Blocking and waking go through `Kernel::wait` and `Kernel::signal`.

use portable_atomic::{AtomicI32, Ordering};

/// Signed counting semaphore, identified by its address.
///
/// A semaphore must not move while any thread is blocked on it; in practice
/// it lives in a `static`.
#[derive(Debug)]
pub struct Semaphore {
    count: AtomicI32,
}

impl Semaphore {
    pub const fn new(value: i32) -> Self {
        Self {
            count: AtomicI32::new(value),
        }
    }

    /// Current counter value.
    pub fn value(&self) -> i32 {
        self.count.load(Ordering::Acquire)
    }

    /// Identity used in `Tcb::blocked_on`.
    pub(crate) fn id(&self) -> usize {
        self as *const Self as usize
    }

    pub(crate) fn set(&self, value: i32) {
        self.count.store(value, Ordering::Release);
    }

    /// Decrement and return the new value. Caller holds a critical section.
    pub(crate) fn take(&self) -> i32 {
        let value = self.count.load(Ordering::Acquire) - 1;
        self.count.store(value, Ordering::Release);
        value
    }

    /// Increment and return the new value. Caller holds a critical section.
    pub(crate) fn give(&self) -> i32 {
        let value = self.count.load(Ordering::Acquire) + 1;
        self.count.store(value, Ordering::Release);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_moves_by_one() {
        let sem = Semaphore::new(1);
        assert_eq!(sem.take(), 0);
        assert_eq!(sem.take(), -1);
        assert_eq!(sem.give(), 0);
        assert_eq!(sem.give(), 1);
        assert_eq!(sem.value(), 1);
    }

    #[test]
    fn test_distinct_semaphores_have_distinct_ids() {
        let a = Semaphore::new(0);
        let b = Semaphore::new(0);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), 0);
    }
}
