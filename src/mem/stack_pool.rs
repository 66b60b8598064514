//! Static stack storage for the fixed thread pool.
//!
//! All `N` stacks live in one statically sized array inside the kernel; there
//! is no allocation and no reuse. Every word starts out painted with
//! [`STACK_PAINT`] so the untouched depth can be measured later and an
//! overflow into the lowest word can be spotted.

use crate::arch::StackWord;
use core::cell::UnsafeCell;

/// Fill pattern of a never-used stack word.
pub const STACK_PAINT: StackWord = 0xDEAD_BEEF;

/// Fixed array of `N` thread stacks of `S` words each.
///
/// The array is 8-byte aligned and `S` is even, so every stack top meets the
/// AAPCS alignment the exception frame expects.
#[repr(C, align(8))]
pub struct StackPool<const N: usize, const S: usize> {
    stacks: UnsafeCell<[[StackWord; S]; N]>,
}

impl<const N: usize, const S: usize> StackPool<N, S> {
    pub const fn new() -> Self {
        Self {
            stacks: UnsafeCell::new([[STACK_PAINT; S]; N]),
        }
    }

    /// Mutable access to one stack.
    ///
    /// # Safety
    ///
    /// - `index` must be in `0..N`
    /// - The caller must hold a critical section and the thread owning the
    ///   stack must not have started running yet
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn stack_mut(&self, index: usize) -> &mut [StackWord; S] {
        debug_assert!(index < N);
        unsafe { &mut (*self.stacks.get())[index] }
    }

    /// Address of the lowest word of a stack.
    pub fn base_address(&self, index: usize) -> usize {
        assert!(index < N, "stack index out of range");
        let stacks = self.stacks.get() as *const [StackWord; S];
        unsafe { stacks.add(index) as usize }
    }

    /// Number of words at the bottom of a stack that were never written.
    ///
    /// The thread may be running; words are read one at a time with
    /// volatile loads and the result is only a lower bound on free space.
    pub fn unused_words(&self, index: usize) -> usize {
        let base = self.base_address(index) as *const StackWord;
        let mut unused = 0;
        while unused < S {
            let word = unsafe { base.add(unused).read_volatile() };
            if word != STACK_PAINT {
                break;
            }
            unused += 1;
        }
        unused
    }

    /// Whether the lowest word of a stack has been overwritten.
    pub fn overflowed(&self, index: usize) -> bool {
        self.unused_words(index) == 0
    }
}

impl<const N: usize, const S: usize> Default for StackPool<N, S> {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: stacks are only written under a critical section before their
// thread starts; afterwards only the owning thread and volatile readers touch them.
unsafe impl<const N: usize, const S: usize> Sync for StackPool<N, S> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stacks_are_contiguous_and_aligned() {
        let pool = StackPool::<3, 32>::new();
        let word = core::mem::size_of::<StackWord>();

        assert_eq!(pool.base_address(0) % 8, 0);
        assert_eq!(pool.base_address(1) - pool.base_address(0), 32 * word);
        assert_eq!(pool.base_address(2) - pool.base_address(1), 32 * word);
    }

    #[test]
    fn test_fresh_stack_is_fully_unused() {
        let pool = StackPool::<2, 32>::new();
        assert_eq!(pool.unused_words(0), 32);
        assert!(!pool.overflowed(1));
    }

    #[test]
    fn test_high_water_mark() {
        let pool = StackPool::<2, 32>::new();
        let stack = unsafe { pool.stack_mut(1) };
        for word in &mut stack[20..] {
            *word = 0;
        }

        assert_eq!(pool.unused_words(1), 20);
        assert_eq!(pool.unused_words(0), 32);
    }

    #[test]
    fn test_overflow_detected_at_lowest_word() {
        let pool = StackPool::<1, 32>::new();
        unsafe { pool.stack_mut(0)[0] = 1 };
        assert!(pool.overflowed(0));
    }
}
