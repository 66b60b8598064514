//! Interrupt-masked critical sections.
//!
//! Every mutation of TCB fields, semaphore counters and queue indices
//! happens inside one of these. Keep them short: while one is held the tick
//! interrupt cannot run.

use crate::arch::{Arch, IrqState};

/// RAII guard for an interrupt-masked region.
///
/// Entering saves the previous mask state and masks interrupts; dropping the
/// guard restores the saved state. An inner section therefore leaves
/// interrupts masked when the outer one is still active.
#[must_use = "interrupts are unmasked again as soon as the guard is dropped"]
pub struct CriticalSection<'a, A: Arch> {
    arch: &'a A,
    saved: IrqState,
}

impl<'a, A: Arch> CriticalSection<'a, A> {
    /// Mask interrupts until the returned guard is dropped.
    pub fn enter(arch: &'a A) -> Self {
        let saved = arch.disable_interrupts();
        Self { arch, saved }
    }

    /// Mask state that will be restored on drop.
    pub fn saved_state(&self) -> IrqState {
        self.saved
    }
}

impl<A: Arch> Drop for CriticalSection<'_, A> {
    fn drop(&mut self) {
        self.arch.restore_interrupts(self.saved);
    }
}

/// Run `f` with interrupts masked.
#[inline]
pub fn with<A: Arch, R>(arch: &A, f: impl FnOnce() -> R) -> R {
    let _cs = CriticalSection::enter(arch);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::host::HostArch;

    #[test]
    fn test_guard_masks_and_restores() {
        let arch = HostArch::new();
        {
            let cs = CriticalSection::enter(&arch);
            assert!(cs.saved_state().was_enabled());
            assert!(!arch.interrupts_enabled());
        }
        assert!(arch.interrupts_enabled());
    }

    #[test]
    fn test_nested_sections_restore_outer_state() {
        let arch = HostArch::new();
        let outer = CriticalSection::enter(&arch);
        {
            let _inner = CriticalSection::enter(&arch);
            assert!(!arch.interrupts_enabled());
        }
        // Inner drop must not unmask while the outer section is held
        assert!(!arch.interrupts_enabled());
        drop(outer);
        assert!(arch.interrupts_enabled());
    }

    #[test]
    fn test_section_entered_while_masked_stays_masked() {
        let arch = HostArch::new();
        let _ = arch.disable_interrupts();
        with(&arch, || assert!(!arch.interrupts_enabled()));
        assert!(!arch.interrupts_enabled());
    }

    #[test]
    fn test_with_returns_closure_value() {
        let arch = HostArch::new();
        let value = with(&arch, || 7 * 6);
        assert_eq!(value, 42);
        assert!(arch.interrupts_enabled());
    }
}
