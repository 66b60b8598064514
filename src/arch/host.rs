//! Simulation port for hosts without the real interrupt hardware.
//!
//! `HostArch` keeps the interrupt mask and pending switch request in plain
//! atomics owned by the instance. Nothing is ever preempted and no stack is
//! ever switched: a test (or a simulator loop) drives the kernel by calling
//! `Kernel::tick` and, whenever [`HostArch::take_pending_switch`] reports a
//! request, `Kernel::switch_context`.

use super::{Arch, IrqState};
use portable_atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Host-side stand-in for the interrupt controller and tick timer.
#[derive(Debug)]
pub struct HostArch {
    /// True while interrupts are masked
    masked: AtomicBool,
    /// A switch has been requested and not yet taken
    pending: AtomicBool,
    /// Total switch requests since creation
    requests: AtomicUsize,
    /// Reload value handed to `start_tick_source`, zero if never started
    tick_reload: AtomicU32,
}

impl HostArch {
    /// Create a port with interrupts enabled and nothing pending.
    pub const fn new() -> Self {
        Self {
            masked: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            tick_reload: AtomicU32::new(0),
        }
    }

    /// Consume a pending switch request.
    ///
    /// Returns `true` if one was pending; the caller is expected to run the
    /// switch handler in response.
    pub fn take_pending_switch(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Whether a switch request is waiting.
    pub fn switch_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of switch requests made so far.
    pub fn switch_requests(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }

    /// Reload value the tick source was started with.
    pub fn tick_reload(&self) -> Option<u32> {
        match self.tick_reload.load(Ordering::Acquire) {
            0 => None,
            reload => Some(reload),
        }
    }
}

impl Default for HostArch {
    fn default() -> Self {
        Self::new()
    }
}

impl Arch for HostArch {
    fn disable_interrupts(&self) -> IrqState {
        let was_masked = self.masked.swap(true, Ordering::AcqRel);
        IrqState::from_enabled(!was_masked)
    }

    fn restore_interrupts(&self, state: IrqState) {
        self.masked.store(!state.was_enabled(), Ordering::Release);
    }

    fn interrupts_enabled(&self) -> bool {
        !self.masked.load(Ordering::Acquire)
    }

    fn request_switch(&self) {
        self.requests.fetch_add(1, Ordering::AcqRel);
        self.pending.store(true, Ordering::Release);
    }

    fn start_tick_source(&self, reload: u32) -> Result<(), &'static str> {
        if reload == 0 {
            return Err("tick reload must be non-zero");
        }
        self.tick_reload.store(reload, Ordering::Release);
        Ok(())
    }

    unsafe fn start_first_thread(&self, _sp: usize) -> ! {
        panic!("host port cannot transfer control to a thread stack");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_save_restore() {
        let arch = HostArch::new();
        assert!(arch.interrupts_enabled());

        let outer = arch.disable_interrupts();
        assert!(outer.was_enabled());
        assert!(!arch.interrupts_enabled());

        let inner = arch.disable_interrupts();
        assert!(!inner.was_enabled());

        arch.restore_interrupts(inner);
        assert!(!arch.interrupts_enabled());

        arch.restore_interrupts(outer);
        assert!(arch.interrupts_enabled());
    }

    #[test]
    fn test_switch_requests_coalesce() {
        let arch = HostArch::new();
        assert!(!arch.take_pending_switch());

        arch.request_switch();
        arch.request_switch();
        assert_eq!(arch.switch_requests(), 2);
        assert!(arch.take_pending_switch());
        assert!(!arch.take_pending_switch());
    }

    #[test]
    fn test_tick_source_rejects_zero_reload() {
        let arch = HostArch::new();
        assert!(arch.start_tick_source(0).is_err());
        assert_eq!(arch.tick_reload(), None);

        arch.start_tick_source(80_000).unwrap();
        assert_eq!(arch.tick_reload(), Some(80_000));
    }
}
