//! Architecture abstraction layer for interrupt masking and context switching.
//!
//! This module provides the narrow interface the kernel needs from the CPU:
//! masking the tick interrupt, pending a context switch, starting the tick
//! source, building a thread's first register image and jumping into the
//! first thread. Nothing outside `arch` touches registers or stack frames.

pub mod frame;
pub mod host;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m;

/// Word type of a thread stack.
pub type StackWord = usize;

/// Interrupt mask state saved by [`Arch::disable_interrupts`].
///
/// Restoring it puts the mask back exactly as it was, so nested critical
/// sections never re-enable interrupts behind the outer one's back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqState {
    was_enabled: bool,
}

impl IrqState {
    /// Create a state from the previous "interrupts enabled" flag.
    pub const fn from_enabled(was_enabled: bool) -> Self {
        Self { was_enabled }
    }

    /// Whether interrupts were enabled before the mask was taken.
    pub const fn was_enabled(self) -> bool {
        self.was_enabled
    }
}

/// Architecture abstraction trait.
///
/// This trait must be implemented for each supported CPU to provide
/// interrupt masking, switch requests and the first-thread launch.
///
/// # Safety
///
/// Implementations involve direct hardware manipulation and inline assembly.
/// Methods marked as unsafe have specific preconditions that must be upheld
/// by the caller.
pub trait Arch: Sync {
    /// Mask interrupts on the current CPU and return the previous state.
    fn disable_interrupts(&self) -> IrqState;

    /// Restore a mask state previously returned by `disable_interrupts`.
    fn restore_interrupts(&self, state: IrqState);

    /// Check if interrupts are currently enabled.
    fn interrupts_enabled(&self) -> bool;

    /// Ask for a context switch.
    ///
    /// The switch happens once no critical section or higher-priority
    /// interrupt is active; on return the request is only pending.
    fn request_switch(&self);

    /// Start the periodic tick interrupt.
    ///
    /// `reload` is the number of core clock cycles per tick.
    fn start_tick_source(&self, reload: u32) -> Result<(), &'static str>;

    /// Build the register image a thread resumes from on its first dispatch.
    ///
    /// Returns the saved stack pointer to store in the thread's TCB.
    fn init_stack(&self, stack: &mut [StackWord], entry: fn() -> !) -> usize {
        frame::build_initial_frame(stack, entry as usize)
    }

    /// Transfer control to the thread whose saved stack pointer is `sp`.
    ///
    /// # Safety
    ///
    /// - `sp` must come from `init_stack` for a thread that never ran
    /// - The stack it points into must live for the rest of the program
    /// - The tick source and switch handler must already be wired to the kernel
    unsafe fn start_first_thread(&self, sp: usize) -> !;
}

// Cortex-M targets run the real port
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use self::cortex_m::CortexM as DefaultArch;

// Everything else gets the simulation port
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub use self::host::HostArch as DefaultArch;
