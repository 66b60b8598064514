#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Round-robin preemptive kernel for ARM Cortex-M microcontrollers.
//!
//! A small fixed set of threads, chosen at compile time, share one core in
//! equal time slices driven by a periodic tick interrupt. Threads can sleep
//! for a number of ticks, synchronize through counting semaphores and
//! receive data from interrupt context through a bounded FIFO.
//!
//! # Target Platform
//!
//! - **Architecture**: ARMv7-M (Cortex-M3/M4) without FPU context
//! - **Environment**: Bare-metal, single core, no heap
//! - **Host builds**: a simulation port driven explicitly by tests
//!
//! # Features
//!
//! - `halt-on-panic`: Provide a panic handler that masks interrupts and
//!   halts (default)
//!
//! # Quick Start
//!
//! ```ignore
//! use rr_kernel::{DefaultArch, Fifo, Kernel, KernelConfig, Semaphore};
//!
//! static KERNEL: Kernel<DefaultArch, 3> = Kernel::new(DefaultArch::new());
//! static DATA_READY: Semaphore = Semaphore::new(0);
//! static SAMPLES: Fifo<u16, 8> = Fifo::new();
//!
//! fn producer() -> ! {
//!     loop {
//!         KERNEL.sleep(10);
//!         KERNEL.signal(&DATA_READY);
//!     }
//! }
//!
//! fn consumer() -> ! {
//!     loop {
//!         KERNEL.wait(&DATA_READY);
//!         let sample = SAMPLES.get(&KERNEL);
//!         // ...
//!     }
//! }
//!
//! fn idle() -> ! {
//!     loop {}
//! }
//!
//! fn sample_adc() {
//!     let _ = SAMPLES.put(&KERNEL, read_adc());
//! }
//!
//! fn main() -> ! {
//!     KERNEL.init(KernelConfig::new().core_clock_hz(80_000_000)).unwrap();
//!     KERNEL.add_threads([producer, consumer, idle]).unwrap();
//!     KERNEL.add_periodic_event(sample_adc, 1).unwrap();
//!     SAMPLES.init(&KERNEL);
//!     match KERNEL.launch(2) {
//!         Ok(never) => match never {},
//!         Err(_) => loop {},
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - Threads form a ring of control blocks; the scheduler walks it from the
//!   current thread and picks the first one that is neither blocked nor
//!   sleeping
//! - Preemption and voluntary suspension share a single switch path
//! - All shared state changes happen inside interrupt-masked critical
//!   sections

// Core modules
pub mod arch;
pub mod config;
pub mod critical;
pub mod errors;
pub mod kernel;
pub mod mem;
pub mod sched;
pub mod sync;
pub mod thread;
pub mod time;

#[cfg(test)]
extern crate std;

#[cfg(test)]
mod tests;

// Panic handler for bare-metal
#[cfg(all(not(test), target_os = "none", feature = "halt-on-panic"))]
use core::panic::PanicInfo;

#[cfg(all(not(test), target_os = "none", feature = "halt-on-panic"))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    // On panic, mask interrupts and halt
    #[cfg(target_arch = "arm")]
    unsafe {
        core::arch::asm!("cpsid i", options(nomem, nostack));
    }
    loop {
        #[cfg(target_arch = "arm")]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack));
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::host::HostArch;
pub use arch::{Arch, DefaultArch};

// Kernel
pub use config::KernelConfig;
pub use critical::CriticalSection;
pub use kernel::{Dispatch, Kernel, KernelStats};

// Synchronization
pub use sync::{Fifo, Semaphore};

// Threads
pub use thread::{Tcb, ThreadId, ThreadState};

// Errors
pub use errors::{KernelError, KernelResult};

// ============================================================================
// Convenience Functions
// ============================================================================

/// Give up the rest of the current thread's time slice.
///
/// The thread stays eligible and runs again when the scheduler comes back
/// around the ring. Does nothing until a kernel has been launched.
#[inline]
pub fn yield_now() {
    kernel::yield_current();
}
