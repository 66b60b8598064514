//! Test helper utilities and common functionality.

use crate::arch::host::HostArch;
use crate::config::KernelConfig;
use crate::kernel::Kernel;
use crate::thread::ThreadId;
use std::vec::Vec;

/// Four threads with small stacks; thread 3 plays the idle thread.
pub(crate) type TestKernel = Kernel<HostArch, 4, 64>;

pub(crate) const IDLE: ThreadId = ThreadId::new(3);

/// Thread body that never runs on the host.
pub(crate) fn idle() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// Initialize with the default configuration and register four threads.
pub(crate) fn boot(kernel: &TestKernel) {
    kernel.init(KernelConfig::default()).unwrap();
    kernel.add_threads([idle; 4]).unwrap();
}

/// Boot and launch with `time_slice` ticks per slice.
pub(crate) fn launch(kernel: &TestKernel, time_slice: u32) {
    boot(kernel);
    kernel.prepare_launch(time_slice).unwrap();
}

/// Run the switch handler if a switch was requested.
///
/// The outgoing thread's stack pointer is unchanged since nothing really
/// ran. Returns whether a switch happened.
pub(crate) fn dispatch<const N: usize, const S: usize>(kernel: &Kernel<HostArch, N, S>) -> bool {
    if !kernel.arch().take_pending_switch() {
        return false;
    }
    let sp = kernel.tcb(kernel.current()).saved_sp();
    kernel.switch_context(sp);
    true
}

/// Tick `count` times, dispatching after each one, and record which thread
/// held the CPU during each tick.
pub(crate) fn run_ticks(kernel: &TestKernel, count: usize) -> Vec<usize> {
    let mut trace = Vec::with_capacity(count);
    for _ in 0..count {
        trace.push(kernel.current().index());
        kernel.tick();
        dispatch(kernel);
    }
    trace
}

/// Simple linear congruential generator for property testing.
pub(crate) struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub(crate) fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 33
    }

    pub(crate) fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        min + (self.next_u64() % (max - min))
    }
}
