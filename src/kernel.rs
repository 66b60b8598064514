//! Kernel abstraction tying the thread pool, scheduler and timer together.
//!
//! This module provides the main `Kernel` struct. One instance lives in a
//! `static` for the life of the program; there is no teardown. Interrupt
//! handlers reach it through the [`Dispatch`] trait object registered with
//! [`Kernel::register_global`].

use crate::arch::frame::FRAME_WORDS;
use crate::arch::Arch;
use crate::config::{KernelConfig, DEFAULT_CORE_CLOCK_HZ, DEFAULT_STACK_WORDS, DEFAULT_TICK_HZ};
use crate::critical::CriticalSection;
use crate::errors::{KernelError, KernelResult};
use crate::mem::StackPool;
use crate::sched::RoundRobin;
use crate::sync::Semaphore;
use crate::thread::{Tcb, ThreadId, ThreadState};
use crate::time::{EventTable, TickCounter};
use core::convert::Infallible;
use log::{debug, info, trace};
use portable_atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Global kernel reference for interrupt handlers.
static GLOBAL_DISPATCH: spin::Once<&'static dyn Dispatch> = spin::Once::new();

/// Entry points interrupt handlers call into.
///
/// Object safe so a handler can reach the kernel without knowing its pool
/// size or architecture type.
pub trait Dispatch: Sync {
    /// Body of the periodic tick interrupt.
    fn tick(&self);

    /// Body of the context switch handler: store `sp` for the outgoing
    /// thread, pick the next one, return its saved stack pointer.
    fn switch_context(&self, sp: usize) -> usize;

    /// Give up the rest of the current time slice.
    fn suspend(&self);
}

/// Snapshot of kernel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelStats {
    /// Ticks since `init`
    pub ticks: u32,
    /// Switches that changed the running thread
    pub context_switches: u32,
    /// Threads the scheduler may select
    pub eligible: usize,
    /// Threads waiting on a semaphore
    pub blocked: usize,
    /// Threads with a sleep countdown running
    pub sleeping: usize,
}

const TCB_INIT: Tcb = Tcb::new();

/// Main kernel handle for a fixed pool of `N` threads.
///
/// # Type Parameters
///
/// * `A` - Architecture implementation
/// * `N` - Number of threads, fixed at compile time
/// * `STACK` - Stack size of every thread, in words
pub struct Kernel<A: Arch, const N: usize, const STACK: usize = DEFAULT_STACK_WORDS> {
    arch: A,
    /// Thread control blocks, linked into a ring by `add_threads`
    tcbs: [Tcb; N],
    stacks: StackPool<N, STACK>,
    /// Index of the running thread
    current: AtomicUsize,
    core_clock_hz: AtomicU32,
    tick_hz: AtomicU32,
    initialized: AtomicBool,
    threads_added: AtomicBool,
    launched: AtomicBool,
    /// Ticks per time slice
    time_slice: AtomicU32,
    /// Ticks used of the current slice
    slice_elapsed: AtomicU32,
    ticks: TickCounter,
    context_switches: AtomicU32,
    events: spin::Mutex<EventTable>,
    /// Set while periodic callbacks run, to catch ones that block
    in_event: AtomicBool,
}

impl<A: Arch, const N: usize, const STACK: usize> Kernel<A, N, STACK> {
    /// Create a kernel instance.
    ///
    /// Usable in a `static` initializer. Fails to compile (in const context)
    /// if `N` is zero or `STACK` cannot hold two frames or is odd.
    pub const fn new(arch: A) -> Self {
        assert!(N > 0, "kernel needs at least one thread");
        assert!(STACK >= 2 * FRAME_WORDS, "stack too small");
        assert!(STACK % 2 == 0, "stack size must keep 8-byte alignment");

        Self {
            arch,
            tcbs: [TCB_INIT; N],
            stacks: StackPool::new(),
            current: AtomicUsize::new(0),
            core_clock_hz: AtomicU32::new(DEFAULT_CORE_CLOCK_HZ),
            tick_hz: AtomicU32::new(DEFAULT_TICK_HZ),
            initialized: AtomicBool::new(false),
            threads_added: AtomicBool::new(false),
            launched: AtomicBool::new(false),
            time_slice: AtomicU32::new(0),
            slice_elapsed: AtomicU32::new(0),
            ticks: TickCounter::new(),
            context_switches: AtomicU32::new(0),
            events: spin::Mutex::new(EventTable::new()),
            in_event: AtomicBool::new(false),
        }
    }

    /// Initialize the kernel.
    ///
    /// Must be called before any other operation. Masks interrupts; they stay
    /// masked until `launch` enters the first thread.
    pub fn init(&self, config: KernelConfig) -> KernelResult<()> {
        config.validate()?;

        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(KernelError::AlreadyInitialized);
        }

        let _ = self.arch.disable_interrupts();
        self.core_clock_hz.store(config.core_clock_hz, Ordering::Release);
        self.tick_hz.store(config.tick_hz, Ordering::Release);
        self.events.lock().clear();

        info!(
            "kernel init: {} threads, {} words/stack, {} Hz tick",
            N, STACK, config.tick_hz
        );
        Ok(())
    }

    /// Register the `N` threads.
    ///
    /// Links the ring 0 → 1 → … → N-1 → 0, builds every initial stack frame,
    /// clears all wait state and makes thread 0 current, all inside one
    /// critical section.
    pub fn add_threads(&self, entries: [fn() -> !; N]) -> KernelResult<()> {
        if !self.is_initialized() {
            return Err(KernelError::NotInitialized);
        }
        if self.is_launched() {
            return Err(KernelError::AlreadyLaunched);
        }

        let _cs = CriticalSection::enter(&self.arch);
        if self.threads_added.load(Ordering::Acquire) {
            return Err(KernelError::ThreadsAlreadyAdded);
        }

        for (index, entry) in entries.iter().enumerate() {
            // Safety: inside a critical section, before any thread runs
            let stack = unsafe { self.stacks.stack_mut(index) };
            let sp = self.arch.init_stack(stack, *entry);
            self.tcbs[index].reset(ThreadId::new((index + 1) % N), sp);
        }
        self.current.store(0, Ordering::Release);
        self.threads_added.store(true, Ordering::Release);

        debug!("registered {} threads", N);
        Ok(())
    }

    /// Register a short callback to run every `period_ms` milliseconds from
    /// the tick interrupt.
    ///
    /// At most two callbacks can be registered. They must run to completion
    /// without blocking, sleeping or suspending.
    pub fn add_periodic_event(&self, callback: fn(), period_ms: u32) -> KernelResult<()> {
        if !self.is_initialized() {
            return Err(KernelError::NotInitialized);
        }

        let period = self.config().ms_to_ticks(period_ms);
        if period == 0 {
            return Err(KernelError::InvalidPeriod(period_ms));
        }

        let _cs = CriticalSection::enter(&self.arch);
        let slot = self.events.lock().register(callback, period)?;
        debug!("periodic event {} every {} ticks", slot, period);
        Ok(())
    }

    /// Validate launch preconditions, start the tick source and mark the
    /// kernel running.
    ///
    /// Returns the saved stack pointer of the first thread. `launch` is this
    /// plus the jump; simulations call it directly.
    pub fn prepare_launch(&self, time_slice: u32) -> KernelResult<usize> {
        if !self.is_initialized() {
            return Err(KernelError::NotInitialized);
        }
        if !self.threads_added.load(Ordering::Acquire) {
            return Err(KernelError::ThreadsNotAdded);
        }
        if time_slice == 0 {
            return Err(KernelError::InvalidTimeSlice);
        }
        if self.is_launched() {
            return Err(KernelError::AlreadyLaunched);
        }

        self.arch
            .start_tick_source(self.config().tick_reload())
            .map_err(KernelError::TickSource)?;

        self.time_slice.store(time_slice, Ordering::Release);
        self.slice_elapsed.store(0, Ordering::Release);
        self.launched.store(true, Ordering::Release);

        info!("launching thread {} with {}-tick slices", self.current(), time_slice);
        Ok(self.current_tcb().saved_sp())
    }

    /// Register this kernel with the interrupt handlers.
    ///
    /// Only the first registration takes effect.
    pub fn register_global(&'static self)
    where
        A: 'static,
    {
        GLOBAL_DISPATCH.call_once(|| self as &'static dyn Dispatch);
    }

    /// Start preemption and run the first thread. Only returns on error.
    pub fn launch(&'static self, time_slice: u32) -> Result<Infallible, KernelError>
    where
        A: 'static,
    {
        self.register_global();
        let sp = self.prepare_launch(time_slice)?;
        // Safety: `sp` was built by `init_stack` for a thread that never ran,
        // the stacks are 'static and the handlers now reach this kernel.
        unsafe { self.arch.start_first_thread(sp) }
    }

    /// Periodic tick: run due event callbacks, count down sleeping threads,
    /// and request a switch when the time slice runs out.
    pub fn tick(&self) {
        if !self.is_initialized() {
            return;
        }

        self.run_periodic_events();

        let _cs = CriticalSection::enter(&self.arch);
        for tcb in &self.tcbs {
            tcb.count_down();
        }
        self.ticks.increment();

        if self.is_launched() {
            let elapsed = self.slice_elapsed.load(Ordering::Acquire) + 1;
            if elapsed >= self.time_slice.load(Ordering::Acquire) {
                self.slice_elapsed.store(0, Ordering::Release);
                self.arch.request_switch();
            } else {
                self.slice_elapsed.store(elapsed, Ordering::Release);
            }
        }
    }

    fn run_periodic_events(&self) {
        // Registration holds the lock only under a critical section, so
        // contention means something is badly wrong; skip the tick's events.
        let due = match self.events.try_lock() {
            Some(mut table) => table.advance(),
            None => return,
        };

        self.in_event.store(true, Ordering::Release);
        for callback in due.iter().flatten() {
            callback();
        }
        self.in_event.store(false, Ordering::Release);
    }

    /// The single switch path shared by preemption and voluntary suspend.
    ///
    /// Saves `sp` as the outgoing thread's context, selects the next
    /// eligible thread in ring order and returns its saved context.
    pub fn switch_context(&self, sp: usize) -> usize {
        if !self.threads_added.load(Ordering::Acquire) {
            return sp;
        }

        let _cs = CriticalSection::enter(&self.arch);
        let prev = self.current();
        self.tcbs[prev.index()].save_sp(sp);

        let next = self.schedule();
        // The incoming thread always gets a full slice
        self.slice_elapsed.store(0, Ordering::Release);

        if next != prev {
            let switches = self.context_switches.load(Ordering::Acquire);
            self.context_switches
                .store(switches.wrapping_add(1), Ordering::Release);
            trace!("switch {} -> {}", prev, next);
        }

        self.tcbs[next.index()].saved_sp()
    }

    /// Advance `current` to the next eligible thread.
    ///
    /// Spins until one is found. At least one thread must always be
    /// eligible (an idle thread that never blocks or sleeps); with none, this
    /// never returns.
    fn schedule(&self) -> ThreadId {
        let from = self.current();
        let ring = self.ring();
        let next = loop {
            if let Some(id) = ring.next_eligible(from) {
                break id;
            }
            core::hint::spin_loop();
        };
        self.current.store(next.index(), Ordering::Release);
        next
    }

    /// Give up the rest of the current time slice.
    ///
    /// The thread stays eligible unless it marked itself blocked or sleeping
    /// first. Does nothing before launch.
    pub fn suspend(&self) {
        debug_assert!(
            !self.in_event.load(Ordering::Acquire),
            "periodic event callbacks must not suspend"
        );
        if !self.is_launched() {
            return;
        }

        crate::critical::with(&self.arch, || {
            self.slice_elapsed.store(0, Ordering::Release);
        });
        self.arch.request_switch();
    }

    /// Sleep for `ticks` ticks.
    ///
    /// The thread becomes eligible again on the tick its countdown reaches
    /// zero. `sleep(0)` just gives up the rest of the slice.
    pub fn sleep(&self, ticks: u32) {
        debug_assert!(
            !self.in_event.load(Ordering::Acquire),
            "periodic event callbacks must not sleep"
        );
        crate::critical::with(&self.arch, || self.current_tcb().set_sleep(ticks));
        self.suspend();
    }

    /// Set a semaphore's counter.
    ///
    /// `value` must not be negative: a negative count stands for blocked
    /// threads, and none are blocked on a freshly initialized semaphore.
    pub fn init_semaphore(&self, sem: &Semaphore, value: i32) {
        debug_assert!(value >= 0, "semaphore initialized below zero");
        self.critical(|| sem.set(value));
    }

    /// Decrement `sem`, blocking the calling thread if the result is
    /// negative.
    ///
    /// Returns once a `signal` has released this thread. The critical section
    /// is dropped before suspending, so interrupts are never held masked
    /// across the block.
    pub fn wait(&self, sem: &Semaphore) {
        debug_assert!(
            !self.in_event.load(Ordering::Acquire),
            "periodic event callbacks must not block"
        );

        let blocked = crate::critical::with(&self.arch, || {
            if sem.take() < 0 {
                self.current_tcb().block_on(sem);
                true
            } else {
                false
            }
        });

        if blocked {
            self.suspend();
        }
    }

    /// Increment `sem` and, if a thread was waiting, release exactly one.
    ///
    /// The released thread is the first one blocked on `sem` found when
    /// walking the ring from just after the current thread. This is scan
    /// order, not arrival order. Safe to call from event callbacks.
    pub fn signal(&self, sem: &Semaphore) {
        crate::critical::with(&self.arch, || {
            if sem.give() <= 0 {
                match self.ring().first_blocked_on(self.current(), sem) {
                    Some(id) => self.tcbs[id.index()].unblock(),
                    None => debug_assert!(false, "semaphore below zero with no blocked thread"),
                }
            }
        });
    }

    /// Run `f` with interrupts masked.
    pub fn critical<R>(&self, f: impl FnOnce() -> R) -> R {
        crate::critical::with(&self.arch, f)
    }

    /// The architecture port.
    pub fn arch(&self) -> &A {
        &self.arch
    }

    /// Check if the kernel has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Check if threads are being scheduled.
    pub fn is_launched(&self) -> bool {
        self.launched.load(Ordering::Acquire)
    }

    /// Configuration passed to `init`, or the defaults before it.
    pub fn config(&self) -> KernelConfig {
        KernelConfig::new()
            .core_clock_hz(self.core_clock_hz.load(Ordering::Acquire))
            .tick_hz(self.tick_hz.load(Ordering::Acquire))
    }

    /// The running thread (thread 0 before launch).
    pub fn current(&self) -> ThreadId {
        ThreadId::new(self.current.load(Ordering::Acquire))
    }

    fn current_tcb(&self) -> &Tcb {
        &self.tcbs[self.current.load(Ordering::Acquire)]
    }

    /// Control block of a thread.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not below `N`.
    pub fn tcb(&self, id: ThreadId) -> &Tcb {
        &self.tcbs[id.index()]
    }

    pub fn thread_state(&self, id: ThreadId) -> ThreadState {
        if self.is_launched() && id == self.current() {
            ThreadState::Running
        } else {
            self.tcb(id).state()
        }
    }

    /// Round-robin view of the TCB ring.
    pub fn ring(&self) -> RoundRobin<'_> {
        RoundRobin::new(&self.tcbs)
    }

    /// Ticks since `init`.
    pub fn ticks(&self) -> u32 {
        self.ticks.ticks()
    }

    /// Words at the bottom of a thread's stack that were never written.
    pub fn stack_unused(&self, id: ThreadId) -> usize {
        self.stacks.unused_words(id.index())
    }

    /// Lowest address of a thread's stack.
    pub fn stack_base(&self, id: ThreadId) -> usize {
        self.stacks.base_address(id.index())
    }

    /// Get kernel statistics.
    pub fn stats(&self) -> KernelStats {
        let mut stats = KernelStats {
            ticks: self.ticks(),
            context_switches: self.context_switches.load(Ordering::Acquire),
            ..KernelStats::default()
        };
        for tcb in &self.tcbs {
            if tcb.is_eligible() {
                stats.eligible += 1;
            }
            if tcb.is_blocked() {
                stats.blocked += 1;
            }
            if tcb.is_sleeping() {
                stats.sleeping += 1;
            }
        }
        stats
    }
}

impl<A: Arch, const N: usize, const STACK: usize> Dispatch for Kernel<A, N, STACK> {
    fn tick(&self) {
        Kernel::tick(self);
    }

    fn switch_context(&self, sp: usize) -> usize {
        Kernel::switch_context(self, sp)
    }

    fn suspend(&self) {
        Kernel::suspend(self);
    }
}

/// Get the registered kernel, if any (for interrupt handlers).
pub fn global_dispatch() -> Option<&'static dyn Dispatch> {
    GLOBAL_DISPATCH.get().copied()
}

/// Suspend the current thread through the registered kernel.
///
/// Does nothing if no kernel has been registered.
pub fn yield_current() {
    if let Some(kernel) = global_dispatch() {
        kernel.suspend();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::frame::{slot, XPSR_THUMB};
    use crate::arch::host::HostArch;
    use crate::arch::StackWord;

    type SmallKernel = Kernel<HostArch, 3, 32>;

    fn spin() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn noop() {}

    #[test]
    fn test_init_only_once() {
        let kernel = SmallKernel::new(HostArch::new());
        assert!(kernel.init(KernelConfig::default()).is_ok());
        assert_eq!(
            kernel.init(KernelConfig::default()),
            Err(KernelError::AlreadyInitialized)
        );
        // Interrupts stay masked until launch
        assert!(!kernel.arch().interrupts_enabled());
    }

    #[test]
    fn test_init_rejects_bad_config() {
        let kernel = SmallKernel::new(HostArch::new());
        assert_eq!(
            kernel.init(KernelConfig::new().tick_hz(0)),
            Err(KernelError::InvalidConfig)
        );
        assert!(!kernel.is_initialized());
    }

    #[test]
    fn test_add_threads_requires_init() {
        let kernel = SmallKernel::new(HostArch::new());
        assert_eq!(kernel.add_threads([spin; 3]), Err(KernelError::NotInitialized));
    }

    #[test]
    fn test_add_threads_only_once() {
        let kernel = SmallKernel::new(HostArch::new());
        kernel.init(KernelConfig::default()).unwrap();
        kernel.add_threads([spin; 3]).unwrap();
        assert_eq!(
            kernel.add_threads([spin; 3]),
            Err(KernelError::ThreadsAlreadyAdded)
        );
    }

    #[test]
    fn test_add_threads_builds_ring_and_frames() {
        let kernel = SmallKernel::new(HostArch::new());
        kernel.init(KernelConfig::default()).unwrap();
        kernel.add_threads([spin; 3]).unwrap();

        assert_eq!(kernel.current(), ThreadId::new(0));
        let word = core::mem::size_of::<StackWord>();
        let entry: fn() -> ! = spin;
        for i in 0..3 {
            let id = ThreadId::new(i);
            let tcb = kernel.tcb(id);
            assert_eq!(tcb.next(), ThreadId::new((i + 1) % 3));
            assert!(tcb.is_eligible());

            let expected_sp = kernel.stack_base(id) + (32 - FRAME_WORDS) * word;
            assert_eq!(tcb.saved_sp(), expected_sp);

            let frame = unsafe {
                core::slice::from_raw_parts(tcb.saved_sp() as *const StackWord, FRAME_WORDS)
            };
            assert_eq!(frame[slot::PC], (entry as usize) & !1);
            assert_eq!(frame[slot::XPSR], XPSR_THUMB);
            // Only the frame is written
            assert_eq!(kernel.stack_unused(id), 32 - FRAME_WORDS);
        }
    }

    #[test]
    fn test_launch_preconditions() {
        let kernel = SmallKernel::new(HostArch::new());
        assert_eq!(kernel.prepare_launch(1), Err(KernelError::NotInitialized));

        kernel.init(KernelConfig::default()).unwrap();
        assert_eq!(kernel.prepare_launch(1), Err(KernelError::ThreadsNotAdded));

        kernel.add_threads([spin; 3]).unwrap();
        assert_eq!(kernel.prepare_launch(0), Err(KernelError::InvalidTimeSlice));

        let sp = kernel.prepare_launch(2).unwrap();
        assert_eq!(sp, kernel.tcb(ThreadId::new(0)).saved_sp());
        assert_eq!(kernel.arch().tick_reload(), Some(80_000));
        assert_eq!(kernel.thread_state(ThreadId::new(0)), ThreadState::Running);

        assert_eq!(kernel.prepare_launch(2), Err(KernelError::AlreadyLaunched));
        assert_eq!(kernel.add_threads([spin; 3]), Err(KernelError::AlreadyLaunched));
    }

    #[test]
    fn test_periodic_event_registration() {
        let kernel = SmallKernel::new(HostArch::new());
        assert_eq!(
            kernel.add_periodic_event(noop, 1),
            Err(KernelError::NotInitialized)
        );

        kernel
            .init(KernelConfig::new().tick_hz(100))
            .unwrap();
        // 5 ms is less than one 10 ms tick
        assert_eq!(
            kernel.add_periodic_event(noop, 5),
            Err(KernelError::InvalidPeriod(5))
        );
        assert!(kernel.add_periodic_event(noop, 10).is_ok());
        assert!(kernel.add_periodic_event(noop, 20).is_ok());
        assert_eq!(
            kernel.add_periodic_event(noop, 10),
            Err(KernelError::EventSlotsExhausted)
        );
    }

    #[test]
    fn test_suspend_before_launch_is_ignored() {
        let kernel = SmallKernel::new(HostArch::new());
        kernel.init(KernelConfig::default()).unwrap();
        kernel.add_threads([spin; 3]).unwrap();

        kernel.suspend();
        assert_eq!(kernel.arch().switch_requests(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "semaphore initialized below zero")]
    fn test_negative_semaphore_init_rejected() {
        let kernel = SmallKernel::new(HostArch::new());
        kernel.init(KernelConfig::default()).unwrap();
        let sem = Semaphore::new(0);
        kernel.init_semaphore(&sem, -1);
    }

    #[test]
    fn test_critical_masks_and_restores() {
        let kernel = SmallKernel::new(HostArch::new());
        assert!(kernel.arch().interrupts_enabled());
        let masked = kernel.critical(|| !kernel.arch().interrupts_enabled());
        assert!(masked);
        assert!(kernel.arch().interrupts_enabled());
    }

    #[test]
    fn test_tick_before_init_does_nothing() {
        let kernel = SmallKernel::new(HostArch::new());
        kernel.tick();
        assert_eq!(kernel.ticks(), 0);
    }

    #[test]
    fn test_switch_before_threads_returns_same_sp() {
        let kernel = SmallKernel::new(HostArch::new());
        kernel.init(KernelConfig::default()).unwrap();
        assert_eq!(kernel.switch_context(0x1234), 0x1234);
    }
}
