//! Tick counting.

use portable_atomic::{AtomicU32, Ordering};

/// Global tick counter for system uptime.
///
/// Incremented once per tick interrupt. 32 bits wrap after about 49 days at
/// 1 kHz; compare tick values with `wrapping_sub`.
#[derive(Debug)]
pub struct TickCounter {
    /// Number of ticks since the counter was created
    ticks: AtomicU32,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
        }
    }

    /// Increment the tick counter.
    ///
    /// Only the tick interrupt calls this, so a plain load/store pair is
    /// enough and no read-modify-write atomics are needed.
    pub fn increment(&self) {
        let ticks = self.ticks.load(Ordering::Acquire);
        self.ticks.store(ticks.wrapping_add(1), Ordering::Release);
    }

    /// Get the current tick count.
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Ticks elapsed since `earlier`, correct across one wrap.
    pub fn since(&self, earlier: u32) -> u32 {
        self.ticks().wrapping_sub(earlier)
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}
