//! Periodic event callbacks run from the tick interrupt.
//!
//! Callbacks run in interrupt context. They must finish quickly and must not
//! block, sleep or suspend; they may signal semaphores and put into FIFOs.

use crate::config::MAX_PERIODIC_EVENTS;
use crate::errors::{KernelError, KernelResult};

#[derive(Clone, Copy)]
struct PeriodicEvent {
    callback: fn(),
    period: u32,
    countdown: u32,
}

/// Callbacks that are due on the current tick, in registration order.
pub type DueEvents = [Option<fn()>; MAX_PERIODIC_EVENTS];

/// Fixed table of periodic event slots.
pub struct EventTable {
    slots: [Option<PeriodicEvent>; MAX_PERIODIC_EVENTS],
    len: usize,
}

impl EventTable {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_PERIODIC_EVENTS],
            len: 0,
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Register `callback` to run every `period_ticks` ticks.
    ///
    /// The first run happens `period_ticks` ticks after registration.
    /// Returns the slot index.
    pub fn register(&mut self, callback: fn(), period_ticks: u32) -> KernelResult<usize> {
        if period_ticks == 0 {
            return Err(KernelError::InvalidPeriod(0));
        }
        if self.len == MAX_PERIODIC_EVENTS {
            return Err(KernelError::EventSlotsExhausted);
        }

        let slot = self.len;
        self.slots[slot] = Some(PeriodicEvent {
            callback,
            period: period_ticks,
            countdown: period_ticks,
        });
        self.len += 1;
        Ok(slot)
    }

    /// Advance every countdown by one tick and collect the callbacks that
    /// came due. Their countdowns are reloaded.
    ///
    /// The callbacks are returned rather than called so the caller can run
    /// them without holding the table.
    pub fn advance(&mut self) -> DueEvents {
        let mut due = [None; MAX_PERIODIC_EVENTS];
        for (slot, out) in self.slots.iter_mut().zip(due.iter_mut()) {
            if let Some(event) = slot {
                event.countdown -= 1;
                if event.countdown == 0 {
                    event.countdown = event.period;
                    *out = Some(event.callback);
                }
            }
        }
        due
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for EventTable {
    fn default() -> Self {
        Self::new()
    }
}
