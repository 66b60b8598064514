//! Round-robin selection over the TCB ring.
//!
//! There is no ready queue. Eligibility is checked on demand by following
//! `next` links, so picking a thread costs O(N) in the worst case. N is small
//! and fixed, and the walk order doubles as the semaphore wake order.

use crate::sync::Semaphore;
use crate::thread::{Tcb, ThreadId};

/// Round-robin view of a TCB ring.
pub struct RoundRobin<'a> {
    tcbs: &'a [Tcb],
}

impl<'a> RoundRobin<'a> {
    pub fn new(tcbs: &'a [Tcb]) -> Self {
        Self { tcbs }
    }

    /// Walk the ring starting just after `from`.
    ///
    /// Yields exactly `N` entries; the last one is `from` itself.
    pub fn walk(&self, from: ThreadId) -> RingWalk<'a> {
        RingWalk {
            tcbs: self.tcbs,
            at: from,
            remaining: self.tcbs.len(),
        }
    }

    /// First eligible thread after `from` in ring order.
    ///
    /// `from` is considered last, so a lone eligible thread keeps the CPU.
    /// Returns `None` after one full lap without finding one.
    pub fn next_eligible(&self, from: ThreadId) -> Option<ThreadId> {
        self.walk(from)
            .find(|&id| self.tcbs[id.index()].is_eligible())
    }

    /// First thread after `from` in ring order that is blocked on `sem`.
    ///
    /// This is the waiter a signal releases: scan order, not arrival order.
    pub fn first_blocked_on(&self, from: ThreadId, sem: &Semaphore) -> Option<ThreadId> {
        self.walk(from)
            .find(|&id| self.tcbs[id.index()].is_blocked_on(sem))
    }
}

/// Iterator over ring entries, following `next` links.
pub struct RingWalk<'a> {
    tcbs: &'a [Tcb],
    at: ThreadId,
    remaining: usize,
}

impl Iterator for RingWalk<'_> {
    type Item = ThreadId;

    fn next(&mut self) -> Option<ThreadId> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.at = self.tcbs[self.at.index()].next();
        Some(self.at)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
