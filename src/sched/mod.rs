//! Thread scheduler.
//!
//! Provides the round-robin ring walker used by the kernel's single
//! "pick next eligible thread" path.

pub mod rr;

pub use rr::{RingWalk, RoundRobin};
