//! Tick accounting and periodic events.

pub mod events;
pub mod tick;

pub use events::{DueEvents, EventTable};
pub use tick::TickCounter;
