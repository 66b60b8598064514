//! Error types for kernel operations.
//!
//! Only capacity exhaustion and setup-order mistakes are reported here.
//! Misuse the kernel cannot observe (a wait that is never signalled, an
//! event callback that blocks) shows up as a stalled thread instead.

#![allow(clippy::uninlined_format_args)]

use core::fmt;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Error type for all kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// `init` has not been called yet
    NotInitialized,
    /// `init` was called a second time
    AlreadyInitialized,
    /// Configuration values are unusable
    InvalidConfig,
    /// `launch` was called before `add_threads`
    ThreadsNotAdded,
    /// `add_threads` was called a second time
    ThreadsAlreadyAdded,
    /// The kernel is already running threads
    AlreadyLaunched,
    /// Time slice of zero ticks
    InvalidTimeSlice,
    /// Event period (in milliseconds) rounds to zero ticks
    InvalidPeriod(u32),
    /// Both periodic event slots are taken
    EventSlotsExhausted,
    /// FIFO is full, the value was dropped
    FifoFull,
    /// The architecture could not start the tick interrupt
    TickSource(&'static str),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NotInitialized => write!(f, "Kernel not initialized"),
            KernelError::AlreadyInitialized => write!(f, "Kernel already initialized"),
            KernelError::InvalidConfig => write!(f, "Invalid kernel configuration"),
            KernelError::ThreadsNotAdded => write!(f, "No threads registered"),
            KernelError::ThreadsAlreadyAdded => write!(f, "Threads already registered"),
            KernelError::AlreadyLaunched => write!(f, "Kernel already launched"),
            KernelError::InvalidTimeSlice => write!(f, "Time slice must be at least one tick"),
            KernelError::InvalidPeriod(ms) => write!(f, "Invalid event period: {} ms", ms),
            KernelError::EventSlotsExhausted => write!(f, "No free periodic event slot"),
            KernelError::FifoFull => write!(f, "FIFO full, data lost"),
            KernelError::TickSource(msg) => write!(f, "Tick source error: {}", msg),
        }
    }
}

impl KernelError {
    /// Whether the error is a capacity limit rather than a setup mistake.
    pub fn is_capacity(&self) -> bool {
        matches!(self, KernelError::EventSlotsExhausted | KernelError::FifoFull)
    }
}
