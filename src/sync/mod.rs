//! Synchronization primitives built on the kernel's block/wake protocol.

pub mod fifo;
pub mod semaphore;

pub use fifo::Fifo;
pub use semaphore::Semaphore;
