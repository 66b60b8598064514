//! Kernel configuration.

use crate::errors::{KernelError, KernelResult};

/// Fastest core clock of the TM4C123 (80 MHz).
pub const DEFAULT_CORE_CLOCK_HZ: u32 = 80_000_000;

/// Default tick frequency: one tick per millisecond.
pub const DEFAULT_TICK_HZ: u32 = 1_000;

/// Default per-thread stack size in words.
pub const DEFAULT_STACK_WORDS: usize = 100;

/// Maximum number of periodic event callbacks.
pub const MAX_PERIODIC_EVENTS: usize = 2;

/// Clock settings handed to `Kernel::init`.
///
/// ```
/// use rr_kernel::KernelConfig;
///
/// let config = KernelConfig::new().core_clock_hz(16_000_000).tick_hz(500);
/// assert_eq!(config.tick_reload(), 32_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Core clock feeding the tick timer, in Hz
    pub core_clock_hz: u32,
    /// Tick interrupt frequency, in Hz
    pub tick_hz: u32,
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            core_clock_hz: DEFAULT_CORE_CLOCK_HZ,
            tick_hz: DEFAULT_TICK_HZ,
        }
    }

    pub const fn core_clock_hz(self, core_clock_hz: u32) -> Self {
        Self {
            core_clock_hz,
            ..self
        }
    }

    pub const fn tick_hz(self, tick_hz: u32) -> Self {
        Self { tick_hz, ..self }
    }

    /// Core clock cycles per tick.
    pub const fn tick_reload(&self) -> u32 {
        if self.tick_hz == 0 {
            return 0;
        }
        self.core_clock_hz / self.tick_hz
    }

    /// Convert a period in milliseconds to whole ticks, rounding down.
    ///
    /// Saturates at `u32::MAX` ticks.
    pub const fn ms_to_ticks(&self, ms: u32) -> u32 {
        let ticks = (ms as u64 * self.tick_hz as u64) / 1_000;
        if ticks > u32::MAX as u64 {
            u32::MAX
        } else {
            ticks as u32
        }
    }

    /// Check that a tick source can be built from these values.
    pub fn validate(&self) -> KernelResult<()> {
        if self.tick_hz == 0 || self.tick_reload() == 0 {
            return Err(KernelError::InvalidConfig);
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.core_clock_hz, 80_000_000);
        assert_eq!(config.tick_hz, 1_000);
        assert_eq!(config.tick_reload(), 80_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ms_to_ticks() {
        let config = KernelConfig::new();
        assert_eq!(config.ms_to_ticks(1), 1);
        assert_eq!(config.ms_to_ticks(250), 250);

        let slow = KernelConfig::new().tick_hz(100);
        assert_eq!(slow.ms_to_ticks(10), 1);
        assert_eq!(slow.ms_to_ticks(5), 0);
    }

    #[test]
    fn test_ms_to_ticks_saturates() {
        let fast = KernelConfig::new().tick_hz(100_000);
        assert_eq!(fast.ms_to_ticks(u32::MAX), u32::MAX);
        // 50_000_000 ms at 100 kHz is 5e9 ticks, past u32::MAX
        assert_eq!(fast.ms_to_ticks(50_000_000), u32::MAX);
        assert_eq!(fast.ms_to_ticks(40_000_000), 4_000_000_000);
    }

    #[test]
    fn test_validate_rejects_unusable_clocks() {
        assert_eq!(
            KernelConfig::new().tick_hz(0).validate(),
            Err(KernelError::InvalidConfig)
        );
        // Tick faster than the core clock leaves no cycles per tick
        assert_eq!(
            KernelConfig::new().core_clock_hz(1_000).tick_hz(2_000).validate(),
            Err(KernelError::InvalidConfig)
        );
    }
}
