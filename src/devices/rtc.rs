//! # Virtual Real-Time Clock
//!
//! The hardware RTC runs at a fixed 1024 Hz. Each terminal sees its own
//! virtual clock whose rate is a power of two in `[2, 1024]`; a `read`
//! blocks for `1024 / rate` hardware ticks.
//!
//! | Operation | Effect                                            |
//! |-----------|---------------------------------------------------|
//! | open      | reset the caller's terminal to 2 Hz               |
//! | read      | busy-wait one virtual period, returns 0           |
//! | write     | 4-byte little-endian rate, returns 4              |
//! | close     | nothing                                           |

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::{MAX_TERMINALS, RTC_BASE_HZ, RTC_DEFAULT_HZ, RTC_MIN_HZ};
use crate::hal::TickSource;
use crate::process::TerminalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcError {
    InvalidFrequency(i32),
    InvalidTerminal(TerminalId),
}

pub struct VirtualRtc {
    /// Hardware ticks per virtual tick, per terminal.
    divisors: [AtomicU32; MAX_TERMINALS],
}

impl VirtualRtc {
    pub const fn new() -> Self {
        const DEFAULT: AtomicU32 = AtomicU32::new(RTC_BASE_HZ / RTC_DEFAULT_HZ);
        Self {
            divisors: [DEFAULT; MAX_TERMINALS],
        }
    }

    pub fn open(&self, terminal: TerminalId) -> Result<(), RtcError> {
        self.set_frequency(terminal, RTC_DEFAULT_HZ as i32)
    }

    pub fn set_frequency(&self, terminal: TerminalId, hz: i32) -> Result<(), RtcError> {
        let divisor = self
            .divisors
            .get(terminal)
            .ok_or(RtcError::InvalidTerminal(terminal))?;
        let rate = u32::try_from(hz).map_err(|_| RtcError::InvalidFrequency(hz))?;
        if !(RTC_MIN_HZ..=RTC_BASE_HZ).contains(&rate) || !rate.is_power_of_two() {
            return Err(RtcError::InvalidFrequency(hz));
        }
        divisor.store(RTC_BASE_HZ / rate, Ordering::Relaxed);
        Ok(())
    }

    pub fn frequency(&self, terminal: TerminalId) -> Option<u32> {
        self.divisors
            .get(terminal)
            .map(|divisor| RTC_BASE_HZ / divisor.load(Ordering::Relaxed))
    }

    /// Block until one virtual period of `terminal`'s clock has elapsed.
    /// Interrupts must be enabled or this never returns.
    pub fn wait<T: TickSource + ?Sized>(
        &self,
        terminal: TerminalId,
        clock: &T,
    ) -> Result<(), RtcError> {
        let divisor = self
            .divisors
            .get(terminal)
            .ok_or(RtcError::InvalidTerminal(terminal))?
            .load(Ordering::Relaxed);
        let start = clock.rtc_ticks();
        while clock.rtc_ticks().wrapping_sub(start) < u64::from(divisor) {
            clock.relax();
        }
        Ok(())
    }
}

impl Default for VirtualRtc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockMachine;

    #[test]
    fn test_default_rate() {
        let rtc = VirtualRtc::new();
        assert_eq!(rtc.frequency(0), Some(2));
        assert_eq!(rtc.frequency(3), None);
    }

    #[test]
    fn test_set_frequency_validation() {
        let rtc = VirtualRtc::new();
        assert!(rtc.set_frequency(1, 512).is_ok());
        assert_eq!(rtc.frequency(1), Some(512));
        assert_eq!(rtc.set_frequency(1, 3), Err(RtcError::InvalidFrequency(3)));
        assert_eq!(rtc.set_frequency(1, 2048), Err(RtcError::InvalidFrequency(2048)));
        assert_eq!(rtc.set_frequency(1, 1), Err(RtcError::InvalidFrequency(1)));
        assert_eq!(rtc.set_frequency(1, -4), Err(RtcError::InvalidFrequency(-4)));
        assert_eq!(rtc.frequency(1), Some(512));
    }

    #[test]
    fn test_terminals_independent() {
        let rtc = VirtualRtc::new();
        rtc.set_frequency(0, 64).unwrap();
        rtc.set_frequency(2, 1024).unwrap();
        assert_eq!(rtc.frequency(0), Some(64));
        assert_eq!(rtc.frequency(1), Some(2));
        rtc.open(0).unwrap();
        assert_eq!(rtc.frequency(0), Some(2));
        assert_eq!(rtc.frequency(2), Some(1024));
    }

    #[test]
    fn test_wait_counts_hardware_ticks() {
        let machine = MockMachine::new();
        let rtc = VirtualRtc::new();
        rtc.set_frequency(0, 256).unwrap();
        let before = machine.rtc_ticks();
        rtc.wait(0, &machine).unwrap();
        assert!(machine.rtc_ticks() - before >= 4);

        rtc.set_frequency(0, 1024).unwrap();
        let before = machine.rtc_ticks();
        rtc.wait(0, &machine).unwrap();
        assert!(machine.rtc_ticks() - before >= 1);
    }
}
