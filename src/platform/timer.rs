//! PIT and RTC programming.
//!
//! The PIT drives the scheduler at `TIMER_HZ`; the RTC raises IRQ8 at its
//! base rate and every virtual clock divides that down.

use core::sync::atomic::{AtomicU64, Ordering};

use triterm::config::{PIT_BASE_HZ, TIMER_HZ};
use x86_64::instructions::port::Port;

/// RTC interrupts since boot.
pub static RTC_TICKS: AtomicU64 = AtomicU64::new(0);

const PIT_COMMAND: u16 = 0x43;
const PIT_CHANNEL0: u16 = 0x40;
/// Channel 0, lobyte/hibyte, mode 3.
const PIT_SQUARE_WAVE: u8 = 0x36;

const CMOS_INDEX: u16 = 0x70;
const CMOS_DATA: u16 = 0x71;
const NMI_DISABLE: u8 = 0x80;
const RTC_REG_A: u8 = 0x0A;
const RTC_REG_B: u8 = 0x0B;
const RTC_REG_C: u8 = 0x0C;
const RTC_PERIODIC: u8 = 0x40;
/// Rate selector for 32768 >> (6 - 1) = 1024 Hz.
const RTC_RATE_1024HZ: u8 = 0x06;

pub fn init_pit() {
    let divisor = (PIT_BASE_HZ / TIMER_HZ) as u16;
    unsafe {
        Port::<u8>::new(PIT_COMMAND).write(PIT_SQUARE_WAVE);
        let mut channel = Port::<u8>::new(PIT_CHANNEL0);
        channel.write((divisor & 0xFF) as u8);
        channel.write((divisor >> 8) as u8);
    }
}

pub fn init_rtc() {
    let mut index = Port::<u8>::new(CMOS_INDEX);
    let mut data = Port::<u8>::new(CMOS_DATA);
    unsafe {
        index.write(NMI_DISABLE | RTC_REG_B);
        let previous = data.read();
        index.write(NMI_DISABLE | RTC_REG_B);
        data.write(previous | RTC_PERIODIC);

        index.write(NMI_DISABLE | RTC_REG_A);
        let previous = data.read();
        index.write(NMI_DISABLE | RTC_REG_A);
        data.write((previous & 0xF0) | RTC_RATE_1024HZ);

        index.write(RTC_REG_C);
        data.read();
    }
}

/// Count one RTC interrupt. Register C must be read or the RTC stops
/// raising IRQ8.
pub fn on_rtc_interrupt() {
    RTC_TICKS.fetch_add(1, Ordering::Relaxed);
    unsafe {
        Port::<u8>::new(CMOS_INDEX).write(RTC_REG_C);
        Port::<u8>::new(CMOS_DATA).read();
    }
}

pub fn rtc_ticks() -> u64 {
    RTC_TICKS.load(Ordering::Relaxed)
}
