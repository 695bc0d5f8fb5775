//! Process and scheduling core of a three-terminal teaching kernel.
//!
//! The library holds everything that can be reasoned about without the
//! hardware: process table, terminal bindings, address-space bookkeeping,
//! system calls, devices and the round-robin scheduler. The `kernel`
//! binary supplies the platform port (`hal`) and boots it.

#![cfg_attr(not(test), no_std)]

#[cfg(not(test))]
use spin::Mutex;
#[cfg(not(test))]
use uart_16550::SerialPort;

#[cfg(not(test))]
pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(0x3F8) });

#[cfg(not(test))]
#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        x86_64::instructions::interrupts::without_interrupts(|| {
            let mut serial = $crate::SERIAL.lock();
            let _ = writeln!(serial, $($arg)*);
        });
    }};
}

pub mod config;
pub mod devices;
pub mod hal;
pub mod kernel;
pub mod loader;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod syscalls;

#[cfg(test)]
pub mod testing;

pub use config::KernelConfig;
pub use kernel::Kernel;
