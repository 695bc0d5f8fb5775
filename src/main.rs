#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

extern crate rlibc;

mod platform;

use bootloader_api::config::{BootloaderConfig, Mapping};
use bootloader_api::{entry_point, BootInfo};
use core::fmt::Write;
use core::panic::PanicInfo;
use triterm::println;

use crate::platform::screen::TerminalWriter;

/// Physical memory is mapped high so the low 4 GiB stays free for the
/// program region and the vidmap pages.
pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config.mappings.dynamic_range_start = Some(0xFFFF_8000_0000_0000);
    config.kernel_stack_size = 128 * 1024;
    config
};

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

pub fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    let kernel = match platform::init::init_kernel(boot_info) {
        Ok(kernel) => kernel,
        Err(e) => {
            println!("Kernel initialization failed: {}", e);
            halt_loop();
        }
    };

    match kernel.boot() {
        Ok(status) => println!("root shell returned {}", status),
        Err(e) => {
            println!("cannot start root shell: {:?}", e);
            let _ = writeln!(TerminalWriter(0), "cannot start the shell: {:?}", e);
        }
    }
    halt_loop()
}

fn halt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();
    println!("PANIC : {} | {:?}", info.message(), info.location());
    halt_loop()
}
