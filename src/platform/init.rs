//! Kernel initialization phases

use bootloader_api::info::Optional;
use bootloader_api::BootInfo;
use triterm::config::{KernelConfig, MAX_TERMINALS};
use triterm::devices::FsImage;
use triterm::{println, Kernel};
use x86_64::PhysAddr;

use super::machine::{kernel_stack_region_top, X86Machine};
use super::screen::{self, ScreenConsole};
use super::{framebuffer, gdt, interrupts, memory, pic, timer, PlatformKernel, KERNEL};

/// Bring up the hardware and build the kernel. Interrupts stay masked;
/// the first `iretq` into the root shell enables them.
pub fn init_kernel(
    boot_info: &'static mut BootInfo,
) -> Result<&'static PlatformKernel, &'static str> {
    println!("triterm: initializing");

    let boot_framebuffer = core::mem::replace(&mut boot_info.framebuffer, Optional::None);
    let boot_info: &'static BootInfo = boot_info;

    init_phase("Descriptor Tables", || {
        gdt::init();
        interrupts::init_idt();
        Ok(())
    })?;

    let (machine, process_pool_base) = init_phase("Memory", || {
        let layout = memory::init(boot_info)?;
        let pool_base = layout.pool_base;
        // Sole mapper over the boot page tables.
        Ok((unsafe { X86Machine::new(layout) }, pool_base))
    })?;

    init_phase("Framebuffer", || {
        match boot_framebuffer.into_option() {
            Some(buffer) => framebuffer::init_framebuffer(buffer),
            None => println!("    no framebuffer, serial output only"),
        }
        Ok(())
    })?;

    let fs = init_phase("File System", || load_ramdisk(boot_info))?;

    let kernel = init_phase("Process Core", || {
        screen::init();
        let mut display_frames = [PhysAddr::zero(); MAX_TERMINALS];
        for (terminal, frame) in display_frames.iter_mut().enumerate() {
            *frame = machine
                .translate(screen::page_address(terminal))
                .ok_or("text page not mapped")?;
        }
        let config = KernelConfig {
            process_pool_base,
            kernel_stack_region_top: kernel_stack_region_top(),
            display_frames,
        };
        Kernel::new(config, machine, fs, ScreenConsole).map_err(|err| {
            println!("    config rejected: {:?}", err);
            "invalid kernel layout"
        })
    })?;
    let kernel = KERNEL.call_once(|| kernel);

    init_phase("Interrupt Controllers", || {
        pic::init();
        timer::init_pit();
        timer::init_rtc();
        Ok(())
    })?;

    println!("triterm: initialization complete");
    Ok(kernel)
}

fn load_ramdisk(boot_info: &'static BootInfo) -> Result<FsImage<'static>, &'static str> {
    let addr = boot_info
        .ramdisk_addr
        .into_option()
        .ok_or("no ramdisk loaded")?;
    let len = boot_info.ramdisk_len as usize;
    // The bootloader maps the ramdisk for the lifetime of the kernel.
    let bytes = unsafe { core::slice::from_raw_parts(addr as *const u8, len) };
    FsImage::parse(bytes).map_err(|err| {
        println!("    bad file system image: {:?}", err);
        "unreadable ramdisk"
    })
}

fn init_phase<T>(
    name: &'static str,
    init_fn: impl FnOnce() -> Result<T, &'static str>,
) -> Result<T, &'static str> {
    println!("  initializing {}...", name);
    match init_fn() {
        Ok(value) => {
            println!("    {} ready", name);
            Ok(value)
        }
        Err(e) => {
            println!("    {} failed: {}", name, e);
            Err(e)
        }
    }
}
