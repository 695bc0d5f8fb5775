//! Hardware side of the kernel binary: descriptor tables, interrupt
//! controllers, timers, page tables, the text screens and the
//! framebuffer they are drawn on.

pub mod framebuffer;
pub mod gdt;
pub mod init;
pub mod interrupts;
pub mod machine;
pub mod memory;
pub mod pic;
pub mod screen;
pub mod switch;
pub mod timer;

use spin::Once;
use triterm::devices::FsImage;
use triterm::Kernel;

use machine::X86Machine;
use screen::ScreenConsole;

pub type PlatformKernel = Kernel<X86Machine, FsImage<'static>, ScreenConsole>;

static KERNEL: Once<PlatformKernel> = Once::new();

/// The kernel once boot has finished building it; interrupt handlers that
/// fire earlier see `None`.
pub fn kernel() -> Option<&'static PlatformKernel> {
    KERNEL.get()
}
