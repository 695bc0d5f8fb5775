//! # Platform Port
//!
//! Everything the process core needs from the CPU, grouped into four
//! capabilities so the core can run against real hardware or a host-side
//! mock.
//!
//! | Trait              | Provided by the kernel binary              |
//! |--------------------|--------------------------------------------|
//! | `InterruptControl` | `cli` / `sti` / RFLAGS.IF                  |
//! | `TickSource`       | RTC IRQ8 counter, `pause`                  |
//! | `Mmu`              | x86_64 page tables, TLB flushes            |
//! | `TaskSwitch`       | PIC EOI, TSS.RSP0, context-switch assembly |
//!
//! ## Control Transfers
//!
//! ```text
//!  execute ──enter_user(save)──▶ user task ──halt──▶ resume(saved, status)
//!     ▲                                                      │
//!     └──────────────── returns status ◀─────────────────────┘
//!
//!  timer tick ──switch(save, load)──▶ other task (returns on a later tick)
//! ```

pub mod guard;

pub use guard::{InterruptGuard, Shared};

use x86_64::structures::paging::{Page, Size4KiB};
use x86_64::VirtAddr;

use crate::memory::{DisplayMapping, MappingError, ProgramMapping};
use crate::process::{Pid, SavedContext};

/// Everything needed to drop a freshly loaded program into ring 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub pid: Pid,
    pub entry: VirtAddr,
    pub user_stack: VirtAddr,
    pub kernel_stack: VirtAddr,
}

pub trait InterruptControl {
    fn interrupts_enabled(&self) -> bool;
    fn disable_interrupts(&self);
    fn enable_interrupts(&self);
}

pub trait TickSource {
    /// Hardware RTC interrupts seen since boot.
    fn rtc_ticks(&self) -> u64;
    /// One step of a busy wait. Must not mask interrupts.
    fn relax(&self);
}

pub trait Mmu {
    /// Install both huge pages of `mapping` and flush them from the TLB
    /// before returning.
    fn install_program(&self, mapping: &ProgramMapping) -> Result<(), MappingError>;
    fn install_display(&self, mapping: &DisplayMapping) -> Result<(), MappingError>;
    fn remove_display(&self, page: Page<Size4KiB>) -> Result<(), MappingError>;

    /// Kernel view of the currently installed program region.
    ///
    /// # Safety
    ///
    /// A program mapping must be installed and no other reference to the
    /// region may be live while the returned slice is used.
    unsafe fn program_region(&self) -> &mut [u8];
}

pub trait TaskSwitch {
    fn acknowledge_timer(&self);
    /// Stack loaded by the CPU on the next ring 3 to ring 0 transition.
    fn set_kernel_stack(&self, top: VirtAddr);

    /// Build a context on the kernel stack ending at `stack_top` that drops
    /// into `launch` the first time it is switched to.
    ///
    /// # Safety
    ///
    /// `stack_top` must be the top of a kernel stack nobody is running on.
    unsafe fn prepare_first_run(&self, stack_top: VirtAddr, launch: &Launch) -> SavedContext;

    /// Save the current kernel context into `save` and enter ring 3.
    /// Returns the exit status once that context is resumed.
    ///
    /// # Safety
    ///
    /// `save` must stay valid until the launched task halts, and the
    /// program mapping and kernel stack of `launch.pid` must be installed.
    unsafe fn enter_user(&self, save: *mut SavedContext, launch: &Launch) -> i32;

    /// Save the current kernel context into `save` and continue `load`.
    ///
    /// # Safety
    ///
    /// Both pointers must reference live contexts; `load` must have been
    /// produced by `switch`, `enter_user` or `prepare_first_run`.
    unsafe fn switch(&self, save: *mut SavedContext, load: *const SavedContext);

    /// Abandon the current kernel stack and continue `context` with
    /// `status` as the return value of the suspended `enter_user` call.
    /// Interrupts are enabled once the target stack is live.
    ///
    /// # Safety
    ///
    /// `context` must come from `enter_user` or `prepare_first_run` and
    /// its stack must not have been reused.
    unsafe fn resume(&self, context: SavedContext, status: i32) -> !;
}

pub trait Machine: InterruptControl + TickSource + Mmu + TaskSwitch {}

impl<T: InterruptControl + TickSource + Mmu + TaskSwitch> Machine for T {}
