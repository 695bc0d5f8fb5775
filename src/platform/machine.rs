//! The x86_64 port of the process core.

use core::ptr::addr_of;

use spin::Mutex;
use triterm::config::{KERNEL_STACK_SIZE, MAX_PROCESSES, PROGRAM_REGION_SIZE, PROGRAM_VIRT_BASE};
use triterm::hal::{InterruptControl, Launch, Mmu, TaskSwitch, TickSource};
use triterm::memory::{DisplayMapping, MappingError, ProgramMapping};
use triterm::process::SavedContext;
use x86_64::instructions::interrupts;
use x86_64::structures::paging::mapper::{MapToError, UnmapError};
use x86_64::structures::paging::{
    Mapper, OffsetPageTable, Page, PageSize, PageTableFlags, PhysFrame, Size2MiB, Size4KiB,
    Translate,
};
use x86_64::{PhysAddr, VirtAddr};

use super::memory::{self, BootFrameAllocator, MemoryLayout};
use super::{gdt, pic, switch, timer};

#[repr(C, align(16))]
struct KernelStacks([[u8; KERNEL_STACK_SIZE as usize]; MAX_PROCESSES]);

/// Per-process kernel stacks, one 8 KiB slot per pid counted down from
/// the top.
static mut KERNEL_STACKS: KernelStacks =
    KernelStacks([[0; KERNEL_STACK_SIZE as usize]; MAX_PROCESSES]);

pub fn kernel_stack_region_top() -> VirtAddr {
    let base = unsafe { addr_of!(KERNEL_STACKS) } as u64;
    VirtAddr::new(base + KERNEL_STACK_SIZE * MAX_PROCESSES as u64)
}

/// Interrupt flag and RTC tick access, usable without the rest of the
/// machine.
pub struct Cpu;

impl InterruptControl for Cpu {
    fn interrupts_enabled(&self) -> bool {
        interrupts::are_enabled()
    }

    fn disable_interrupts(&self) {
        interrupts::disable();
    }

    fn enable_interrupts(&self) {
        interrupts::enable();
    }
}

impl TickSource for Cpu {
    fn rtc_ticks(&self) -> u64 {
        timer::rtc_ticks()
    }

    fn relax(&self) {
        if interrupts::are_enabled() {
            x86_64::instructions::hlt();
        } else {
            core::hint::spin_loop();
        }
    }
}

struct PageMapper {
    table: OffsetPageTable<'static>,
    frames: BootFrameAllocator,
}

impl PageMapper {
    fn map<S: PageSize>(
        &mut self,
        page: Page<S>,
        frame: PhysFrame<S>,
        flags: PageTableFlags,
    ) -> Result<(), MappingError>
    where
        OffsetPageTable<'static>: Mapper<S>,
    {
        match Mapper::<S>::unmap(&mut self.table, page) {
            Ok((_, flush)) => flush.ignore(),
            Err(UnmapError::PageNotMapped) => {}
            Err(_) => return Err(MappingError::Platform("unmap failed")),
        }
        let parent_flags = flags & (PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::USER_ACCESSIBLE);
        let flush = unsafe {
            Mapper::<S>::map_to_with_table_flags(
                &mut self.table,
                page,
                frame,
                flags,
                parent_flags,
                &mut self.frames,
            )
        }
        .map_err(|err| match err {
            MapToError::FrameAllocationFailed => {
                MappingError::Platform("out of page table frames")
            }
            MapToError::ParentEntryHugePage => MappingError::Platform("parent entry is a huge page"),
            MapToError::PageAlreadyMapped(_) => MappingError::Platform("page already mapped"),
        })?;
        flush.flush();
        Ok(())
    }
}

pub struct X86Machine {
    cpu: Cpu,
    mapper: Mutex<PageMapper>,
    user_code: u64,
    user_data: u64,
}

impl X86Machine {
    /// # Safety
    ///
    /// `layout` must describe the live boot page tables, and no other
    /// mapper over them may exist.
    pub unsafe fn new(layout: MemoryLayout) -> Self {
        let selectors = gdt::selectors();
        Self {
            cpu: Cpu,
            mapper: Mutex::new(PageMapper {
                table: memory::active_page_table(layout.physical_offset),
                frames: layout.frames,
            }),
            user_code: u64::from(selectors.user_code.0),
            user_data: u64::from(selectors.user_data.0),
        }
    }

    pub fn translate(&self, addr: VirtAddr) -> Option<PhysAddr> {
        self.mapper.lock().table.translate_addr(addr)
    }
}

impl InterruptControl for X86Machine {
    fn interrupts_enabled(&self) -> bool {
        self.cpu.interrupts_enabled()
    }

    fn disable_interrupts(&self) {
        self.cpu.disable_interrupts();
    }

    fn enable_interrupts(&self) {
        self.cpu.enable_interrupts();
    }
}

impl TickSource for X86Machine {
    fn rtc_ticks(&self) -> u64 {
        self.cpu.rtc_ticks()
    }

    fn relax(&self) {
        self.cpu.relax();
    }
}

impl Mmu for X86Machine {
    fn install_program(&self, mapping: &ProgramMapping) -> Result<(), MappingError> {
        let mut mapper = self.mapper.lock();
        for &(page, frame) in &mapping.pages {
            mapper.map::<Size2MiB>(page, frame, mapping.flags | PageTableFlags::HUGE_PAGE)?;
        }
        Ok(())
    }

    fn install_display(&self, mapping: &DisplayMapping) -> Result<(), MappingError> {
        self.mapper
            .lock()
            .map::<Size4KiB>(mapping.page, mapping.frame, mapping.flags)
    }

    fn remove_display(&self, page: Page<Size4KiB>) -> Result<(), MappingError> {
        let mut mapper = self.mapper.lock();
        match Mapper::<Size4KiB>::unmap(&mut mapper.table, page) {
            Ok((_, flush)) => {
                flush.flush();
                Ok(())
            }
            Err(UnmapError::PageNotMapped) => Err(MappingError::NotMapped(page.start_address())),
            Err(_) => Err(MappingError::Platform("unmap failed")),
        }
    }

    unsafe fn program_region(&self) -> &mut [u8] {
        core::slice::from_raw_parts_mut(
            PROGRAM_VIRT_BASE as *mut u8,
            PROGRAM_REGION_SIZE as usize,
        )
    }
}

impl TaskSwitch for X86Machine {
    fn acknowledge_timer(&self) {
        pic::end_of_interrupt(pic::InterruptIndex::Timer);
    }

    fn set_kernel_stack(&self, top: VirtAddr) {
        gdt::set_kernel_stack(top);
    }

    unsafe fn prepare_first_run(&self, stack_top: VirtAddr, launch: &Launch) -> SavedContext {
        switch::prepare_first_run(stack_top, launch, self.user_code, self.user_data)
    }

    unsafe fn enter_user(&self, save: *mut SavedContext, launch: &Launch) -> i32 {
        switch::enter_user(save, launch, self.user_code, self.user_data)
    }

    unsafe fn switch(&self, save: *mut SavedContext, load: *const SavedContext) {
        switch::switch(save, load);
    }

    unsafe fn resume(&self, context: SavedContext, status: i32) -> ! {
        switch::resume(context, status)
    }
}
