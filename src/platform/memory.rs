//! Boot memory map handling: where the process pool lives, and where page
//! table and kernel stack frames come from.

use core::ops::Range;

use bootloader_api::info::{MemoryRegion, MemoryRegionKind};
use bootloader_api::BootInfo;
use triterm::config::{KernelConfig, MAX_PROCESSES, MIB, PROGRAM_REGION_SIZE};
use triterm::println;
use x86_64::structures::paging::{FrameAllocator, OffsetPageTable, PageTable, PhysFrame, Size4KiB};
use x86_64::{PhysAddr, VirtAddr};

const FRAME_SIZE: u64 = 4096;
/// Real-mode leftovers and BIOS areas are never handed out.
const LOW_MEMORY_END: u64 = MIB;
const POOL_SIZE: u64 = MAX_PROCESSES as u64 * PROGRAM_REGION_SIZE;

pub struct MemoryLayout {
    pub physical_offset: VirtAddr,
    pub pool_base: PhysAddr,
    pub frames: BootFrameAllocator,
}

/// Hands out 4 KiB frames from usable memory, skipping the process pool.
pub struct BootFrameAllocator {
    regions: &'static [MemoryRegion],
    reserved: Range<u64>,
    region: usize,
    next: u64,
}

impl BootFrameAllocator {
    fn new(regions: &'static [MemoryRegion], reserved: Range<u64>) -> Self {
        Self {
            regions,
            reserved,
            region: 0,
            next: 0,
        }
    }
}

unsafe impl FrameAllocator<Size4KiB> for BootFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        while let Some(region) = self.regions.get(self.region) {
            let start = align_up(region.start.max(self.next).max(LOW_MEMORY_END), FRAME_SIZE);
            if region.kind != MemoryRegionKind::Usable || start + FRAME_SIZE > region.end {
                self.region += 1;
                self.next = 0;
                continue;
            }
            if self.reserved.contains(&start) {
                self.next = self.reserved.end;
                continue;
            }
            self.next = start + FRAME_SIZE;
            return Some(PhysFrame::containing_address(PhysAddr::new(start)));
        }
        None
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

fn usable(region: &&MemoryRegion) -> bool {
    region.kind == MemoryRegionKind::Usable
}

/// The pool base from `KernelConfig::default` when that range is free,
/// otherwise the lowest 4 MiB-aligned usable range large enough.
fn choose_pool(regions: &[MemoryRegion]) -> Option<u64> {
    let preferred = KernelConfig::default().process_pool_base.as_u64();
    let fits = |base: u64| {
        regions
            .iter()
            .filter(usable)
            .any(|region| region.start <= base && base + POOL_SIZE <= region.end)
    };
    if fits(preferred) {
        return Some(preferred);
    }
    regions.iter().filter(usable).find_map(|region| {
        let base = align_up(region.start.max(LOW_MEMORY_END), PROGRAM_REGION_SIZE);
        (base + POOL_SIZE <= region.end).then_some(base)
    })
}

pub fn init(boot_info: &'static BootInfo) -> Result<MemoryLayout, &'static str> {
    let physical_offset = boot_info
        .physical_memory_offset
        .into_option()
        .ok_or("bootloader did not map physical memory")?;

    let regions: &'static [MemoryRegion] = &boot_info.memory_regions;
    let pool_base = choose_pool(regions).ok_or("no room for the process pool")?;
    println!(
        "memory: process pool {:#x}..{:#x}, physical memory at {:#x}",
        pool_base,
        pool_base + POOL_SIZE,
        physical_offset
    );

    Ok(MemoryLayout {
        physical_offset: VirtAddr::new(physical_offset),
        pool_base: PhysAddr::new(pool_base),
        frames: BootFrameAllocator::new(regions, pool_base..pool_base + POOL_SIZE),
    })
}

/// # Safety
///
/// `physical_offset` must be where the bootloader mapped all of physical
/// memory, and only one mapper may exist at a time.
pub unsafe fn active_page_table(physical_offset: VirtAddr) -> OffsetPageTable<'static> {
    let (level_4_frame, _) = x86_64::registers::control::Cr3::read();
    let virt = physical_offset + level_4_frame.start_address().as_u64();
    let page_table_ptr: *mut PageTable = virt.as_mut_ptr();

    OffsetPageTable::new(&mut *page_table_ptr, physical_offset)
}
