//! Page-granular mapping descriptors.
//!
//! A [`ProgramMapping`] covers the 4 MiB program region with two 2 MiB
//! pages; a [`DisplayMapping`] is a single 4 KiB page. Both are built only
//! from validated frames, so the platform never sees a null or misaligned
//! physical address.

use x86_64::structures::paging::{Page, PageTableFlags, PhysFrame, Size2MiB, Size4KiB};
use x86_64::{PhysAddr, VirtAddr};

use crate::config::{DISPLAY_PAGE_SIZE, PROGRAM_REGION_SIZE, PROGRAM_VIRT_BASE};

use super::MappingError;

const HUGE_PAGE_SIZE: u64 = 2 * 1024 * 1024;
pub const PROGRAM_PAGES: usize = (PROGRAM_REGION_SIZE / HUGE_PAGE_SIZE) as usize;

pub fn user_flags() -> PageTableFlags {
    PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramMapping {
    pub physical_base: PhysAddr,
    pub pages: [(Page<Size2MiB>, PhysFrame<Size2MiB>); PROGRAM_PAGES],
    pub flags: PageTableFlags,
}

impl ProgramMapping {
    pub fn new(physical_base: PhysAddr) -> Result<Self, MappingError> {
        if physical_base.as_u64() == 0 {
            return Err(MappingError::NullFrame);
        }
        if physical_base.as_u64() % PROGRAM_REGION_SIZE != 0 {
            return Err(MappingError::Misaligned(physical_base));
        }

        let mut pages = [(
            Page::containing_address(VirtAddr::new(PROGRAM_VIRT_BASE)),
            PhysFrame::containing_address(physical_base),
        ); PROGRAM_PAGES];
        for (index, entry) in pages.iter_mut().enumerate() {
            let offset = HUGE_PAGE_SIZE * index as u64;
            let page = Page::from_start_address(VirtAddr::new(PROGRAM_VIRT_BASE + offset))
                .map_err(|_| MappingError::Platform("program base not huge-page aligned"))?;
            let frame = PhysFrame::from_start_address(physical_base + offset)
                .map_err(|_| MappingError::Misaligned(physical_base + offset))?;
            *entry = (page, frame);
        }

        Ok(Self {
            physical_base,
            pages,
            flags: user_flags(),
        })
    }

    pub fn virtual_base(&self) -> VirtAddr {
        VirtAddr::new(PROGRAM_VIRT_BASE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMapping {
    pub page: Page<Size4KiB>,
    pub frame: PhysFrame<Size4KiB>,
    pub flags: PageTableFlags,
}

impl DisplayMapping {
    pub fn new(virtual_addr: VirtAddr, frame: PhysAddr) -> Result<Self, MappingError> {
        if frame.as_u64() == 0 {
            return Err(MappingError::NullFrame);
        }
        if frame.as_u64() % DISPLAY_PAGE_SIZE != 0 {
            return Err(MappingError::Misaligned(frame));
        }
        let page = Self::page_of(virtual_addr)?;
        let frame =
            PhysFrame::from_start_address(frame).map_err(|_| MappingError::Misaligned(frame))?;
        Ok(Self {
            page,
            frame,
            flags: user_flags(),
        })
    }

    pub fn page_of(virtual_addr: VirtAddr) -> Result<Page<Size4KiB>, MappingError> {
        Page::from_start_address(virtual_addr)
            .map_err(|_| MappingError::Platform("display address not page aligned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIB;

    #[test]
    fn test_program_mapping_pages() {
        let mapping = ProgramMapping::new(PhysAddr::new(12 * MIB)).unwrap();
        assert_eq!(mapping.pages[0].0.start_address().as_u64(), 0x0800_0000);
        assert_eq!(mapping.pages[0].1.start_address().as_u64(), 12 * MIB);
        assert_eq!(mapping.pages[1].0.start_address().as_u64(), 0x0820_0000);
        assert_eq!(mapping.pages[1].1.start_address().as_u64(), 14 * MIB);
        assert!(mapping.flags.contains(PageTableFlags::USER_ACCESSIBLE));
    }

    #[test]
    fn test_program_mapping_rejects_bad_frames() {
        assert_eq!(ProgramMapping::new(PhysAddr::new(0)), Err(MappingError::NullFrame));
        assert_eq!(
            ProgramMapping::new(PhysAddr::new(10 * MIB)),
            Err(MappingError::Misaligned(PhysAddr::new(10 * MIB)))
        );
    }

    #[test]
    fn test_display_mapping() {
        let mapping =
            DisplayMapping::new(VirtAddr::new(0xEFFF_E000), PhysAddr::new(0xBA000)).unwrap();
        assert_eq!(mapping.frame.start_address().as_u64(), 0xBA000);
        assert_eq!(
            DisplayMapping::new(VirtAddr::new(0xF000_0000), PhysAddr::new(0xB9004)),
            Err(MappingError::Misaligned(PhysAddr::new(0xB9004)))
        );
    }
}
