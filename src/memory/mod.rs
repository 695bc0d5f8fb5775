//! # Address-Space Manager
//!
//! Owns the user-visible part of the single shared page table:
//!
//! - one 4 MiB program region at `PROGRAM_VIRT_BASE`, pointing at the
//!   physical region of whichever process is running
//! - up to three 4 KiB display pages, one per terminal, created by
//!   `vidmap`
//!
//! The page-table walk itself belongs to the platform (`hal::Mmu`); this
//! module decides *what* is mapped and validates every frame before it
//! reaches the hardware.

pub mod address_space;
pub mod paging;

pub use address_space::AddressSpace;
pub use paging::{DisplayMapping, ProgramMapping};

use x86_64::{PhysAddr, VirtAddr};

use crate::config::{PROGRAM_REGION_SIZE, PROGRAM_VIRT_BASE};
use crate::process::{Pid, TerminalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingError {
    NullFrame,
    Misaligned(PhysAddr),
    InvalidTerminal(TerminalId),
    InvalidPid(Pid),
    NotMapped(VirtAddr),
    /// The platform refused the page-table update.
    Platform(&'static str),
}

/// True when `[addr, addr + len)` lies inside the program region.
pub fn is_user_range(addr: u64, len: u64) -> bool {
    let end = PROGRAM_VIRT_BASE + PROGRAM_REGION_SIZE;
    match addr.checked_add(len) {
        Some(last) => addr >= PROGRAM_VIRT_BASE && last <= end,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_range() {
        assert!(is_user_range(PROGRAM_VIRT_BASE, 8));
        assert!(is_user_range(0x083F_FFF8, 8));
        assert!(!is_user_range(0x083F_FFFC, 8));
        assert!(!is_user_range(0x0040_0000, 8));
        assert!(!is_user_range(0, 8));
        assert!(!is_user_range(u64::MAX - 2, 8));
    }
}
