use x86_64::VirtAddr;

use crate::config::{KernelConfig, DISPLAY_VIRT_BASES, MAX_PROCESSES, MAX_TERMINALS};
use crate::hal::Mmu;
use crate::process::{Pid, TerminalId};

use super::{DisplayMapping, MappingError, ProgramMapping};

/// Tracks what is installed in the user half of the page table.
///
/// Display pages are reference counted per pid: a page stays mapped while
/// any process on that terminal still holds a `vidmap` result.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    config: KernelConfig,
    installed: Option<Pid>,
    display_holders: [u8; MAX_TERMINALS],
}

impl AddressSpace {
    pub const fn new(config: KernelConfig) -> Self {
        Self {
            config,
            installed: None,
            display_holders: [0; MAX_TERMINALS],
        }
    }

    /// Pid whose program region is currently visible at the program base.
    pub fn installed(&self) -> Option<Pid> {
        self.installed
    }

    pub fn program_mapping(&self, pid: Pid) -> Result<ProgramMapping, MappingError> {
        if pid >= MAX_PROCESSES {
            return Err(MappingError::InvalidPid(pid));
        }
        ProgramMapping::new(self.config.process_frame(pid))
    }

    /// Point the program region at `pid`'s physical memory. Returns once
    /// the platform has flushed the old translation.
    pub fn map_process_image<M: Mmu + ?Sized>(
        &mut self,
        pid: Pid,
        mmu: &M,
    ) -> Result<VirtAddr, MappingError> {
        let mapping = self.program_mapping(pid).inspect_err(|err| {
            println!("paging: refusing program mapping for pid {}: {:?}", pid, err);
        })?;
        mmu.install_program(&mapping)?;
        self.installed = Some(pid);
        Ok(mapping.virtual_base())
    }

    pub fn display_address(terminal: TerminalId) -> Result<VirtAddr, MappingError> {
        DISPLAY_VIRT_BASES
            .get(terminal)
            .map(|&addr| VirtAddr::new(addr))
            .ok_or(MappingError::InvalidTerminal(terminal))
    }

    /// Map `terminal`'s display page on behalf of `pid`.
    pub fn map_display<M: Mmu + ?Sized>(
        &mut self,
        terminal: TerminalId,
        pid: Pid,
        mmu: &M,
    ) -> Result<VirtAddr, MappingError> {
        let virtual_addr = Self::display_address(terminal)?;
        if pid >= MAX_PROCESSES {
            return Err(MappingError::InvalidPid(pid));
        }
        if self.display_holders[terminal] == 0 {
            let mapping = DisplayMapping::new(virtual_addr, self.config.display_frames[terminal])?;
            mmu.install_display(&mapping)?;
        }
        self.display_holders[terminal] |= 1 << pid;
        Ok(virtual_addr)
    }

    /// Drop the page unconditionally.
    pub fn unmap_display<M: Mmu + ?Sized>(
        &mut self,
        terminal: TerminalId,
        mmu: &M,
    ) -> Result<(), MappingError> {
        let virtual_addr = Self::display_address(terminal)?;
        if self.display_holders[terminal] == 0 {
            return Err(MappingError::NotMapped(virtual_addr));
        }
        self.display_holders[terminal] = 0;
        mmu.remove_display(DisplayMapping::page_of(virtual_addr)?)
    }

    /// Forget every display page held by `pid`, unmapping those nobody else
    /// holds.
    pub fn release_process<M: Mmu + ?Sized>(
        &mut self,
        pid: Pid,
        mmu: &M,
    ) -> Result<(), MappingError> {
        if pid >= MAX_PROCESSES {
            return Err(MappingError::InvalidPid(pid));
        }
        for terminal in 0..MAX_TERMINALS {
            let holders = self.display_holders[terminal];
            if holders & (1 << pid) == 0 {
                continue;
            }
            if holders == 1 << pid {
                self.unmap_display(terminal, mmu)?;
            } else {
                self.display_holders[terminal] = holders & !(1 << pid);
            }
        }
        if self.installed == Some(pid) {
            self.installed = None;
        }
        Ok(())
    }

    pub fn is_display_mapped(&self, terminal: TerminalId) -> bool {
        self.display_holders.get(terminal).is_some_and(|&holders| holders != 0)
    }
}
