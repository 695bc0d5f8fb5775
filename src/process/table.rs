use crate::config::{FIRST_USER_FD, MAX_FILES, MAX_PROCESSES, MAX_TERMINALS};
use crate::devices::DeviceKind;

use super::pcb::{FileDescriptor, Pcb, SavedContext};
use super::{Pid, ProcessError, TerminalId};

/// Fixed pool of process control blocks, indexed by pid.
///
/// A slot is free while its descriptor 0 is inactive. `init` and `free`
/// are the only transitions and each rewrites the whole slot, so a lookup
/// never observes a half-built PCB or a descriptor left over from the
/// previous owner.
pub struct ProcessTable {
    slots: [Pcb; MAX_PROCESSES],
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            slots: [Pcb::EMPTY; MAX_PROCESSES],
        }
    }

    /// Lowest free pid. The slot stays free until `init`.
    pub fn allocate(&self) -> Result<Pid, ProcessError> {
        self.slots
            .iter()
            .position(|pcb| !pcb.is_running())
            .ok_or(ProcessError::NoFreeSlot)
    }

    pub fn init(
        &mut self,
        pid: Pid,
        terminal: TerminalId,
        parent: Option<Pid>,
    ) -> Result<(), ProcessError> {
        if terminal >= MAX_TERMINALS {
            return Err(ProcessError::InvalidTerminal(terminal));
        }
        let slot = self.slots.get_mut(pid).ok_or(ProcessError::InvalidPid(pid))?;
        if slot.is_running() {
            return Err(ProcessError::AlreadyRunning(pid));
        }

        let mut pcb = Pcb::EMPTY;
        pcb.parent = parent;
        pcb.terminal = terminal;
        pcb.files[0] = FileDescriptor::open(DeviceKind::Console, 0);
        pcb.files[1] = FileDescriptor::open(DeviceKind::Console, 0);
        *slot = pcb;
        Ok(())
    }

    pub fn free(&mut self, pid: Pid) -> Result<(), ProcessError> {
        let slot = self.slots.get_mut(pid).ok_or(ProcessError::InvalidPid(pid))?;
        *slot = Pcb::EMPTY;
        Ok(())
    }

    pub fn get(&self, pid: Pid) -> Result<&Pcb, ProcessError> {
        let pcb = self.slots.get(pid).ok_or(ProcessError::InvalidPid(pid))?;
        if !pcb.is_running() {
            return Err(ProcessError::NotRunning(pid));
        }
        Ok(pcb)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Result<&mut Pcb, ProcessError> {
        let pcb = self.slots.get_mut(pid).ok_or(ProcessError::InvalidPid(pid))?;
        if !pcb.is_running() {
            return Err(ProcessError::NotRunning(pid));
        }
        Ok(pcb)
    }

    pub fn is_running(&self, pid: Pid) -> bool {
        self.slots.get(pid).is_some_and(Pcb::is_running)
    }

    pub fn running(&self) -> impl Iterator<Item = (Pid, &Pcb)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, pcb)| pcb.is_running())
    }

    pub fn running_count(&self) -> usize {
        self.running().count()
    }

    pub fn descriptor_active(&self, pid: Pid, fd: i32) -> Result<bool, ProcessError> {
        let index = descriptor_index(fd)?;
        Ok(self.get(pid)?.files[index].active)
    }

    /// Active descriptor `fd` of `pid`.
    pub fn descriptor(&self, pid: Pid, fd: i32) -> Result<&FileDescriptor, ProcessError> {
        let index = descriptor_index(fd)?;
        let file = &self.get(pid)?.files[index];
        if !file.active {
            return Err(ProcessError::InactiveDescriptor(fd));
        }
        Ok(file)
    }

    pub fn descriptor_mut(
        &mut self,
        pid: Pid,
        fd: i32,
    ) -> Result<&mut FileDescriptor, ProcessError> {
        let index = descriptor_index(fd)?;
        let file = &mut self.get_mut(pid)?.files[index];
        if !file.active {
            return Err(ProcessError::InactiveDescriptor(fd));
        }
        Ok(file)
    }

    /// Lowest inactive descriptor at or above `FIRST_USER_FD`.
    pub fn free_descriptor(&self, pid: Pid) -> Result<usize, ProcessError> {
        self.get(pid)?
            .files
            .iter()
            .enumerate()
            .skip(FIRST_USER_FD)
            .find(|(_, file)| !file.active)
            .map(|(fd, _)| fd)
            .ok_or(ProcessError::TooManyOpenFiles)
    }

    pub fn context_mut(&mut self, pid: Pid) -> Result<&mut SavedContext, ProcessError> {
        Ok(&mut self.get_mut(pid)?.context)
    }

    pub fn parent_context_mut(&mut self, pid: Pid) -> Result<&mut SavedContext, ProcessError> {
        Ok(&mut self.get_mut(pid)?.parent_context)
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

fn descriptor_index(fd: i32) -> Result<usize, ProcessError> {
    usize::try_from(fd)
        .ok()
        .filter(|&index| index < MAX_FILES)
        .ok_or(ProcessError::BadDescriptor(fd))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(count: usize) -> ProcessTable {
        let mut table = ProcessTable::new();
        for _ in 0..count {
            let pid = table.allocate().unwrap();
            table.init(pid, 0, None).unwrap();
        }
        table
    }

    #[test]
    fn test_allocate_lowest_free() {
        let mut table = table_with(3);
        assert_eq!(table.allocate(), Ok(3));
        table.free(1).unwrap();
        assert_eq!(table.allocate(), Ok(1));
    }

    #[test]
    fn test_allocate_does_not_claim() {
        let table = ProcessTable::new();
        assert_eq!(table.allocate(), Ok(0));
        assert_eq!(table.allocate(), Ok(0));
    }

    #[test]
    fn test_table_full() {
        let table = table_with(MAX_PROCESSES);
        assert_eq!(table.allocate(), Err(ProcessError::NoFreeSlot));
        assert_eq!(table.running_count(), MAX_PROCESSES);
    }

    #[test]
    fn test_init_binds_console() {
        let mut table = ProcessTable::new();
        table.init(2, 1, Some(0)).unwrap();
        let pcb = table.get(2).unwrap();
        assert_eq!(pcb.terminal, 1);
        assert_eq!(pcb.parent, Some(0));
        assert_eq!(pcb.files[0].device, Some(DeviceKind::Console));
        assert_eq!(pcb.files[1].device, Some(DeviceKind::Console));
        assert!(pcb.files[2..].iter().all(|file| *file == FileDescriptor::CLOSED));
    }

    #[test]
    fn test_init_rejects_running_slot() {
        let mut table = table_with(1);
        assert_eq!(table.init(0, 0, None), Err(ProcessError::AlreadyRunning(0)));
        assert_eq!(table.init(1, 3, None), Err(ProcessError::InvalidTerminal(3)));
        assert_eq!(table.init(6, 0, None), Err(ProcessError::InvalidPid(6)));
    }

    #[test]
    fn test_free_clears_everything() {
        let mut table = table_with(1);
        {
            let pcb = table.get_mut(0).unwrap();
            pcb.files[4] = FileDescriptor::open(DeviceKind::File, 9);
            pcb.files[4].position = 120;
            pcb.set_args(b"frame0.txt");
            pcb.context.stack_pointer = 0x7F_F000;
        }
        table.free(0).unwrap();
        assert_eq!(table.get(0).err(), Some(ProcessError::NotRunning(0)));

        table.init(0, 2, None).unwrap();
        let pcb = table.get(0).unwrap();
        assert_eq!(pcb.files[4], FileDescriptor::CLOSED);
        assert!(pcb.args().is_empty());
        assert!(pcb.context.is_empty());
    }

    #[test]
    fn test_descriptor_bounds() {
        let table = table_with(1);
        assert_eq!(table.descriptor_active(0, 0), Ok(true));
        assert_eq!(table.descriptor_active(0, 7), Ok(false));
        assert_eq!(table.descriptor_active(0, 8), Err(ProcessError::BadDescriptor(8)));
        assert_eq!(table.descriptor_active(0, -1), Err(ProcessError::BadDescriptor(-1)));
        assert_eq!(
            table.descriptor(0, 3).err(),
            Some(ProcessError::InactiveDescriptor(3))
        );
    }

    #[test]
    fn test_free_descriptor_exhaustion() {
        let mut table = table_with(1);
        assert_eq!(table.free_descriptor(0), Ok(2));
        for fd in 2..MAX_FILES {
            table.get_mut(0).unwrap().files[fd] = FileDescriptor::open(DeviceKind::File, 1);
        }
        assert_eq!(table.free_descriptor(0), Err(ProcessError::TooManyOpenFiles));
        table.get_mut(0).unwrap().files[5].reset();
        assert_eq!(table.free_descriptor(0), Ok(5));
    }
}
