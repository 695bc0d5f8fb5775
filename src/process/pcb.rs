use x86_64::VirtAddr;

use crate::config::{COMMAND_MAX, FILE_NAME_LEN, MAX_FILES};
use crate::devices::DeviceKind;

use super::{Pid, TerminalId};

/// Kernel stack and frame pointer of a suspended task.
///
/// Layout is shared with the context-switch assembly: `stack_pointer` at
/// offset 0, `frame_pointer` at offset 8.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedContext {
    pub stack_pointer: u64,
    pub frame_pointer: u64,
}

impl SavedContext {
    pub const fn empty() -> Self {
        Self {
            stack_pointer: 0,
            frame_pointer: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stack_pointer == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDescriptor {
    pub device: Option<DeviceKind>,
    pub inode: u32,
    pub position: u32,
    pub active: bool,
}

impl FileDescriptor {
    pub const CLOSED: Self = Self {
        device: None,
        inode: 0,
        position: 0,
        active: false,
    };

    pub const fn open(device: DeviceKind, inode: u32) -> Self {
        Self {
            device: Some(device),
            inode,
            position: 0,
            active: true,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::CLOSED;
    }
}

/// Process control block.
#[derive(Debug, Clone)]
pub struct Pcb {
    pub parent: Option<Pid>,
    pub terminal: TerminalId,
    pub files: [FileDescriptor; MAX_FILES],
    /// Where the scheduler last suspended this task.
    pub context: SavedContext,
    /// The parent's kernel context inside its `execute` call; `halt`
    /// resumes it.
    pub parent_context: SavedContext,
    pub entry_point: VirtAddr,
    pub image_base: VirtAddr,
    args: [u8; COMMAND_MAX],
    args_len: usize,
    name: [u8; FILE_NAME_LEN],
    name_len: usize,
}

impl Pcb {
    pub const EMPTY: Self = Self {
        parent: None,
        terminal: 0,
        files: [FileDescriptor::CLOSED; MAX_FILES],
        context: SavedContext::empty(),
        parent_context: SavedContext::empty(),
        entry_point: VirtAddr::zero(),
        image_base: VirtAddr::zero(),
        args: [0; COMMAND_MAX],
        args_len: 0,
        name: [0; FILE_NAME_LEN],
        name_len: 0,
    };

    pub fn is_running(&self) -> bool {
        self.files[0].active
    }

    pub fn args(&self) -> &[u8] {
        &self.args[..self.args_len]
    }

    /// Stores at most `COMMAND_MAX` bytes of `args`.
    pub fn set_args(&mut self, args: &[u8]) {
        let len = args.len().min(COMMAND_MAX);
        self.args[..len].copy_from_slice(&args[..len]);
        self.args_len = len;
    }

    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }

    pub fn set_name(&mut self, name: &[u8]) {
        let len = name.len().min(FILE_NAME_LEN);
        self.name[..len].copy_from_slice(&name[..len]);
        self.name_len = len;
    }
}

impl Default for Pcb {
    fn default() -> Self {
        Self::EMPTY
    }
}
