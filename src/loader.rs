//! # Program Loader
//!
//! Splits an `execute` command line, checks the executable header and
//! copies the image into the program region.
//!
//! ## Header
//!
//! | Offset | Size  | Meaning                                   |
//! |--------|-------|-------------------------------------------|
//! | 0      | 4     | `0x7F 'E' 'L' 'F'`                        |
//! | 4      | 1     | class: 2 = 64-bit entry, otherwise 32-bit |
//! | 24     | 4 / 8 | entry point (virtual)                     |
//!
//! The whole file is copied to `PROGRAM_IMAGE_BASE`; the entry point must
//! fall inside the copied bytes.

use x86_64::VirtAddr;

use crate::config::{
    ENTRY_POINT_OFFSET, EXECUTABLE_MAGIC, FILE_NAME_LEN, PROGRAM_IMAGE_BASE, PROGRAM_IMAGE_OFFSET,
    PROGRAM_REGION_SIZE,
};
use crate::devices::{DeviceKind, DirEntry, FileSystem};
use crate::hal::Mmu;
use crate::syscalls::SyscallError;

const CLASS_OFFSET: usize = 4;
const CLASS_64: u8 = 2;
const HEADER_LEN: usize = ENTRY_POINT_OFFSET as usize + 8;
/// Room left below the user stack.
const STACK_RESERVE: u64 = 64 * 1024;
pub const MAX_IMAGE_SIZE: u64 = PROGRAM_REGION_SIZE - PROGRAM_IMAGE_OFFSET - STACK_RESERVE;

/// A command line split into program name and argument string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    pub program: &'a [u8],
    pub args: &'a [u8],
}

impl<'a> Command<'a> {
    /// `name [args]`; stops at the first NUL or newline.
    pub fn parse(raw: &'a [u8]) -> Result<Self, SyscallError> {
        let end = raw
            .iter()
            .position(|&byte| byte == 0 || byte == b'\n')
            .unwrap_or(raw.len());
        let line = trim_spaces(&raw[..end]);

        let split = line.iter().position(|&byte| byte == b' ').unwrap_or(line.len());
        let program = &line[..split];
        if program.is_empty() {
            return Err(SyscallError::InvalidArgument);
        }
        if program.len() > FILE_NAME_LEN {
            return Err(SyscallError::NotFound);
        }

        Ok(Self {
            program,
            args: trim_spaces(&line[split..]),
        })
    }
}

/// The file name a caller passed to `open`: everything before the first
/// NUL, matched byte for byte against the directory.
pub fn file_name(raw: &[u8]) -> Result<&[u8], SyscallError> {
    let end = raw.iter().position(|&byte| byte == 0).unwrap_or(raw.len());
    match &raw[..end] {
        [] => Err(SyscallError::InvalidArgument),
        name if name.len() > FILE_NAME_LEN => Err(SyscallError::NotFound),
        name => Ok(name),
    }
}

fn trim_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&byte| byte != b' ').unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&byte| byte != b' ').map_or(start, |last| last + 1);
    &bytes[start..end]
}

/// A validated program file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executable {
    pub inode: u32,
    pub length: u32,
    pub entry: VirtAddr,
}

impl Executable {
    pub fn inspect<F: FileSystem + ?Sized>(
        fs: &F,
        dentry: &DirEntry,
    ) -> Result<Self, SyscallError> {
        if dentry.kind() != Some(DeviceKind::File) {
            return Err(SyscallError::NotExecutable);
        }
        let length = fs.file_len(dentry.inode).ok_or(SyscallError::NotFound)?;

        let mut header = [0u8; HEADER_LEN];
        let read = fs.read_bytes(dentry.inode, 0, &mut header);
        if read < EXECUTABLE_MAGIC.len() || header[..EXECUTABLE_MAGIC.len()] != EXECUTABLE_MAGIC {
            return Err(SyscallError::NotExecutable);
        }
        if u64::from(length) > MAX_IMAGE_SIZE {
            return Err(SyscallError::ImageTooLarge);
        }

        let at = ENTRY_POINT_OFFSET as usize;
        let entry = if header[CLASS_OFFSET] == CLASS_64 {
            if read < at + 8 {
                return Err(SyscallError::NotExecutable);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&header[at..at + 8]);
            u64::from_le_bytes(raw)
        } else {
            if read < at + 4 {
                return Err(SyscallError::NotExecutable);
            }
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&header[at..at + 4]);
            u64::from(u32::from_le_bytes(raw))
        };

        let image_end = PROGRAM_IMAGE_BASE + u64::from(length);
        if !(PROGRAM_IMAGE_BASE..image_end).contains(&entry) {
            return Err(SyscallError::NotExecutable);
        }

        Ok(Self {
            inode: dentry.inode,
            length,
            entry: VirtAddr::new(entry),
        })
    }

    /// Copy the file into the installed program region.
    pub fn load<F, M>(&self, fs: &F, mmu: &M) -> Result<(), SyscallError>
    where
        F: FileSystem + ?Sized,
        M: Mmu + ?Sized,
    {
        let start = PROGRAM_IMAGE_OFFSET as usize;
        let end = start + self.length as usize;
        // The caller installed this pid's mapping and holds the state lock.
        let region = unsafe { mmu.program_region() };
        let target = region.get_mut(start..end).ok_or(SyscallError::ImageTooLarge)?;
        let copied = fs.read_bytes(self.inode, 0, target);
        if copied != self.length as usize {
            return Err(SyscallError::NotExecutable);
        }
        Ok(())
    }
}
