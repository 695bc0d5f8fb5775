//! Device Subsystem
//!
//! Every open descriptor is tagged with a [`DeviceKind`]; the four
//! operations dispatch on the tag, so a closed or reused slot can never
//! call into a stale driver.
//!
//! | Kind        | open              | read               | write            |
//! |-------------|-------------------|--------------------|------------------|
//! | `Console`   | -                 | one input line     | text to terminal |
//! | `Clock`     | reset to 2 Hz     | wait one period    | set rate         |
//! | `Directory` | -                 | next entry name    | read-only        |
//! | `File`      | -                 | bytes at cursor    | read-only        |
//!
//! Submodules:
//! - `console`: per-terminal line buffers fed by the keyboard
//! - `display`: text pages drawn with `embedded-graphics`
//! - `drivers`: PS/2 scancode decoding
//! - `fs`: the read-only ramdisk image
//! - `rtc`: virtualised real-time clock

pub mod console;
pub mod display;
pub mod drivers;
pub mod fs;
pub mod rtc;

pub use console::{LineBuffer, LineBuffers, LineEdit};
pub use fs::{DirEntry, FsImage};
pub use rtc::VirtualRtc;

use crate::config::FILE_NAME_LEN;
use crate::hal::TickSource;
use crate::process::TerminalId;
use crate::syscalls::SyscallError;

use fs::{FILE_TYPE_CLOCK, FILE_TYPE_DIRECTORY, FILE_TYPE_REGULAR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Console,
    Clock,
    Directory,
    File,
}

/// Name lookup and byte-range reads over the boot file system.
pub trait FileSystem {
    fn resolve(&self, name: &[u8]) -> Option<DirEntry>;
    fn entry_at(&self, index: usize) -> Option<DirEntry>;
    fn file_len(&self, inode: u32) -> Option<u32>;
    /// Copy from `offset` into `buf`; returns the bytes copied, 0 at EOF.
    fn read_bytes(&self, inode: u32, offset: u32, buf: &mut [u8]) -> usize;
}

/// Per-terminal text input and output.
pub trait Console {
    /// Blocks until a full line is buffered for `terminal`.
    fn read_line(&self, terminal: TerminalId, buf: &mut [u8]) -> usize;
    fn write(&self, terminal: TerminalId, bytes: &[u8]) -> usize;
}

/// Collaborators a driver operation may touch.
pub struct DeviceIo<'a> {
    pub fs: &'a dyn FileSystem,
    pub console: &'a dyn Console,
    pub rtc: &'a VirtualRtc,
    pub clock: &'a dyn TickSource,
}

/// Descriptor state handed to a driver for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCursor {
    pub terminal: TerminalId,
    pub inode: u32,
    pub position: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub count: usize,
    /// Cursor to store back into the descriptor.
    pub position: u32,
}

impl DeviceKind {
    pub fn from_file_type(file_type: u32) -> Option<Self> {
        match file_type {
            FILE_TYPE_CLOCK => Some(Self::Clock),
            FILE_TYPE_DIRECTORY => Some(Self::Directory),
            FILE_TYPE_REGULAR => Some(Self::File),
            _ => None,
        }
    }

    pub fn open(self, io: &DeviceIo<'_>, terminal: TerminalId) -> Result<(), SyscallError> {
        match self {
            Self::Clock => Ok(io.rtc.open(terminal)?),
            Self::Console | Self::Directory | Self::File => Ok(()),
        }
    }

    pub fn read(
        self,
        io: &DeviceIo<'_>,
        cursor: FileCursor,
        buf: &mut [u8],
    ) -> Result<Transfer, SyscallError> {
        let count = match self {
            Self::Console => io.console.read_line(cursor.terminal, buf),
            Self::Clock => {
                io.rtc.wait(cursor.terminal, io.clock)?;
                0
            }
            Self::Directory => {
                let Some(entry) = io.fs.entry_at(cursor.position as usize) else {
                    return Ok(Transfer {
                        count: 0,
                        position: cursor.position,
                    });
                };
                let name = entry.name();
                let count = name.len().min(buf.len());
                buf[..count].copy_from_slice(&name[..count]);
                let window = buf.len().min(FILE_NAME_LEN);
                buf[count..window].fill(0);
                return Ok(Transfer {
                    count,
                    position: cursor.position + 1,
                });
            }
            Self::File => io.fs.read_bytes(cursor.inode, cursor.position, buf),
        };

        let position = match self {
            Self::File => cursor.position.saturating_add(count as u32),
            _ => cursor.position,
        };
        Ok(Transfer { count, position })
    }

    pub fn write(
        self,
        io: &DeviceIo<'_>,
        cursor: FileCursor,
        buf: &[u8],
    ) -> Result<usize, SyscallError> {
        match self {
            Self::Console => Ok(io.console.write(cursor.terminal, buf)),
            Self::Clock => {
                let raw: [u8; 4] = buf.try_into().map_err(|_| SyscallError::InvalidArgument)?;
                io.rtc.set_frequency(cursor.terminal, i32::from_le_bytes(raw))?;
                Ok(raw.len())
            }
            Self::Directory | Self::File => Err(SyscallError::NotSupported),
        }
    }

    pub fn close(self, _io: &DeviceIo<'_>, _terminal: TerminalId) -> Result<(), SyscallError> {
        Ok(())
    }
}
