//! # I/O System Call Handlers
//!
//! ## File Descriptors
//!
//! | FD  | Stream   | Read              | Write             |
//! |-----|----------|-------------------|-------------------|
//! | 0   | stdin    | console line      | -1                |
//! | 1   | stdout   | -1                | console           |
//! | 2-7 | `open`ed | by device kind    | by device kind    |
//!
//! Descriptors are validated under the state lock; the device call itself
//! may block and runs with the lock released.

use crate::devices::{Console, DeviceKind, FileSystem};
use crate::hal::Machine;
use crate::kernel::Kernel;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};

const STDIN: i32 = 0;
const STDOUT: i32 = 1;

/// Read from file descriptor
pub fn sys_read<M: Machine, F: FileSystem, C: Console>(
    kernel: &Kernel<M, F, C>,
    fd: i32,
    buf: &mut [u8],
) -> SyscallResult {
    let request = kernel.with_state(|state| state.io_request(fd))?;
    let device = match fd {
        STDIN => DeviceKind::Console,
        STDOUT => return Err(SyscallError::NotSupported),
        _ => request.device,
    };

    let transfer = device.read(&kernel.io(), request.cursor, buf)?;
    if transfer.position != request.cursor.position {
        kernel.with_state(|state| state.commit_position(&request, transfer.position));
    }
    Ok(transfer.count)
}

/// Write to file descriptor
pub fn sys_write<M: Machine, F: FileSystem, C: Console>(
    kernel: &Kernel<M, F, C>,
    fd: i32,
    buf: &[u8],
) -> SyscallResult {
    let request = kernel.with_state(|state| state.io_request(fd))?;
    let device = match fd {
        STDIN => return Err(SyscallError::NotSupported),
        STDOUT => DeviceKind::Console,
        _ => request.device,
    };

    let written = device.write(&kernel.io(), request.cursor, buf)?;
    if written < buf.len() {
        return Err(SyscallError::ShortWrite);
    }
    Ok(written)
}

/// Open a file
pub fn sys_open<M: Machine, F: FileSystem, C: Console>(
    kernel: &Kernel<M, F, C>,
    name: &[u8],
) -> SyscallResult {
    let io = kernel.io();
    kernel.with_state(|state| state.open(name, &io, kernel.fs()))
}

/// Close a file descriptor
pub fn sys_close<M: Machine, F: FileSystem, C: Console>(
    kernel: &Kernel<M, F, C>,
    fd: i32,
) -> SyscallResult {
    let io = kernel.io();
    kernel.with_state(|state| state.close(fd, &io))?;
    Ok(0)
}
