use crate::syscalls::dispatcher::{SyscallError, SyscallResult};

/// Signals are not delivered; the call exists so user programs link.
pub fn sys_set_handler(signum: i32, handler: usize) -> SyscallResult {
    println!("signal: set_handler({}, {:#x}) unsupported", signum, handler);
    Err(SyscallError::NotSupported)
}

pub fn sys_sigreturn() -> SyscallResult {
    Err(SyscallError::NotSupported)
}
