use crate::devices::{Console, FileSystem};
use crate::hal::Machine;
use crate::kernel::Kernel;
use crate::syscalls::dispatcher::SyscallResult;

/// Terminate the current process. The low byte of `status` becomes the
/// return value of the parent's `execute`.
pub fn sys_halt<M: Machine, F: FileSystem, C: Console>(kernel: &Kernel<M, F, C>, status: u8) -> ! {
    kernel.terminate_current(i32::from(status))
}

/// Run `command` and block until it halts; returns its exit status.
pub fn sys_execute<M: Machine, F: FileSystem, C: Console>(
    kernel: &Kernel<M, F, C>,
    command: &[u8],
) -> SyscallResult {
    let status = kernel.execute(command)?;
    Ok(status as isize as usize)
}

/// Copy the caller's argument string, NUL-terminated, into `buf`.
pub fn sys_getargs<M: Machine, F: FileSystem, C: Console>(
    kernel: &Kernel<M, F, C>,
    buf: &mut [u8],
) -> SyscallResult {
    kernel.with_state(|state| state.getargs(buf))
}
