//! # Memory System Call Handlers
//!
//! `vidmap` is the only memory call: it exposes the caller's terminal
//! text page to user space.

use x86_64::VirtAddr;

use crate::devices::{Console, FileSystem};
use crate::hal::Machine;
use crate::kernel::Kernel;
use crate::memory::is_user_range;
use crate::syscalls::dispatcher::SyscallError;

/// Map the caller's display page and return its user address. The caller
/// stores it through `out`, which must be a slot in the program region.
pub fn sys_vidmap<M: Machine, F: FileSystem, C: Console>(
    kernel: &Kernel<M, F, C>,
    out: usize,
) -> Result<VirtAddr, SyscallError> {
    let slot_len = core::mem::size_of::<u64>() as u64;
    if out == 0 || !is_user_range(out as u64, slot_len) {
        return Err(SyscallError::InvalidArgument);
    }
    kernel.with_state(|state| state.vidmap(kernel.machine()))
}
