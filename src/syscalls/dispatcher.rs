use crate::config::{COMMAND_MAX, DISPLAY_PAGE_SIZE, DISPLAY_VIRT_BASES};
use crate::devices::rtc::RtcError;
use crate::devices::{Console, FileSystem};
use crate::hal::Machine;
use crate::kernel::Kernel;
use crate::memory::{is_user_range, MappingError};
use crate::process::ProcessError;
use crate::syscalls::handlers;
use crate::syscalls::numbers::SyscallNumber;

/// System call result type
pub type SyscallResult = Result<usize, SyscallError>;

/// System call errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall,
    InvalidArgument,
    BadFileDescriptor,
    NotFound,
    NotExecutable,
    ProcessTableFull,
    TooManyOpenFiles,
    ImageTooLarge,
    ShortWrite,
    NoCurrentProcess,
    NotSupported,
    Mapping(MappingError),
}

/// Coarse classification reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    ResourceExhausted,
    NotFound,
    NotExecutable,
    Unsupported,
    Internal,
}

impl SyscallError {
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::InvalidArgument | Self::BadFileDescriptor | Self::ShortWrite => {
                ErrorKind::InvalidArgument
            }
            Self::ProcessTableFull | Self::TooManyOpenFiles | Self::ImageTooLarge => {
                ErrorKind::ResourceExhausted
            }
            Self::NotFound => ErrorKind::NotFound,
            Self::NotExecutable => ErrorKind::NotExecutable,
            Self::InvalidSyscall | Self::NotSupported => ErrorKind::Unsupported,
            Self::NoCurrentProcess | Self::Mapping(_) => ErrorKind::Internal,
        }
    }

    /// User programs only ever see `-1`.
    pub fn as_errno(self) -> isize {
        -1
    }
}

impl From<ProcessError> for SyscallError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::NoFreeSlot => Self::ProcessTableFull,
            ProcessError::TooManyOpenFiles => Self::TooManyOpenFiles,
            ProcessError::BadDescriptor(_) | ProcessError::InactiveDescriptor(_) => {
                Self::BadFileDescriptor
            }
            ProcessError::NotRunning(_) => Self::NoCurrentProcess,
            ProcessError::InvalidPid(_)
            | ProcessError::InvalidTerminal(_)
            | ProcessError::AlreadyRunning(_) => Self::InvalidArgument,
        }
    }
}

impl From<MappingError> for SyscallError {
    fn from(err: MappingError) -> Self {
        Self::Mapping(err)
    }
}

impl From<RtcError> for SyscallError {
    fn from(_: RtcError) -> Self {
        Self::InvalidArgument
    }
}

/// System call context - the registers saved by the `int 0x80` stub
#[derive(Debug, Clone, Copy)]
pub struct SyscallContext {
    pub syscall_num: usize,
    pub arg0: usize,
    pub arg1: usize,
    pub arg2: usize,
}

impl SyscallContext {
    /// `int 0x80` convention:
    ///   rax = syscall number
    ///   rdi = arg0
    ///   rsi = arg1
    ///   rdx = arg2
    pub fn from_registers(rax: usize, rdi: usize, rsi: usize, rdx: usize) -> Self {
        Self {
            syscall_num: rax,
            arg0: rdi,
            arg1: rsi,
            arg2: rdx,
        }
    }
}

/// Value placed in `rax` on return to user space.
pub fn return_value(result: SyscallResult) -> usize {
    match result {
        Ok(value) => value,
        Err(err) => err.as_errno() as usize,
    }
}

/// Main syscall dispatcher
pub fn dispatch_syscall<M: Machine, F: FileSystem, C: Console>(
    kernel: &Kernel<M, F, C>,
    ctx: SyscallContext,
) -> SyscallResult {
    let syscall = SyscallNumber::from(ctx.syscall_num);

    #[cfg(debug_assertions)]
    println!(
        "SYSCALL: {:?}({:#x}, {:#x}, {:#x})",
        syscall, ctx.arg0, ctx.arg1, ctx.arg2
    );

    match syscall {
        SyscallNumber::Halt => handlers::process::sys_halt(kernel, ctx.arg0 as u8),
        SyscallNumber::Execute => {
            let command = unsafe { user_command(ctx.arg0)? };
            handlers::process::sys_execute(kernel, command)
        }
        SyscallNumber::Read => {
            let buf = unsafe { user_buffer_mut(ctx.arg1, ctx.arg2)? };
            handlers::io::sys_read(kernel, ctx.arg0 as i32, buf)
        }
        SyscallNumber::Write => {
            let buf = unsafe { user_buffer(ctx.arg1, ctx.arg2)? };
            handlers::io::sys_write(kernel, ctx.arg0 as i32, buf)
        }
        SyscallNumber::Open => {
            let name = unsafe { user_command(ctx.arg0)? };
            handlers::io::sys_open(kernel, name)
        }
        SyscallNumber::Close => handlers::io::sys_close(kernel, ctx.arg0 as i32),
        SyscallNumber::GetArgs => {
            let buf = unsafe { user_buffer_mut(ctx.arg0, ctx.arg1)? };
            handlers::process::sys_getargs(kernel, buf)
        }
        SyscallNumber::Vidmap => {
            let screen = handlers::memory::sys_vidmap(kernel, ctx.arg0)?;
            // sys_vidmap only accepts slots inside the caller's program region.
            unsafe { (ctx.arg0 as *mut u64).write_unaligned(screen.as_u64()) };
            Ok(0)
        }
        SyscallNumber::SetHandler => handlers::signal::sys_set_handler(ctx.arg0 as i32, ctx.arg1),
        SyscallNumber::SigReturn => handlers::signal::sys_sigreturn(),
        SyscallNumber::Unknown => Err(SyscallError::InvalidSyscall),
    }
}

/// Whether user code may legitimately hand the kernel `[addr, addr + len)`.
pub fn is_user_buffer(addr: usize, len: usize) -> bool {
    let (addr, len) = (addr as u64, len as u64);
    if is_user_range(addr, len) {
        return true;
    }
    DISPLAY_VIRT_BASES.iter().any(|&base| {
        addr >= base && addr.checked_add(len).is_some_and(|end| end <= base + DISPLAY_PAGE_SIZE)
    })
}

fn checked_count(ptr: usize, count: usize) -> Result<usize, SyscallError> {
    // Counts are 32-bit signed in the user ABI.
    let count = usize::try_from(count as i32).map_err(|_| SyscallError::InvalidArgument)?;
    if ptr == 0 || !is_user_buffer(ptr, count) {
        return Err(SyscallError::InvalidArgument);
    }
    Ok(count)
}

unsafe fn user_buffer<'a>(ptr: usize, count: usize) -> Result<&'a [u8], SyscallError> {
    let count = checked_count(ptr, count)?;
    Ok(core::slice::from_raw_parts(ptr as *const u8, count))
}

unsafe fn user_buffer_mut<'a>(ptr: usize, count: usize) -> Result<&'a mut [u8], SyscallError> {
    let count = checked_count(ptr, count)?;
    Ok(core::slice::from_raw_parts_mut(ptr as *mut u8, count))
}

/// NUL-terminated string of at most `COMMAND_MAX` bytes, clipped to the
/// program region.
unsafe fn user_command<'a>(ptr: usize) -> Result<&'a [u8], SyscallError> {
    if ptr == 0 || !is_user_buffer(ptr, 1) {
        return Err(SyscallError::InvalidArgument);
    }
    let mut len = 0;
    while len < COMMAND_MAX && is_user_buffer(ptr, len + 1) {
        if *(ptr as *const u8).add(len) == 0 {
            break;
        }
        len += 1;
    }
    Ok(core::slice::from_raw_parts(ptr as *const u8, len))
}
