//! # System Calls
//!
//! User programs enter the kernel with `int 0x80`. The platform stub saves
//! the registers, builds a [`SyscallContext`] and calls
//! [`dispatch_syscall`]; the value from [`return_value`] goes back in `rax`.
//!
//! - `numbers`: call numbers of the user ABI
//! - `dispatcher`: argument validation and routing
//! - `handlers`: one function per call

pub mod dispatcher;
pub mod handlers;
pub mod numbers;

pub use dispatcher::{
    dispatch_syscall, is_user_buffer, return_value, ErrorKind, SyscallContext, SyscallError,
    SyscallResult,
};
pub use numbers::SyscallNumber;
