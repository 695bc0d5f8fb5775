//! # System Call Handlers
//!
//! Pointer arguments have already been checked and turned into slices by
//! the dispatcher; handlers only see kernel-safe views.
//!
//! ## Modules
//!
//! - `io`: read, write, open, close
//! - `process`: execute, halt, getargs
//! - `memory`: vidmap
//! - `signal`: set_handler, sigreturn (unsupported)

pub mod io;
pub mod memory;
pub mod process;
pub mod signal;
