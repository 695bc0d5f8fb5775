//! # Process Table
//!
//! Fixed-capacity bookkeeping for resident user tasks.
//!
//! - `pcb`: process control block, descriptor slots, saved contexts
//! - `table`: the six-slot PCB pool
//! - `terminals`: which pid is foreground on each terminal
//!
//! ## Lifecycle
//!
//! ```text
//! allocate ─▶ init ─▶ running ─▶ free
//!    │                              │
//!    └──── lowest pid with fd0 ◀────┘
//!          inactive
//! ```

pub mod pcb;
pub mod table;
pub mod terminals;

pub use pcb::{FileDescriptor, Pcb, SavedContext};
pub use table::ProcessTable;
pub use terminals::TerminalBindings;

pub type Pid = usize;
pub type TerminalId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    NoFreeSlot,
    InvalidPid(Pid),
    InvalidTerminal(TerminalId),
    NotRunning(Pid),
    AlreadyRunning(Pid),
    BadDescriptor(i32),
    InactiveDescriptor(i32),
    TooManyOpenFiles,
}
