//! System call numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SyscallNumber {
    // Process Management
    Halt = 1,
    Execute = 2,

    // I/O Operations
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,

    GetArgs = 7,

    // Memory Management
    Vidmap = 8,

    // Signals
    SetHandler = 9,
    SigReturn = 10,

    // Unknown
    Unknown = usize::MAX,
}

impl From<usize> for SyscallNumber {
    fn from(num: usize) -> Self {
        match num {
            1 => Self::Halt,
            2 => Self::Execute,
            3 => Self::Read,
            4 => Self::Write,
            5 => Self::Open,
            6 => Self::Close,
            7 => Self::GetArgs,
            8 => Self::Vidmap,
            9 => Self::SetHandler,
            10 => Self::SigReturn,
            _ => Self::Unknown,
        }
    }
}
