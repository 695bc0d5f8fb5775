//! # Console Line Discipline
//!
//! Each terminal owns a 128-byte line buffer filled by the keyboard IRQ and
//! drained by `read` on descriptor 0.
//!
//! | Input     | Effect                                                |
//! |-----------|-------------------------------------------------------|
//! | printable | appended while there is room                          |
//! | `\x08`    | removes the last byte                                 |
//! | `\t`      | up to four spaces                                     |
//! | `\n`      | appended (overwrites the last byte when full), ready  |
//!
//! The IRQ side and the reading task share the buffers through
//! [`Shared`], so a reader never sees a half-updated line.

use crate::config::{LINE_BUFFER_SIZE, MAX_TERMINALS};
use crate::hal::{InterruptControl, Shared, TickSource};
use crate::process::TerminalId;

const TAB_WIDTH: usize = 4;

/// What the keyboard handler should echo for one input byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEdit {
    Echo(u8),
    Spaces(usize),
    Erase,
    Submit,
    Ignored,
}

#[derive(Debug, Clone, Copy)]
pub struct LineBuffer {
    bytes: [u8; LINE_BUFFER_SIZE],
    len: usize,
    ready: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0; LINE_BUFFER_SIZE],
            len: 0,
            ready: false,
        }
    }

    pub fn push(&mut self, byte: u8) -> LineEdit {
        if self.ready {
            return LineEdit::Ignored;
        }
        match byte {
            b'\n' => {
                if self.len == LINE_BUFFER_SIZE {
                    self.bytes[LINE_BUFFER_SIZE - 1] = b'\n';
                } else {
                    self.bytes[self.len] = b'\n';
                    self.len += 1;
                }
                self.ready = true;
                LineEdit::Submit
            }
            b'\x08' => {
                if self.len == 0 {
                    return LineEdit::Ignored;
                }
                self.len -= 1;
                self.bytes[self.len] = 0;
                LineEdit::Erase
            }
            b'\t' => {
                let spaces = TAB_WIDTH.min(LINE_BUFFER_SIZE - self.len);
                self.bytes[self.len..self.len + spaces].fill(b' ');
                self.len += spaces;
                if spaces == 0 {
                    LineEdit::Ignored
                } else {
                    LineEdit::Spaces(spaces)
                }
            }
            _ => {
                if self.len == LINE_BUFFER_SIZE {
                    return LineEdit::Ignored;
                }
                self.bytes[self.len] = byte;
                self.len += 1;
                LineEdit::Echo(byte)
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Copy the finished line (newline included, never past `buf`) and
    /// clear the buffer. `None` while no line is ready.
    pub fn take_line(&mut self, buf: &mut [u8]) -> Option<usize> {
        if !self.ready {
            return None;
        }
        let line = &self.bytes[..self.len];
        let limit = buf.len().min(line.len());
        let count = line[..limit]
            .iter()
            .position(|&byte| byte == b'\n')
            .map_or(limit, |newline| newline + 1);
        buf[..count].copy_from_slice(&line[..count]);
        *self = Self::new();
        Some(count)
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LineBuffers {
    terminals: Shared<[LineBuffer; MAX_TERMINALS]>,
}

impl LineBuffers {
    pub const fn new() -> Self {
        Self {
            terminals: Shared::new([LineBuffer::new(); MAX_TERMINALS]),
        }
    }

    pub fn push<C: InterruptControl + ?Sized>(
        &self,
        cpu: &C,
        terminal: TerminalId,
        byte: u8,
    ) -> LineEdit {
        self.terminals.with(cpu, |buffers| {
            buffers
                .get_mut(terminal)
                .map_or(LineEdit::Ignored, |buffer| buffer.push(byte))
        })
    }

    pub fn clear<C: InterruptControl + ?Sized>(&self, cpu: &C, terminal: TerminalId) {
        self.terminals.with(cpu, |buffers| {
            if let Some(buffer) = buffers.get_mut(terminal) {
                buffer.clear();
            }
        });
    }

    /// Busy-wait until `terminal` has a complete line, then copy it out.
    /// Interrupts must be enabled for the keyboard IRQ to make progress.
    pub fn take_line<C: InterruptControl + TickSource + ?Sized>(
        &self,
        cpu: &C,
        terminal: TerminalId,
        buf: &mut [u8],
    ) -> usize {
        if terminal >= MAX_TERMINALS {
            return 0;
        }
        loop {
            let taken = self
                .terminals
                .with(cpu, |buffers| buffers[terminal].take_line(buf));
            if let Some(count) = taken {
                return count;
            }
            cpu.relax();
        }
    }
}

impl Default for LineBuffers {
    fn default() -> Self {
        Self::new()
    }
}
