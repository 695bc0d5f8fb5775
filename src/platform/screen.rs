//! # Terminal Screens
//!
//! Each terminal owns an 80x25 text page (character, attribute pairs).
//! The pages are the frames `vidmap` exposes to user programs, so they are
//! page-aligned statics. The displayed terminal's page is drawn into the
//! boot framebuffer and its console output is mirrored to the serial port.
//!
//! | Key          | Effect                                  |
//! |--------------|-----------------------------------------|
//! | Alt+F1..F3   | display terminal 0..2                   |
//! | Ctrl+L       | clear the displayed terminal's page     |
//! | other        | line discipline of displayed terminal   |

use core::fmt::Write;
use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicUsize, Ordering};

use triterm::config::{DISPLAY_PAGE_SIZE, MAX_TERMINALS};
use triterm::devices::display::{COLUMNS, DEFAULT_ATTRIBUTE, PAGE_BYTES, ROWS};
use triterm::devices::drivers::KeyAction;
use triterm::devices::{Console, LineBuffers, LineEdit};
use triterm::hal::Shared;
use triterm::process::TerminalId;
use triterm::{println, SERIAL};
use x86_64::instructions::interrupts;
use x86_64::VirtAddr;

use super::framebuffer;
use super::machine::Cpu;

#[repr(C, align(4096))]
struct TextPage([u8; DISPLAY_PAGE_SIZE as usize]);

static mut PAGES: [TextPage; MAX_TERMINALS] = [
    TextPage([0; DISPLAY_PAGE_SIZE as usize]),
    TextPage([0; DISPLAY_PAGE_SIZE as usize]),
    TextPage([0; DISPLAY_PAGE_SIZE as usize]),
];

#[derive(Clone, Copy)]
struct Cursor {
    row: usize,
    column: usize,
}

static CURSORS: Shared<[Cursor; MAX_TERMINALS]> =
    Shared::new([Cursor { row: 0, column: 0 }; MAX_TERMINALS]);
static DISPLAYED: AtomicUsize = AtomicUsize::new(0);
static LINES: LineBuffers = LineBuffers::new();

/// Kernel virtual address of `terminal`'s text page.
pub fn page_address(terminal: TerminalId) -> VirtAddr {
    let pages = unsafe { addr_of_mut!(PAGES) };
    VirtAddr::from_ptr(unsafe { &(*pages)[terminal] })
}

pub fn displayed() -> TerminalId {
    DISPLAYED.load(Ordering::Relaxed)
}

fn page(terminal: TerminalId) -> *mut u8 {
    unsafe { (*addr_of_mut!(PAGES))[terminal].0.as_mut_ptr() }
}

fn put_cell(terminal: TerminalId, row: usize, column: usize, byte: u8) {
    let offset = (row * COLUMNS + column) * 2;
    // User programs may write the same page through vidmap.
    unsafe {
        page(terminal).add(offset).write_volatile(byte);
        page(terminal).add(offset + 1).write_volatile(DEFAULT_ATTRIBUTE);
    }
}

fn scroll(terminal: TerminalId) {
    let row_bytes = COLUMNS * 2;
    unsafe {
        core::ptr::copy(
            page(terminal).add(row_bytes),
            page(terminal),
            row_bytes * (ROWS - 1),
        );
    }
    for column in 0..COLUMNS {
        put_cell(terminal, ROWS - 1, column, b' ');
    }
}

fn put_byte(cursor: &mut Cursor, terminal: TerminalId, byte: u8) {
    match byte {
        b'\n' => {
            cursor.column = 0;
            cursor.row += 1;
        }
        b'\x08' => {
            if cursor.column > 0 {
                cursor.column -= 1;
            } else if cursor.row > 0 {
                cursor.row -= 1;
                cursor.column = COLUMNS - 1;
            }
            put_cell(terminal, cursor.row, cursor.column, b' ');
        }
        _ => {
            put_cell(terminal, cursor.row, cursor.column, byte);
            cursor.column += 1;
            if cursor.column == COLUMNS {
                cursor.column = 0;
                cursor.row += 1;
            }
        }
    }
    if cursor.row == ROWS {
        scroll(terminal);
        cursor.row = ROWS - 1;
    }
}

fn mirror(terminal: TerminalId, bytes: &[u8]) {
    if terminal != displayed() {
        return;
    }
    interrupts::without_interrupts(|| {
        let mut serial = SERIAL.lock();
        for &byte in bytes {
            serial.send(byte);
        }
    });
}

/// Draw the displayed terminal's page, including anything a program
/// wrote through its vidmap page since the last refresh.
pub fn refresh() {
    let terminal = displayed();
    // Programs write this page concurrently; a torn cell is redrawn on the
    // next refresh.
    let cells = unsafe { core::slice::from_raw_parts(page(terminal), PAGE_BYTES) };
    framebuffer::show(terminal, cells);
}

fn print(terminal: TerminalId, bytes: &[u8]) {
    if terminal >= MAX_TERMINALS {
        return;
    }
    CURSORS.with(&Cpu, |cursors| {
        for &byte in bytes {
            put_byte(&mut cursors[terminal], terminal, byte);
        }
    });
    mirror(terminal, bytes);
    if terminal == displayed() {
        refresh();
    }
}

fn clear(terminal: TerminalId) {
    CURSORS.with(&Cpu, |cursors| {
        for row in 0..ROWS {
            for column in 0..COLUMNS {
                put_cell(terminal, row, column, b' ');
            }
        }
        cursors[terminal] = Cursor { row: 0, column: 0 };
    });
    if terminal == displayed() {
        refresh();
    }
}

pub fn init() {
    for terminal in 0..MAX_TERMINALS {
        clear(terminal);
    }
}

/// Keyboard IRQ entry: feed one decoded key to the displayed terminal.
pub fn handle_key(action: KeyAction) {
    let terminal = displayed();
    match action {
        KeyAction::Input(byte) => match LINES.push(&Cpu, terminal, byte) {
            LineEdit::Echo(byte) => print(terminal, &[byte]),
            LineEdit::Spaces(count) => {
                for _ in 0..count {
                    print(terminal, b" ");
                }
            }
            LineEdit::Erase => print(terminal, b"\x08"),
            LineEdit::Submit => print(terminal, b"\n"),
            LineEdit::Ignored => {}
        },
        KeyAction::SwitchTerminal(next) if next < MAX_TERMINALS && next != terminal => {
            DISPLAYED.store(next, Ordering::Relaxed);
            println!("screen: displaying terminal {}", next);
            refresh();
        }
        KeyAction::SwitchTerminal(_) => {}
        KeyAction::ClearScreen => clear(terminal),
    }
}

/// Console over the three text pages and the keyboard line buffers.
pub struct ScreenConsole;

impl Console for ScreenConsole {
    fn read_line(&self, terminal: TerminalId, buf: &mut [u8]) -> usize {
        LINES.take_line(&Cpu, terminal, buf)
    }

    fn write(&self, terminal: TerminalId, bytes: &[u8]) -> usize {
        if terminal >= MAX_TERMINALS {
            return 0;
        }
        print(terminal, bytes);
        bytes.len()
    }
}

/// Formatter for kernel messages shown on a terminal page.
pub struct TerminalWriter(pub TerminalId);

impl Write for TerminalWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        print(self.0, s.as_bytes());
        Ok(())
    }
}
