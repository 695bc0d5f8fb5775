//! # Programmable Interrupt Controller (8259 PIC)
//!
//! ## Interrupt Assignments
//!
//! | IRQ | Vector | Device    |
//! |-----|--------|-----------|
//! | 0   | 32     | PIT timer |
//! | 1   | 33     | Keyboard  |
//! | 2   | -      | Cascade   |
//! | 8   | 40     | RTC       |
//!
//! Every other line stays masked.

use pic8259::ChainedPics;
use spin::Mutex;

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = 40;
pub const SYSCALL_VECTOR: u8 = 0x80;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
    Keyboard = PIC_1_OFFSET + 1,
    Rtc = PIC_2_OFFSET,
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

const MASTER_MASK: u8 = !(1 << 0 | 1 << 1 | 1 << 2);
const SLAVE_MASK: u8 = !(1 << 0);

pub fn init() {
    let mut pics = PICS.lock();
    unsafe {
        pics.initialize();
        pics.write_masks(MASTER_MASK, SLAVE_MASK);
    }
}

pub fn end_of_interrupt(index: InterruptIndex) {
    unsafe {
        PICS.lock().notify_end_of_interrupt(index.as_u8());
    }
}
