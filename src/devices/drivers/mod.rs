//! Device Drivers
//!
//! - PS/2 keyboard scancode decoding (IRQ1)

pub mod ps2_keyboard;

pub use ps2_keyboard::{KeyAction, ScancodeDecoder};
