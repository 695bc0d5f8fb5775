//! # PS/2 Keyboard Decoder
//!
//! Turns scancode set 1 bytes from port 0x60 into terminal actions.
//!
//! ```text
//! ┌─────────────┐    IRQ1     ┌──────────────────┐
//! │  Keyboard   │────────────▶│ ScancodeDecoder  │
//! │  (Port 60)  │             │ - Modifiers      │
//! └─────────────┘             │ - Shift mapping  │
//!                             └────────┬─────────┘
//!                                      ▼
//!                 Input(byte) │ SwitchTerminal(t) │ ClearScreen
//! ```
//!
//! - 0xE0 prefixes extended keys, which are ignored
//! - bit 7 marks a key release
//! - Alt+F1..F3 selects the displayed terminal, Ctrl+L clears it

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Input(u8),
    SwitchTerminal(usize),
    ClearScreen,
}

const EXTENDED_PREFIX: u8 = 0xE0;
const RELEASE_BIT: u8 = 0x80;
const LEFT_SHIFT: u8 = 0x2A;
const RIGHT_SHIFT: u8 = 0x36;
const CTRL: u8 = 0x1D;
const ALT: u8 = 0x38;
const CAPS_LOCK: u8 = 0x3A;
const F1: u8 = 0x3B;
const F3: u8 = 0x3D;
const L_KEY: u8 = 0x26;

pub struct ScancodeDecoder {
    is_extended: bool,
    shift_pressed: bool,
    ctrl_pressed: bool,
    alt_pressed: bool,
    caps_lock: bool,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self {
            is_extended: false,
            shift_pressed: false,
            ctrl_pressed: false,
            alt_pressed: false,
            caps_lock: false,
        }
    }

    pub fn process_scancode(&mut self, scancode: u8) -> Option<KeyAction> {
        if scancode == EXTENDED_PREFIX {
            self.is_extended = true;
            return None;
        }

        let is_release = scancode & RELEASE_BIT != 0;
        let key_code = scancode & !RELEASE_BIT;

        if self.is_extended {
            self.is_extended = false;
            // Right Ctrl and right Alt share codes with the left keys.
            match key_code {
                CTRL => self.ctrl_pressed = !is_release,
                ALT => self.alt_pressed = !is_release,
                _ => {}
            }
            return None;
        }

        match key_code {
            LEFT_SHIFT | RIGHT_SHIFT => {
                self.shift_pressed = !is_release;
                return None;
            }
            CTRL => {
                self.ctrl_pressed = !is_release;
                return None;
            }
            ALT => {
                self.alt_pressed = !is_release;
                return None;
            }
            _ => {}
        }

        if is_release {
            return None;
        }

        if key_code == CAPS_LOCK {
            self.caps_lock = !self.caps_lock;
            return None;
        }
        if self.alt_pressed && (F1..=F3).contains(&key_code) {
            return Some(KeyAction::SwitchTerminal(usize::from(key_code - F1)));
        }
        if self.ctrl_pressed && key_code == L_KEY {
            return Some(KeyAction::ClearScreen);
        }

        self.scancode_to_byte(key_code).map(KeyAction::Input)
    }

    fn scancode_to_byte(&self, scancode: u8) -> Option<u8> {
        const LETTERS: &[(u8, u8)] = &[
            (0x10, b'q'), (0x11, b'w'), (0x12, b'e'), (0x13, b'r'), (0x14, b't'),
            (0x15, b'y'), (0x16, b'u'), (0x17, b'i'), (0x18, b'o'), (0x19, b'p'),
            (0x1E, b'a'), (0x1F, b's'), (0x20, b'd'), (0x21, b'f'), (0x22, b'g'),
            (0x23, b'h'), (0x24, b'j'), (0x25, b'k'), (0x26, b'l'), (0x2C, b'z'),
            (0x2D, b'x'), (0x2E, b'c'), (0x2F, b'v'), (0x30, b'b'), (0x31, b'n'),
            (0x32, b'm'),
        ];

        if let Some(&(_, letter)) = LETTERS.iter().find(|(code, _)| *code == scancode) {
            // Caps lock and shift cancel out on letters.
            let upper = self.shift_pressed != self.caps_lock;
            return Some(if upper { letter.to_ascii_uppercase() } else { letter });
        }

        let shift = self.shift_pressed;
        let byte = match scancode {
            0x02..=0x0B => {
                let digit = if scancode == 0x0B { b'0' } else { scancode - 0x02 + b'1' };
                if shift {
                    b")!@#$%^&*("[usize::from(digit - b'0')]
                } else {
                    digit
                }
            }
            0x39 => b' ',
            0x1C => b'\n',
            0x0E => b'\x08',
            0x0F => b'\t',

            0x1A => if shift { b'{' } else { b'[' },
            0x1B => if shift { b'}' } else { b']' },
            0x27 => if shift { b':' } else { b';' },
            0x28 => if shift { b'"' } else { b'\'' },
            0x29 => if shift { b'~' } else { b'`' },
            0x2B => if shift { b'|' } else { b'\\' },
            0x33 => if shift { b'<' } else { b',' },
            0x34 => if shift { b'>' } else { b'.' },
            0x35 => if shift { b'?' } else { b'/' },
            0x0C => if shift { b'_' } else { b'-' },
            0x0D => if shift { b'+' } else { b'=' },

            _ => return None,
        };

        Some(byte)
    }
}

impl Default for ScancodeDecoder {
    fn default() -> Self {
        Self::new()
    }
}
