//! Text page rendering.
//!
//! A terminal's screen is an 80x25 page of (character, attribute) byte
//! pairs, the layout `vidmap` hands to user programs. [`TextRenderer`]
//! draws such a page onto any `embedded-graphics` target in the largest
//! monospace font that fits, redrawing only the cells that changed since
//! the previous call.

use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10, FONT_8X13, FONT_9X15};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

pub const COLUMNS: usize = 80;
pub const ROWS: usize = 25;
/// Bytes of a page that hold cells; the rest of the 4 KiB frame is unused.
pub const PAGE_BYTES: usize = COLUMNS * ROWS * 2;
/// Light grey on black.
pub const DEFAULT_ATTRIBUTE: u8 = 0x07;

/// Largest first.
const FONTS: [&MonoFont<'static>; 4] = [&FONT_10X20, &FONT_9X15, &FONT_8X13, &FONT_6X10];

const PALETTE: [u32; 16] = [
    0x000000, 0x0000AA, 0x00AA00, 0x00AAAA, 0xAA0000, 0xAA00AA, 0xAA5500, 0xAAAAAA,
    0x555555, 0x5555FF, 0x55FF55, 0x55FFFF, 0xFF5555, 0xFF55FF, 0xFFFF55, 0xFFFFFF,
];

/// One of the sixteen text-mode colours.
pub fn vga_color(index: u8) -> Rgb888 {
    let rgb = PALETTE[usize::from(index & 0x0F)];
    Rgb888::new((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
}

/// Foreground and background of an attribute byte. Bit 7 is the blink
/// bit and does not brighten the background.
pub fn attribute_colors(attribute: u8) -> (Rgb888, Rgb888) {
    (vga_color(attribute & 0x0F), vga_color((attribute >> 4) & 0x07))
}

fn glyph(byte: u8) -> char {
    match byte {
        0x20..=0x7E => char::from(byte),
        0 => ' ',
        _ => '?',
    }
}

pub struct TextRenderer {
    /// Index into `FONTS`.
    font: usize,
    origin: Point,
    drawn: [[u16; COLUMNS]; ROWS],
    valid: bool,
}

impl TextRenderer {
    /// Pick the font for a target of `size` pixels and centre the page.
    pub fn for_size(size: Size) -> Self {
        let fits = |font: &MonoFont<'static>| {
            font.character_size.width * COLUMNS as u32 <= size.width
                && font.character_size.height * ROWS as u32 <= size.height
        };
        let font = (0..FONTS.len())
            .find(|&index| fits(FONTS[index]))
            .unwrap_or(FONTS.len() - 1);

        let cell = FONTS[font].character_size;
        let page_width = cell.width * COLUMNS as u32;
        let page_height = cell.height * ROWS as u32;
        Self {
            font,
            origin: Point::new(
                (size.width.saturating_sub(page_width) / 2) as i32,
                (size.height.saturating_sub(page_height) / 2) as i32,
            ),
            drawn: [[0; COLUMNS]; ROWS],
            valid: false,
        }
    }

    /// Pixel size of one character cell.
    pub fn cell_size(&self) -> Size {
        FONTS[self.font].character_size
    }

    /// Top-left pixel of the cell at `row`, `column`.
    pub fn cell_origin(&self, row: usize, column: usize) -> Point {
        let cell = self.cell_size();
        self.origin
            + Point::new(
                (column as u32 * cell.width) as i32,
                (row as u32 * cell.height) as i32,
            )
    }

    /// Forget what is on the target; the next render draws every cell.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Draw the cells of `page` that differ from the last render and return
    /// how many were drawn. Cells past the end of a short page are left
    /// alone.
    pub fn render<D>(&mut self, page: &[u8], target: &mut D) -> Result<usize, D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        let mut count = 0;
        for (index, pair) in page.chunks_exact(2).take(COLUMNS * ROWS).enumerate() {
            let (row, column) = (index / COLUMNS, index % COLUMNS);
            let cell = u16::from_le_bytes([pair[0], pair[1]]);
            if self.valid && self.drawn[row][column] == cell {
                continue;
            }
            self.draw_cell(row, column, pair[0], pair[1], target)?;
            self.drawn[row][column] = cell;
            count += 1;
        }
        self.valid = true;
        Ok(count)
    }

    fn draw_cell<D>(
        &self,
        row: usize,
        column: usize,
        byte: u8,
        attribute: u8,
        target: &mut D,
    ) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb888>,
    {
        let (foreground, background) = attribute_colors(attribute);
        let style = MonoTextStyleBuilder::new()
            .font(FONTS[self.font])
            .text_color(foreground)
            .background_color(background)
            .build();
        let mut buf = [0u8; 4];
        let text = glyph(byte).encode_utf8(&mut buf);
        Text::with_baseline(text, self.cell_origin(row, column), style, Baseline::Top)
            .draw(target)?;
        Ok(())
    }
}
