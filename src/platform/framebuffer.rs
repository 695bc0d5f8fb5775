//! Boot framebuffer output.
//!
//! The bootloader hands over a linear framebuffer; the displayed
//! terminal's text page is drawn into it cell by cell. Without one the
//! serial mirror is the only output.

use core::convert::Infallible;

use bootloader_api::info::{FrameBuffer, FrameBufferInfo, PixelFormat};
use embedded_graphics_core::draw_target::DrawTarget;
use embedded_graphics_core::geometry::{OriginDimensions, Point, Size};
use embedded_graphics_core::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics_core::Pixel;
use triterm::devices::display::TextRenderer;
use triterm::hal::Shared;
use triterm::println;
use triterm::process::TerminalId;

use super::machine::Cpu;

pub struct FramebufferWriter {
    framebuffer: FrameBuffer,
    info: FrameBufferInfo,
}

impl FramebufferWriter {
    pub fn new(framebuffer: FrameBuffer) -> Self {
        let info = framebuffer.info();
        Self { framebuffer, info }
    }

    pub fn clear(&mut self) {
        self.framebuffer.buffer_mut().fill(0);
    }
}

impl DrawTarget for FramebufferWriter {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let info = self.info;
        let buffer = self.framebuffer.buffer_mut();
        for Pixel(Point { x, y }, color) in pixels {
            if x < 0 || y < 0 || x as usize >= info.width || y as usize >= info.height {
                continue;
            }
            let offset = (y as usize * info.stride + x as usize) * info.bytes_per_pixel;
            let Some(bytes) = buffer.get_mut(offset..offset + info.bytes_per_pixel) else {
                continue;
            };
            match (info.pixel_format, bytes) {
                (PixelFormat::Rgb, [r, g, b, ..]) | (PixelFormat::Bgr, [b, g, r, ..]) => {
                    *r = color.r();
                    *g = color.g();
                    *b = color.b();
                }
                (PixelFormat::U8, [gray, ..]) => {
                    let sum = u16::from(color.r()) + u16::from(color.g()) + u16::from(color.b());
                    *gray = (sum / 3) as u8;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl OriginDimensions for FramebufferWriter {
    fn size(&self) -> Size {
        Size::new(self.info.width as u32, self.info.height as u32)
    }
}

struct Display {
    writer: FramebufferWriter,
    renderer: TextRenderer,
    shown: Option<TerminalId>,
}

static DISPLAY: Shared<Option<Display>> = Shared::new(None);

pub fn init_framebuffer(framebuffer: FrameBuffer) {
    let mut writer = FramebufferWriter::new(framebuffer);
    writer.clear();
    let renderer = TextRenderer::for_size(writer.size());
    println!(
        "    framebuffer {}x{} {:?}, {:?} cells",
        writer.info.width,
        writer.info.height,
        writer.info.pixel_format,
        renderer.cell_size()
    );
    DISPLAY.with(&Cpu, |display| {
        *display = Some(Display {
            writer,
            renderer,
            shown: None,
        });
    });
}

/// Bring the screen up to date with `page`, the text page of `terminal`.
/// Switching to another terminal redraws every cell.
pub fn show(terminal: TerminalId, page: &[u8]) {
    DISPLAY.with(&Cpu, |display| {
        let Some(display) = display.as_mut() else {
            return;
        };
        if display.shown != Some(terminal) {
            display.renderer.invalidate();
            display.shown = Some(terminal);
        }
        let _ = display.renderer.render(page, &mut display.writer);
    });
}
