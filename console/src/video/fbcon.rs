//! Linear-framebuffer backend.
//!
//! Renders glyphs from a boot-supplied bitmap font onto a pixel
//! framebuffer. The screen mirror carries the authoritative cell state;
//! rendering always re-derives pixels from mirror cells, so blits on focus
//! change and scrollback viewing reuse the same path. The cursor is drawn
//! in software by repainting the cursor cell with swapped colors.

use crate::cell::{reverse_attr, Cell};
use crate::vc::Vconsole;
use crate::video::{
    grid_delete_char, grid_fill, grid_insert_char, grid_scroll_down, grid_scroll_up, CursorMode,
    ScrollDir, VideoBackend, VideoInfo,
};
use crate::vt::KdMode;

/// Pixel layout of the framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FbPixelFormat {
    /// Blue-Green-Red-Reserved (UEFI default).
    Bgr,
    /// Red-Green-Blue-Reserved.
    Rgb,
}

/// A bitmap font provided by the boot code. Glyphs are 8 pixels wide,
/// `height` rows tall, one byte per row, 256 glyphs.
#[derive(Debug, Clone, Copy)]
pub struct Font {
    pub height: usize,
    pub glyphs: &'static [u8],
}

/// Glyph width in pixels; the row-per-byte format fixes this at 8.
pub const FONT_WIDTH: usize = 8;

impl Font {
    fn glyph(&self, ch: u8) -> &[u8] {
        let from = ch as usize * self.height;
        self.glyphs
            .get(from..from + self.height)
            .unwrap_or(&self.glyphs[..self.height])
    }
}

/// The 16-entry hardware palette in VGA attribute order.
const PALETTE: [(u8, u8, u8); 16] = [
    (0x00, 0x00, 0x00), // black
    (0x00, 0x00, 0xAA), // blue
    (0x00, 0xAA, 0x00), // green
    (0x00, 0xAA, 0xAA), // cyan
    (0xAA, 0x00, 0x00), // red
    (0xAA, 0x00, 0xAA), // magenta
    (0xAA, 0x55, 0x00), // brown
    (0xAA, 0xAA, 0xAA), // light gray
    (0x55, 0x55, 0x55), // dark gray
    (0x55, 0x55, 0xFF), // bright blue
    (0x55, 0xFF, 0x55), // bright green
    (0x55, 0xFF, 0xFF), // bright cyan
    (0xFF, 0x55, 0x55), // bright red
    (0xFF, 0x55, 0xFF), // bright magenta
    (0xFF, 0xFF, 0x55), // yellow
    (0xFF, 0xFF, 0xFF), // white
];

pub struct FbconBackend {
    info: VideoInfo,
    height: usize,
    /// Bytes per pixel row.
    stride: usize,
    format: FbPixelFormat,
    font: Font,
    /// Last cursor cell painted, for erase-before-move.
    cursor_at: Option<(usize, usize)>,
    /// Consumed by the timer IRQ glue, not read in-crate.
    #[allow(dead_code)]
    blink_armed: bool,
}

// SAFETY: FbconBackend dereferences only the framebuffer base from
// `vc.vidmem`, valid for the kernel's lifetime per the constructor
// contract, and is always driven under the subsystem lock.
unsafe impl Send for FbconBackend {}

impl FbconBackend {
    /// Create the framebuffer backend.
    ///
    /// # Safety
    ///
    /// `info.address` must point to a framebuffer of at least
    /// `stride * height_px` bytes (32 bpp), mapped for the kernel's
    /// lifetime. `info.columns * FONT_WIDTH` and `info.lines * font.height`
    /// must fit within the pixel dimensions.
    pub unsafe fn new(
        info: VideoInfo,
        height_px: usize,
        stride: usize,
        format: FbPixelFormat,
        font: Font,
    ) -> Self {
        Self {
            info,
            height: height_px,
            stride,
            format,
            font,
            cursor_at: None,
            blink_armed: false,
        }
    }

    fn color_word(&self, (r, g, b): (u8, u8, u8)) -> u32 {
        match self.format {
            FbPixelFormat::Bgr => u32::from_ne_bytes([b, g, r, 0]),
            FbPixelFormat::Rgb => u32::from_ne_bytes([r, g, b, 0]),
        }
    }

    /// Paint one cell at text position `(x, y)`.
    fn render_cell(&self, base: usize, x: usize, y: usize, cell: Cell) {
        let attr = cell.attr();
        let fg = self.color_word(PALETTE[((attr >> 8) & 0x0F) as usize]);
        let bg = self.color_word(PALETTE[((attr >> 12) & 0x07) as usize]);
        let glyph = self.font.glyph(cell.glyph());
        let px = x * FONT_WIDTH;

        for (row, &bits) in glyph.iter().enumerate() {
            let py = y * self.font.height + row;
            if py >= self.height {
                break;
            }
            let line = base + py * self.stride + px * 4;
            // SAFETY: py < height and px + FONT_WIDTH <= columns *
            // FONT_WIDTH <= stride / 4 (constructor contract), so the
            // eight 4-byte writes stay within the framebuffer.
            unsafe {
                let ptr = line as *mut u32;
                for col in 0..FONT_WIDTH {
                    let word = if (bits >> (7 - col)) & 1 != 0 { fg } else { bg };
                    ptr.add(col).write_volatile(word);
                }
            }
        }
    }

    /// Re-render a range of mirror cells if the console is focused.
    fn sync_range(&self, vc: &Vconsole, from: usize, count: usize) {
        let Some(base) = vc.vidmem else { return };
        let to = (from + count).min(vc.screen.len());
        for idx in from..to {
            self.render_cell(base, idx % vc.columns, idx / vc.columns, vc.screen[idx]);
        }
    }

    fn paint_cursor(&self, vc: &Vconsole, at: (usize, usize)) {
        let Some(base) = vc.vidmem else { return };
        let idx = at.1 * vc.columns + at.0;
        if let Some(&cell) = vc.screen.get(idx) {
            let inverted = Cell::new(cell.glyph(), reverse_attr(cell.attr()));
            self.render_cell(base, at.0, at.1, inverted);
        }
    }

    fn erase_cursor(&mut self, vc: &Vconsole) {
        if let Some((x, y)) = self.cursor_at.take() {
            let idx = y * vc.columns + x;
            if idx < vc.screen.len() {
                self.sync_range(vc, idx, 1);
            }
        }
    }
}

impl VideoBackend for FbconBackend {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn put_char(&mut self, vc: &mut Vconsole, ch: u8) {
        let idx = vc.y * vc.columns + vc.x;
        if idx >= vc.screen.len() {
            return;
        }
        vc.screen[idx] = Cell::new(ch, vc.color_attr);
        self.sync_range(vc, idx, 1);
    }

    fn insert_char(&mut self, vc: &mut Vconsole) {
        let blank = Cell::blank(vc.color_attr);
        grid_insert_char(&mut vc.screen, vc.columns, vc.x, vc.y, blank);
        self.sync_range(vc, vc.y * vc.columns + vc.x, vc.columns - vc.x);
    }

    fn delete_char(&mut self, vc: &mut Vconsole) {
        let blank = Cell::blank(vc.color_attr);
        grid_delete_char(&mut vc.screen, vc.columns, vc.x, vc.y, blank);
        self.sync_range(vc, vc.y * vc.columns + vc.x, vc.columns - vc.x);
    }

    fn write_screen(&mut self, vc: &mut Vconsole, from: usize, count: usize, attr: u16) {
        grid_fill(&mut vc.screen, from, count, Cell::blank(attr));
        self.sync_range(vc, from, count);
    }

    fn scroll_screen(&mut self, vc: &mut Vconsole, from_row: usize, dir: ScrollDir) {
        let top = from_row.max(vc.top);
        let bottom = vc.lines;
        if top >= bottom {
            return;
        }
        let blank = Cell::blank(vc.color_attr);
        match dir {
            ScrollDir::Up => grid_scroll_up(&mut vc.screen, vc.columns, top, bottom, blank),
            ScrollDir::Down => grid_scroll_down(&mut vc.screen, vc.columns, top, bottom, blank),
        }
        self.sync_range(vc, top * vc.columns, (bottom - top) * vc.columns);
    }

    fn update_curpos(&mut self, vc: &Vconsole) {
        if vc.kd_mode == KdMode::Graphics || !vc.has_focus() {
            return;
        }
        self.erase_cursor(vc);
        if vc.cursor_visible {
            let at = (
                vc.x.min(vc.columns - 1),
                vc.y.min(vc.screen_lines - 1),
            );
            self.paint_cursor(vc, at);
            self.cursor_at = Some(at);
        }
    }

    fn show_cursor(&mut self, vc: &mut Vconsole, mode: CursorMode) {
        match mode {
            CursorMode::On => vc.cursor_visible = true,
            CursorMode::Off => vc.cursor_visible = false,
            CursorMode::Cond => {}
        }
        if vc.cursor_visible {
            self.update_curpos(vc);
        } else {
            self.erase_cursor(vc);
        }
    }

    fn get_curpos(&mut self, _vc: &mut Vconsole) {
        // No hardware cursor state to adopt on a pixel framebuffer.
    }

    fn restore_screen(&mut self, vc: &Vconsole) {
        self.cursor_at = None;
        self.sync_range(vc, 0, vc.screen.len());
    }

    fn blank_screen(&mut self, vc: &Vconsole) {
        let Some(base) = vc.vidmem else { return };
        let bg = self.color_word(PALETTE[0]);
        let words = self.stride / 4;
        for py in 0..self.height {
            let line = base + py * self.stride;
            // SAFETY: py < height and the row write covers exactly
            // stride bytes, within the framebuffer size guaranteed by the
            // constructor contract.
            unsafe {
                let ptr = line as *mut u32;
                for col in 0..words {
                    ptr.add(col).write_volatile(bg);
                }
            }
        }
        self.cursor_at = None;
    }

    fn show_view(&mut self, vc: &Vconsole, cells: &[Cell]) {
        let Some(base) = vc.vidmem else { return };
        self.cursor_at = None;
        let count = cells.len().min(vc.columns * vc.screen_lines);
        for (idx, &cell) in cells[..count].iter().enumerate() {
            self.render_cell(base, idx % vc.columns, idx / vc.columns, cell);
        }
    }

    fn cursor_blink(&mut self, _vc: &Vconsole) {
        // The timer IRQ glue toggles the painted cursor by calling
        // show_cursor(Cond) on each blink tick once this is armed.
        self.blink_armed = true;
    }
}
