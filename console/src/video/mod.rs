//! Video backend interface.
//!
//! The core treats the display as a set of primitives behind the
//! [`VideoBackend`] trait, with one implementation for VGA text mode and
//! one for a linear pixel framebuffer, injected at boot. Backends keep the
//! console's `screen` mirror authoritative: every mutation lands in the
//! mirror first and is propagated to the hardware only while the console
//! holds focus, which is what makes focus changes a plain blit.

use crate::cell::Cell;
use crate::vc::Vconsole;

pub mod fbcon;
pub mod vga;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

bitflags::bitflags! {
    /// Display capabilities reported by the boot code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VideoFlags: u32 {
        /// VGA text mode: cells map directly onto video memory.
        const VGA_TEXT = 1 << 0;
        /// Linear pixel framebuffer (VESA or equivalent).
        const VESA_FB = 1 << 1;
    }
}

/// Boot-time display description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    /// Text columns.
    pub columns: usize,
    /// Text lines.
    pub lines: usize,
    pub flags: VideoFlags,
    /// Framebuffer base address.
    pub address: usize,
    /// CRT controller port base for VGA text mode, 0 otherwise.
    pub port: u16,
    /// Adapter identification string for the boot log.
    pub signature: &'static str,
}

/// Scroll direction for [`VideoBackend::scroll_screen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDir {
    Up,
    Down,
}

/// Cursor visibility request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    On,
    Off,
    /// Restore the last explicitly requested state.
    Cond,
}

/// Primitives over the physical display.
///
/// Methods take the console so backends can honor its geometry, attribute
/// and focus state; they must keep `vc.screen` coherent on every mutation.
pub trait VideoBackend: Send {
    fn info(&self) -> VideoInfo;

    /// Write a glyph at `(vc.x, vc.y)` with `vc.color_attr`.
    fn put_char(&mut self, vc: &mut Vconsole, ch: u8);

    /// Insert a blank cell at the cursor, shifting the rest of the row right.
    fn insert_char(&mut self, vc: &mut Vconsole);

    /// Delete the cell at the cursor, shifting the rest of the row left.
    fn delete_char(&mut self, vc: &mut Vconsole);

    /// Fill `count` cells starting at linear offset `from` with blanks
    /// carrying attribute `attr`.
    fn write_screen(&mut self, vc: &mut Vconsole, from: usize, count: usize, attr: u16);

    /// Scroll the region `[max(from_row, vc.top), vc.lines)` by one line.
    fn scroll_screen(&mut self, vc: &mut Vconsole, from_row: usize, dir: ScrollDir);

    /// Reflect `(vc.x, vc.y)` on the hardware cursor; no-op in KD_GRAPHICS.
    fn update_curpos(&mut self, vc: &Vconsole);

    /// Change cursor visibility.
    fn show_cursor(&mut self, vc: &mut Vconsole, mode: CursorMode);

    /// Seed `(vc.x, vc.y)` from pre-existing hardware state at boot.
    fn get_curpos(&mut self, vc: &mut Vconsole);

    /// Blit `vc.screen` to the framebuffer (focus gain, scrollback exit,
    /// return from graphics mode).
    fn restore_screen(&mut self, vc: &Vconsole);

    /// Clear the display without touching the mirror.
    fn blank_screen(&mut self, vc: &Vconsole);

    /// Blit scrollback ring content while the user is viewing history.
    fn show_view(&mut self, vc: &Vconsole, cells: &[Cell]);

    /// Arm the periodic cursor-blink timer.
    fn cursor_blink(&mut self, vc: &Vconsole);

    /// Adopt the live framebuffer contents into `vc.screen` at boot; only
    /// meaningful for text-mode hardware, hence the default no-op.
    fn adopt_screen(&mut self, _vc: &mut Vconsole) {}
}

// ---------------------------------------------------------------------------
// Shared cell-grid operations
//
// Backends apply these to the screen mirror and then propagate the affected
// range to the device in their own way.
// ---------------------------------------------------------------------------

pub(crate) fn grid_fill(screen: &mut [Cell], from: usize, count: usize, blank: Cell) {
    let to = (from + count).min(screen.len());
    if from < to {
        screen[from..to].fill(blank);
    }
}

pub(crate) fn grid_scroll_up(
    screen: &mut [Cell],
    columns: usize,
    top: usize,
    bottom: usize,
    blank: Cell,
) {
    if top + 1 >= bottom {
        grid_fill(screen, top * columns, columns, blank);
        return;
    }
    screen.copy_within((top + 1) * columns..bottom * columns, top * columns);
    grid_fill(screen, (bottom - 1) * columns, columns, blank);
}

pub(crate) fn grid_scroll_down(
    screen: &mut [Cell],
    columns: usize,
    top: usize,
    bottom: usize,
    blank: Cell,
) {
    if top + 1 >= bottom {
        grid_fill(screen, top * columns, columns, blank);
        return;
    }
    screen.copy_within(top * columns..(bottom - 1) * columns, (top + 1) * columns);
    grid_fill(screen, top * columns, columns, blank);
}

pub(crate) fn grid_insert_char(
    screen: &mut [Cell],
    columns: usize,
    x: usize,
    y: usize,
    blank: Cell,
) {
    let row = y * columns;
    screen.copy_within(row + x..row + columns - 1, row + x + 1);
    screen[row + x] = blank;
}

pub(crate) fn grid_delete_char(
    screen: &mut [Cell],
    columns: usize,
    x: usize,
    y: usize,
    blank: Cell,
) {
    let row = y * columns;
    screen.copy_within(row + x + 1..row + columns, row + x);
    screen[row + columns - 1] = blank;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::DEF_MODE;
    use alloc::vec;
    use alloc::vec::Vec;

    fn grid(rows: &[&[u8]]) -> Vec<Cell> {
        let mut cells = Vec::new();
        for row in rows {
            cells.extend(row.iter().map(|&ch| Cell::new(ch, DEF_MODE)));
        }
        cells
    }

    #[test]
    fn scroll_up_moves_rows_and_blanks_bottom() {
        let mut screen = grid(&[b"aa", b"bb", b"cc"]);
        grid_scroll_up(&mut screen, 2, 0, 3, Cell::blank(DEF_MODE));
        assert_eq!(screen, grid(&[b"bb", b"cc", b"  "]));
    }

    #[test]
    fn scroll_down_moves_rows_and_blanks_top() {
        let mut screen = grid(&[b"aa", b"bb", b"cc"]);
        grid_scroll_down(&mut screen, 2, 0, 3, Cell::blank(DEF_MODE));
        assert_eq!(screen, grid(&[b"  ", b"aa", b"bb"]));
    }

    #[test]
    fn scroll_respects_region_bounds() {
        let mut screen = grid(&[b"aa", b"bb", b"cc", b"dd"]);
        grid_scroll_up(&mut screen, 2, 1, 3, Cell::blank(DEF_MODE));
        assert_eq!(screen, grid(&[b"aa", b"cc", b"  ", b"dd"]));
    }

    #[test]
    fn one_line_region_just_blanks() {
        let mut screen = grid(&[b"aa", b"bb"]);
        grid_scroll_up(&mut screen, 2, 1, 2, Cell::blank(DEF_MODE));
        assert_eq!(screen, grid(&[b"aa", b"  "]));
    }

    #[test]
    fn insert_and_delete_shift_within_row() {
        let mut screen = grid(&[b"abcd"]);
        grid_insert_char(&mut screen, 4, 1, 0, Cell::blank(DEF_MODE));
        assert_eq!(screen, grid(&[b"a bc"]));
        grid_delete_char(&mut screen, 4, 1, 0, Cell::blank(DEF_MODE));
        assert_eq!(screen, grid(&[b"abc "]));
    }

    #[test]
    fn fill_clamps_to_grid_end() {
        let mut screen = vec![Cell::new(b'x', DEF_MODE); 4];
        grid_fill(&mut screen, 2, 10, Cell::blank(DEF_MODE));
        assert_eq!(screen[1].glyph(), b'x');
        assert_eq!(screen[2].glyph(), b' ');
        assert_eq!(screen[3].glyph(), b' ');
    }
}
