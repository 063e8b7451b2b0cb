//! VGA text-mode backend.
//!
//! Cells are written straight into video memory at the console's `vidmem`
//! base while it holds focus; the screen mirror is always updated first, so
//! unfocused consoles accumulate state that `restore_screen` can blit back.
//! The hardware cursor is driven through the CRT controller register pair.

use core::ptr::{read_volatile, write_volatile};

use crate::cell::Cell;
use crate::vc::Vconsole;
use crate::video::{
    grid_delete_char, grid_fill, grid_insert_char, grid_scroll_down, grid_scroll_up, CursorMode,
    ScrollDir, VideoBackend, VideoInfo,
};
use crate::vt::KdMode;

/// CRT register: cursor start scanline / visibility.
const CRT_CURSOR_START: u8 = 0x0A;
/// CRT register: cursor position high byte.
const CRT_CURSOR_HI: u8 = 0x0E;
/// CRT register: cursor position low byte.
const CRT_CURSOR_LO: u8 = 0x0F;

pub struct VgaBackend {
    info: VideoInfo,
}

// SAFETY: VgaBackend holds no interior pointers; the framebuffer addresses
// it dereferences come from `vc.vidmem`, which is only non-null for the
// focused console, and all access happens under the subsystem lock.
unsafe impl Send for VgaBackend {}

impl VgaBackend {
    /// Create the text-mode backend.
    ///
    /// # Safety
    ///
    /// `info.address` must point to a VGA text buffer of at least
    /// `columns * lines` cells, mapped for the kernel's lifetime, and
    /// `info.port` must be the adapter's CRT controller base.
    pub unsafe fn new(info: VideoInfo) -> Self {
        Self { info }
    }

    /// Propagate a range of mirror cells to video memory if focused.
    fn sync_range(&self, vc: &Vconsole, from: usize, count: usize) {
        let Some(base) = vc.vidmem else { return };
        let to = (from + count).min(vc.screen.len());
        let ptr = base as *mut u16;
        for idx in from..to {
            // SAFETY: `base` points to a text buffer of at least
            // columns * screen_lines cells (constructor contract) and `idx`
            // is bounded by the mirror length, which has the same size.
            unsafe {
                write_volatile(ptr.add(idx), vc.screen[idx].raw());
            }
        }
    }

    fn write_crt(&self, reg: u8, value: u8) {
        crt::write(self.info.port, reg, value);
    }
}

impl VideoBackend for VgaBackend {
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
        let pos = (vc.y * vc.columns + vc.x).min(vc.columns * vc.screen_lines - 1);
        self.write_crt(CRT_CURSOR_HI, (pos >> 8) as u8);
        self.write_crt(CRT_CURSOR_LO, (pos & 0xFF) as u8);
    }

    fn show_cursor(&mut self, vc: &mut Vconsole, mode: CursorMode) {
        let on = match mode {
            CursorMode::On => {
                vc.cursor_visible = true;
                true
            }
            CursorMode::Off => {
                vc.cursor_visible = false;
                false
            }
            CursorMode::Cond => vc.cursor_visible,
        };
        // Cursor start scanline 14 with the enable bit clear shows the
        // familiar two-scanline underline cursor; bit 5 blanks it.
        self.write_crt(CRT_CURSOR_START, if on { 0x0E } else { 0x20 });
    }

    fn get_curpos(&mut self, vc: &mut Vconsole) {
        let hi = crt::read(self.info.port, CRT_CURSOR_HI) as usize;
        let lo = crt::read(self.info.port, CRT_CURSOR_LO) as usize;
        let pos = ((hi << 8) | lo).min(vc.columns * vc.screen_lines - 1);
        vc.x = pos % vc.columns;
        vc.y = pos / vc.columns;
    }

    fn restore_screen(&mut self, vc: &Vconsole) {
        self.sync_range(vc, 0, vc.screen.len());
    }

    fn blank_screen(&mut self, vc: &Vconsole) {
        let Some(base) = vc.vidmem else { return };
        let blank = Cell::blank(vc.color_attr).raw();
        let ptr = base as *mut u16;
        for idx in 0..vc.columns * vc.screen_lines {
            // SAFETY: `base` points to a text buffer of columns *
            // screen_lines cells (constructor contract); idx stays below
            // that bound. The mirror is deliberately left untouched.
            unsafe {
                write_volatile(ptr.add(idx), blank);
            }
        }
    }

    fn show_view(&mut self, vc: &Vconsole, cells: &[Cell]) {
        let Some(base) = vc.vidmem else { return };
        let count = cells.len().min(vc.columns * vc.screen_lines);
        let ptr = base as *mut u16;
        for (idx, cell) in cells[..count].iter().enumerate() {
            // SAFETY: count is clamped to the text buffer size guaranteed
            // by the constructor contract.
            unsafe {
                write_volatile(ptr.add(idx), cell.raw());
            }
        }
    }

    fn cursor_blink(&mut self, _vc: &Vconsole) {
        // The VGA text cursor blinks in hardware; nothing to arm.
    }

    fn adopt_screen(&mut self, vc: &mut Vconsole) {
        let Some(base) = vc.vidmem else { return };
        let ptr = base as *const u16;
        for idx in 0..vc.screen.len() {
            // SAFETY: reading back the same text buffer the constructor
            // contract guarantees; idx is bounded by the mirror length.
            vc.screen[idx] = Cell::from_raw(unsafe { read_volatile(ptr.add(idx)) });
        }
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod crt {
    use x86_64::instructions::port::Port;

    pub fn write(base: u16, reg: u8, value: u8) {
        // SAFETY: I/O port writes to the VGA CRT controller index/data
        // pair are standard cursor programming. Kernel mode with I/O
        // privileges; these ports are always safe to access.
        unsafe {
            Port::<u8>::new(base).write(reg);
            Port::<u8>::new(base + 1).write(value);
        }
    }

    pub fn read(base: u16, reg: u8) -> u8 {
        // SAFETY: I/O port reads from the VGA CRT controller index/data
        // pair. Standard VGA register access in kernel mode.
        unsafe {
            Port::<u8>::new(base).write(reg);
            Port::<u8>::new(base + 1).read()
        }
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod crt {
    pub fn write(_base: u16, _reg: u8, _value: u8) {}

    pub fn read(_base: u16, _reg: u8) -> u8 {
        0
    }
}
