//! Per-console state: geometry, cursor, attributes, tab stops, handoff.
//!
//! One `Vconsole` exists for each minor 1..=NR_VCONSOLES. Exactly one of
//! them holds `HAS_FOCUS` at any moment; only that one carries a non-null
//! `vidmem` (the framebuffer base), and every other console's `screen`
//! mirror fully reflects what the display would show were it focused.

use alloc::vec;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::cell::{Cell, DEF_MODE};
use crate::parser::EscapeParser;
use crate::tty::Tty;
use crate::video::VideoInfo;
use crate::vt::{KdMode, VtModeState};

/// Number of virtual consoles registered at boot.
pub const NR_VCONSOLES: usize = 12;

/// Columns covered by the tab-stop bit vector.
pub const MAX_TAB_COLS: usize = 132;

/// Default tab stop spacing.
pub const TAB_SIZE: usize = 8;

bitflags! {
    /// Ownership flags for a virtual console.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VcFlags: u8 {
        /// This console currently drives the physical framebuffer.
        const HAS_FOCUS = 1 << 0;
        /// The display has been blanked; the mirror is still current.
        const BLANKED = 1 << 1;
    }
}

bitflags! {
    /// Keyboard LED state, promoted to hardware when the console is focused.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LedFlags: u8 {
        const SCRLOCK = 1 << 0;
        const NUMLOCK = 1 << 1;
        const CAPSLOCK = 1 << 2;
    }
}

/// Tab stop positions as a bit vector over [`MAX_TAB_COLS`] columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabStops {
    bits: [u64; (MAX_TAB_COLS + 63) / 64],
}

impl TabStops {
    /// All stops cleared.
    pub const fn empty() -> Self {
        Self {
            bits: [0; (MAX_TAB_COLS + 63) / 64],
        }
    }

    /// Stops at every [`TAB_SIZE`]-th column, the reset default.
    pub fn default_stops() -> Self {
        let mut stops = Self::empty();
        let mut col = 0;
        while col < MAX_TAB_COLS {
            stops.set(col);
            col += TAB_SIZE;
        }
        stops
    }

    pub fn set(&mut self, col: usize) {
        if col < MAX_TAB_COLS {
            self.bits[col / 64] |= 1 << (col % 64);
        }
    }

    pub fn clear(&mut self, col: usize) {
        if col < MAX_TAB_COLS {
            self.bits[col / 64] &= !(1 << (col % 64));
        }
    }

    pub fn clear_all(&mut self) {
        self.bits = [0; (MAX_TAB_COLS + 63) / 64];
    }

    pub fn is_set(&self, col: usize) -> bool {
        col < MAX_TAB_COLS && self.bits[col / 64] & (1 << (col % 64)) != 0
    }
}

/// State of one virtual console.
#[derive(Debug)]
pub struct Vconsole {
    /// Console index, 1..=NR_VCONSOLES (doubles as the device minor).
    pub index: usize,

    // Geometry. `lines` is the scrolling-region bottom (exclusive); the
    // full screen height is `screen_lines`. `top < lines <= screen_lines`.
    pub columns: usize,
    pub lines: usize,
    pub top: usize,
    pub screen_lines: usize,

    // Cursor. `check_x` is the deferred-wrap flag: set after writing into
    // the last column, consumed by the next printable byte.
    pub x: usize,
    pub y: usize,
    pub saved_x: usize,
    pub saved_y: usize,
    pub check_x: bool,
    pub cursor_visible: bool,

    // Attribute state. `color_attr` is the packed attribute applied to new
    // cells; the booleans are re-folded into it after every SGR sequence.
    pub color_attr: u16,
    pub bold: bool,
    pub blink: bool,
    pub reverse: bool,
    pub underline: bool,

    /// Escape-sequence machine for this console's output stream.
    pub parser: EscapeParser,

    pub tab_stops: TabStops,

    /// Text vs graphics mode; switches into a graphics console are refused
    /// and cursor updates are suppressed while in graphics mode.
    pub kd_mode: KdMode,
    /// Insert-mode shadow from `ESC[?4h/l`; recorded, never acted on.
    pub insert_mode: bool,

    /// VT_AUTO / VT_PROCESS handoff state.
    pub vt_mode: VtModeState,
    /// Deferred switch target while awaiting a VT_RELDISP acknowledgement.
    pub switchto: Option<usize>,

    pub led_status: LedFlags,
    pub scrlock: bool,
    pub numlock: bool,
    pub capslock: bool,

    pub flags: VcFlags,

    /// Off-screen mirror, `columns * screen_lines` cells.
    pub screen: Vec<Cell>,
    /// Framebuffer base address; `Some` iff this console has focus.
    pub vidmem: Option<usize>,

    /// Teletype endpoint bound to this console.
    pub tty: Tty,
}

impl Vconsole {
    pub fn new(index: usize, info: &VideoInfo) -> Self {
        Self {
            index,
            columns: info.columns,
            lines: info.lines,
            top: 0,
            screen_lines: info.lines,
            x: 0,
            y: 0,
            saved_x: 0,
            saved_y: 0,
            check_x: false,
            cursor_visible: true,
            color_attr: DEF_MODE,
            bold: false,
            blink: false,
            reverse: false,
            underline: false,
            parser: EscapeParser::new(),
            tab_stops: TabStops::default_stops(),
            kd_mode: KdMode::Text,
            insert_mode: false,
            vt_mode: VtModeState::auto(),
            switchto: None,
            led_status: LedFlags::empty(),
            scrlock: false,
            numlock: false,
            capslock: false,
            flags: VcFlags::empty(),
            screen: vec![Cell::blank(DEF_MODE); info.columns * info.lines],
            vidmem: None,
            tty: Tty::new(),
        }
    }

    #[inline]
    pub fn has_focus(&self) -> bool {
        self.flags.contains(VcFlags::HAS_FOCUS)
    }

    /// Clamp a cursor target into the valid range and store it. Columns
    /// clamp to `[0, columns)`; rows clamp into the scrolling region
    /// `[top, lines)`, so absolute positioning cannot escape a region set
    /// via `ESC[a;br`.
    pub fn adjust(&mut self, x: isize, y: isize) {
        self.x = x.clamp(0, self.columns as isize - 1) as usize;
        self.y = y.clamp(self.top as isize, self.lines as isize - 1) as usize;
    }

    pub fn save_cursor(&mut self) {
        self.saved_x = self.x;
        self.saved_y = self.y;
    }

    pub fn restore_cursor(&mut self) {
        self.x = self.saved_x;
        self.y = self.saved_y;
    }

    /// Restore the default attribute and clear the SGR booleans.
    pub fn default_color_attr(&mut self) {
        self.color_attr = DEF_MODE;
        self.bold = false;
        self.underline = false;
        self.blink = false;
        self.reverse = false;
    }

    /// Advance `x` to the next tab stop, bounded by the last column.
    pub fn forward_tab(&mut self) {
        while self.x < self.columns - 1 {
            self.x += 1;
            if self.tab_stops.is_set(self.x) {
                break;
            }
        }
    }

    /// Reset the VT handoff state to AUTO with no controlling process.
    pub fn reset_vt(&mut self) {
        self.vt_mode = VtModeState::auto();
        self.kd_mode = KdMode::Text;
        self.tty.pid = 0;
        self.switchto = None;
    }
}
