//! The console subsystem aggregate.
//!
//! Owns the virtual console table, the injected video backend, the
//! scrollback ring and the kernel service hooks. The TTY layer drives
//! output through [`ConsoleSubsystem::write`] / `process_output`, the
//! keyboard driver requests switches via [`ConsoleSubsystem::select`] and
//! scrollback viewing via the `scroll_view_*` entry points, and the VT/KD
//! ioctl surface lives in [`crate::vt`].
//!
//! Concurrency model: a single aggregate behind a lock; paths that touch
//! the framebuffer, the focused screen mirror or the scrollback ring run
//! inside [`crate::sync::without_interrupts`] because the cursor-blink
//! timer and keyboard IRQ share that state.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Write as _;

use spin::{Mutex, Once};

use crate::bell::{self, CalloutReq};
use crate::cell::{reverse_attr, ANSI_COLOR_TABLE, BLINK_BIT, BOLD_BIT};
use crate::dev::{DeviceRegistry, DeviceSpec, MinorSet, SYSCON_MAJOR, VCONSOLES_MAJOR};
use crate::error::{ConsoleError, ConsoleResult};
use crate::parser::{Step, MAX_PARMS};
use crate::scrollback::Scrollback;
use crate::sync;
use crate::tty::{Pid, Signal, Winsize};
use crate::vc::{LedFlags, TabStops, VcFlags, Vconsole};
use crate::video::{CursorMode, ScrollDir, VideoBackend, VideoFlags, VideoInfo};
use crate::vt::{KdMode, VtModeKind};

/// VT100-with-AVO identification, replied to `ESC Z` and `ESC [ c`.
const VT100_ID: &[u8] = b"\x1b[?1;2c";

/// Status-OK reply to `ESC [ 5 n`.
const DEVICE_OK: &[u8] = b"\x1b[0n";

/// Kernel services the subsystem depends on but does not own: signal
/// delivery for the VT_PROCESS handshake, keyboard LEDs, the line
/// discipline's input callback, writer wake-ups and the callout timer.
pub trait ConsoleServices: Send {
    /// Deliver `sig` to `pid`; `false` means the process is gone.
    fn kill_pid(&mut self, pid: Pid, sig: Signal) -> bool;

    /// Push the focused console's LED state to the keyboard.
    fn set_leds(&mut self, leds: LedFlags);

    /// Injected reply bytes are waiting on the console's read queue.
    fn input_ready(&mut self, console: usize);

    /// At least one output byte was drained; blocked writers may resume.
    fn wakeup_writers(&mut self);

    /// Register a one-shot timer.
    fn add_callout(&mut self, req: CalloutReq, expires_ticks: u32);
}

/// Process-wide console state, constructed once at boot.
pub struct ConsoleSubsystem {
    /// Console table; index 0 is the unbound kernel-log alias and is never
    /// focused, minors 1..=nr_consoles are real consoles.
    pub(crate) vcs: Vec<Vconsole>,
    pub(crate) backend: Box<dyn VideoBackend>,
    pub(crate) services: Box<dyn ConsoleServices>,
    pub(crate) scrollback: Scrollback,
    pub(crate) current: usize,
    nr_consoles: usize,
    devices: DeviceRegistry,
}

impl ConsoleSubsystem {
    /// Build the subsystem from the boot video description, register the
    /// console devices and focus console 1, adopting whatever cursor (and,
    /// in text mode, screen contents) the boot code left behind.
    pub fn new(
        info: VideoInfo,
        backend: Box<dyn VideoBackend>,
        services: Box<dyn ConsoleServices>,
        nr_consoles: usize,
    ) -> Self {
        let nr = nr_consoles.max(1);
        let mut vcs = Vec::with_capacity(nr + 1);
        for index in 0..=nr {
            vcs.push(Vconsole::new(index, &info));
        }

        let mut sub = Self {
            vcs,
            backend,
            services,
            scrollback: Scrollback::new(info.columns, info.lines),
            current: 1,
            nr_consoles: nr,
            devices: DeviceRegistry::new(),
        };

        if info.flags.contains(VideoFlags::VGA_TEXT) {
            log::info!(
                "console: {} {}x{} ({} virtual consoles)",
                info.signature,
                info.columns,
                info.lines,
                nr
            );
        } else {
            log::info!(
                "console: color frame buffer, screen={}x{} ({} virtual consoles)",
                info.columns,
                info.lines,
                nr
            );
        }

        for index in 1..=nr {
            sub.reset(index);
        }

        let address = sub.backend.info().address;
        {
            let vc = &mut sub.vcs[1];
            vc.vidmem = Some(address);
            vc.flags.insert(VcFlags::HAS_FOCUS);
        }
        sub.backend.show_cursor(&mut sub.vcs[1], CursorMode::On);
        sub.backend.adopt_screen(&mut sub.vcs[1]);
        sub.backend.get_curpos(&mut sub.vcs[1]);
        sub.backend.update_curpos(&sub.vcs[1]);
        {
            let vc = &sub.vcs[1];
            sub.scrollback.refresh(&vc.screen, vc.y);
        }

        let mut tty_minors = MinorSet::new();
        for minor in 0..=nr {
            tty_minors.set(minor);
        }
        sub.devices.register(DeviceSpec {
            name: "vconsole",
            major: VCONSOLES_MAJOR,
            minors: tty_minors,
        });
        let mut con_minors = MinorSet::new();
        con_minors.set(0);
        con_minors.set(1);
        sub.devices.register(DeviceSpec {
            name: "console",
            major: SYSCON_MAJOR,
            minors: con_minors,
        });

        sub
    }

    pub fn nr_consoles(&self) -> usize {
        self.nr_consoles
    }

    /// Index of the console that currently drives the display.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn vc(&self, index: usize) -> Option<&Vconsole> {
        if self.check_index(index).is_ok() {
            Some(&self.vcs[index])
        } else {
            None
        }
    }

    pub fn vc_mut(&mut self, index: usize) -> Option<&mut Vconsole> {
        if self.check_index(index).is_ok() {
            Some(&mut self.vcs[index])
        } else {
            None
        }
    }

    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub(crate) fn check_index(&self, index: usize) -> ConsoleResult<()> {
        if (1..=self.nr_consoles).contains(&index) {
            Ok(())
        } else {
            Err(ConsoleError::NoSuchConsole { index })
        }
    }

    // ---------------------------------------------------------------------
    // Output path
    // ---------------------------------------------------------------------

    /// Queue bytes on the console's write queue and drain them. Returns how
    /// many bytes were accepted; the remainder is the caller's to retry
    /// once writers are woken.
    pub fn write(&mut self, index: usize, bytes: &[u8]) -> ConsoleResult<usize> {
        self.check_index(index)?;
        let mut accepted = 0;
        for &ch in bytes {
            if self.vcs[index].tty.write_q.put(ch).is_err() {
                self.process_output(index);
                if self.vcs[index].tty.write_q.put(ch).is_err() {
                    break;
                }
            }
            accepted += 1;
        }
        self.process_output(index);
        Ok(accepted)
    }

    /// Drain the console's write queue through the escape parser. Stops
    /// while the console is scroll-locked; an incomplete escape sequence
    /// simply persists until the next drain.
    pub fn process_output(&mut self, index: usize) {
        if self.check_index(index).is_err() {
            return;
        }
        if self.vcs[index].has_focus() && self.scrollback.buf_top != 0 {
            sync::without_interrupts(|| self.snap_back(index));
        }

        let mut drained = false;
        loop {
            let vc = &mut self.vcs[index];
            if vc.scrlock {
                break;
            }
            let Some(ch) = vc.tty.write_q.get() else {
                break;
            };
            drained = true;
            match vc.parser.advance(ch) {
                Step::Echo(byte) => self.echo_char(index, byte),
                Step::Esc(final_byte) => self.esc_dispatch(index, final_byte),
                Step::Csi(final_byte) => self.csi_dispatch(index, final_byte),
                Step::Consumed => {}
            }
        }

        if drained {
            if self.vcs[index].kd_mode != KdMode::Graphics {
                self.backend.update_curpos(&self.vcs[index]);
            }
            self.services.wakeup_writers();
        }
    }

    fn echo_char(&mut self, index: usize, ch: u8) {
        sync::without_interrupts(|| self.echo_byte(index, ch));
    }

    fn echo_byte(&mut self, index: usize, ch: u8) {
        if self.vcs[index].has_focus() && self.scrollback.buf_top != 0 {
            self.snap_back(index);
        }

        match ch {
            0x00 => {}
            0x07 => bell::ring(&mut *self.services),
            0x08 => {
                let vc = &mut self.vcs[index];
                if vc.x > 0 {
                    vc.x -= 1;
                }
                vc.check_x = false;
            }
            b'\r' => {
                let vc = &mut self.vcs[index];
                vc.x = 0;
                vc.check_x = false;
            }
            b'\n' => {
                let vc = &mut self.vcs[index];
                vc.x = 0;
                vc.y += 1;
                vc.check_x = false;
                if vc.has_focus() {
                    self.scrollback.buf_y += 1;
                }
            }
            b'\t' => {
                let vc = &mut self.vcs[index];
                vc.forward_tab();
                // A tab leaves the wrap pending, like a printable in the
                // last column would.
                vc.check_x = true;
            }
            _ => {
                {
                    let vc = &mut self.vcs[index];
                    if vc.x == vc.columns - 1 && vc.check_x {
                        vc.x = 0;
                        vc.y += 1;
                        if vc.has_focus() {
                            self.scrollback.buf_y += 1;
                        }
                    }
                }
                if self.vcs[index].y >= self.vcs[index].lines {
                    self.scroll(index, 0, ScrollDir::Up);
                    self.vcs[index].y -= 1;
                }
                let vc = &mut self.vcs[index];
                self.backend.put_char(vc, ch);
                if vc.x < vc.columns - 1 {
                    vc.check_x = false;
                    vc.x += 1;
                } else {
                    vc.check_x = true;
                }
            }
        }

        // The cursor may have run past the region bottom.
        if self.vcs[index].y >= self.vcs[index].lines {
            self.scroll(index, 0, ScrollDir::Up);
            self.vcs[index].y -= 1;
        }
        if self.vcs[index].has_focus() && self.scrollback.buf_y >= self.scrollback.total_lines() {
            self.scrollback.roll();
            self.scrollback.buf_y -= 1;
        }
    }

    /// Scroll the region by one line, capturing the displaced top line
    /// into the scrollback ring when the console is focused.
    fn scroll(&mut self, index: usize, from_row: usize, dir: ScrollDir) {
        if dir == ScrollDir::Up && self.vcs[index].has_focus() {
            let vc = &self.vcs[index];
            let top = from_row.max(vc.top);
            if top < vc.lines {
                let from = top * vc.columns;
                let line = &vc.screen[from..from + vc.columns];
                self.scrollback.capture_scrolled_line(top, vc.y, line);
            }
        }
        self.backend.scroll_screen(&mut self.vcs[index], from_row, dir);
    }

    /// Line feed: scroll when already at the region bottom.
    fn lf(&mut self, index: usize) {
        if self.vcs[index].y == self.vcs[index].lines {
            self.scroll(index, 0, ScrollDir::Up);
        } else {
            self.vcs[index].y += 1;
        }
    }

    /// Reverse index: scroll down when at the region top.
    fn ri(&mut self, index: usize) {
        if self.vcs[index].y == self.vcs[index].top {
            self.scroll(index, 0, ScrollDir::Down);
        } else {
            self.vcs[index].y -= 1;
        }
    }

    // ---------------------------------------------------------------------
    // Escape dispatch
    // ---------------------------------------------------------------------

    fn esc_dispatch(&mut self, index: usize, final_byte: u8) {
        self.vcs[index].check_x = false;
        match final_byte {
            b'7' => self.vcs[index].save_cursor(),
            b'8' => self.vcs[index].restore_cursor(),
            b'D' => self.lf(index),
            b'E' => {
                self.vcs[index].x = 0;
                self.lf(index);
            }
            b'H' => {
                let vc = &mut self.vcs[index];
                let col = vc.x;
                vc.tab_stops.set(col);
            }
            b'M' => self.ri(index),
            b'Z' => self.insert_seq(index, VT100_ID),
            b'c' => {
                self.reset(index);
                let vc = &mut self.vcs[index];
                vc.x = 0;
                vc.y = 0;
                self.csi_j(index, 2);
            }
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, index: usize, final_byte: u8) {
        self.vcs[index].check_x = false;
        // Snapshot of the parser registers; the live parser is already back
        // in ground and will be reset by the next ESC.
        let p = self.vcs[index].parser.clone();
        match final_byte {
            b'@' => {
                let count = p.parmv1_or(1).min(self.vcs[index].columns as u32);
                for _ in 0..count {
                    self.backend.insert_char(&mut self.vcs[index]);
                }
            }
            b'A' => {
                let n = p.parmv1_or(1) as isize;
                let vc = &mut self.vcs[index];
                vc.adjust(vc.x as isize, vc.y as isize - n);
            }
            b'B' => {
                let n = p.parmv1_or(1) as isize;
                let vc = &mut self.vcs[index];
                vc.adjust(vc.x as isize, vc.y as isize + n);
            }
            b'C' => {
                let n = p.parmv1_or(1) as isize;
                let vc = &mut self.vcs[index];
                vc.adjust(vc.x as isize + n, vc.y as isize);
            }
            b'D' => {
                let n = p.parmv1_or(1) as isize;
                let vc = &mut self.vcs[index];
                vc.adjust(vc.x as isize - n, vc.y as isize);
            }
            b'E' => {
                let n = p.parmv1_or(1) as isize;
                let vc = &mut self.vcs[index];
                vc.adjust(0, vc.y as isize + n);
            }
            b'F' => {
                let n = p.parmv1_or(1) as isize;
                let vc = &mut self.vcs[index];
                vc.adjust(0, vc.y as isize - n);
            }
            b'G' | b'`' => {
                let col = p.parmv1.saturating_sub(1) as isize;
                let vc = &mut self.vcs[index];
                vc.adjust(col, vc.y as isize);
            }
            b'H' | b'f' => {
                let row = p.parmv1.saturating_sub(1) as isize;
                let col = p.parmv2.saturating_sub(1) as isize;
                self.vcs[index].adjust(col, row);
            }
            b'I' => {
                let n = p.parmv1_or(1);
                let vc = &mut self.vcs[index];
                for _ in 0..n {
                    vc.forward_tab();
                }
                let (x, y) = (vc.x as isize, vc.y as isize);
                vc.adjust(x, y);
            }
            b'J' => self.csi_j(index, p.parmv1),
            b'K' => self.csi_k(index, p.parmv1),
            b'L' => {
                let count = self.clip_region_lines(index, p.parmv1_or(1));
                for _ in 0..count {
                    let row = self.vcs[index].y;
                    self.scroll(index, row, ScrollDir::Down);
                }
            }
            b'M' => {
                let count = self.clip_region_lines(index, p.parmv1_or(1));
                for _ in 0..count {
                    let row = self.vcs[index].y;
                    self.scroll(index, row, ScrollDir::Up);
                }
            }
            b'P' => {
                let count = p.parmv1_or(1).min(self.vcs[index].columns as u32);
                for _ in 0..count {
                    self.backend.delete_char(&mut self.vcs[index]);
                }
            }
            b'S' => {
                for _ in 0..p.parmv1_or(1) {
                    self.scroll(index, 0, ScrollDir::Up);
                }
            }
            b'T' => {
                for _ in 0..p.parmv1_or(1) {
                    self.scroll(index, 0, ScrollDir::Down);
                }
            }
            b'X' => {
                let vc = &mut self.vcs[index];
                let avail = (vc.columns - vc.x) as u32;
                let count = p.parmv1_or(1).min(avail) as usize;
                let from = vc.y * vc.columns + vc.x;
                let attr = vc.color_attr;
                self.backend.write_screen(vc, from, count, attr);
            }
            b'c' => {
                if !p.saw_digit {
                    self.insert_seq(index, VT100_ID);
                }
            }
            b'd' => {
                let row = p.parmv1.saturating_sub(1) as isize;
                let vc = &mut self.vcs[index];
                vc.adjust(vc.x as isize, row);
            }
            b'g' => {
                let vc = &mut self.vcs[index];
                match p.parmv1 {
                    0 => {
                        let col = vc.x;
                        vc.tab_stops.clear(col);
                    }
                    3 | 5 => vc.tab_stops.clear_all(),
                    _ => {}
                }
            }
            b'h' => {
                if p.question {
                    match p.parmv1 {
                        25 => self.backend.show_cursor(&mut self.vcs[index], CursorMode::On),
                        4 => self.vcs[index].insert_mode = true,
                        _ => {}
                    }
                }
            }
            b'l' => {
                if p.question {
                    match p.parmv1 {
                        25 => self.backend.show_cursor(&mut self.vcs[index], CursorMode::Off),
                        4 => self.vcs[index].insert_mode = false,
                        _ => {}
                    }
                }
            }
            b'm' => self.csi_m(index),
            b'n' => {
                if !p.question {
                    match p.parmv1 {
                        5 => self.insert_seq(index, DEVICE_OK),
                        6 => self.report_cursor(index),
                        _ => {}
                    }
                }
            }
            b'r' => {
                let vc = &mut self.vcs[index];
                let top = p.parmv1_or(1) as usize;
                let bottom = p.parmv2_or(vc.screen_lines as u32) as usize;
                if top < bottom && bottom <= vc.screen_lines {
                    vc.top = top - 1;
                    vc.lines = bottom;
                    vc.adjust(0, 0);
                }
            }
            b's' => self.vcs[index].save_cursor(),
            b'u' => self.vcs[index].restore_cursor(),
            _ => {
                log::trace!("console{}: dropped CSI final {:#04x}", index, final_byte);
            }
        }
    }

    /// Cap an insert/delete-lines count at the region height.
    fn clip_region_lines(&self, index: usize, count: u32) -> u32 {
        let vc = &self.vcs[index];
        count.min((vc.lines - vc.top) as u32)
    }

    /// Erase in display.
    fn csi_j(&mut self, index: usize, mode: u32) {
        let (columns, x, y, attr, screen_size) = {
            let vc = &self.vcs[index];
            (
                vc.columns,
                vc.x,
                vc.y,
                vc.color_attr,
                vc.columns * vc.screen_lines,
            )
        };
        match mode {
            0 => {
                self.backend
                    .write_screen(&mut self.vcs[index], y * columns + x, columns - x, attr);
                let from = (y + 1) * columns;
                let count = screen_size.saturating_sub(from);
                self.backend.write_screen(&mut self.vcs[index], from, count, attr);
            }
            1 => {
                self.backend
                    .write_screen(&mut self.vcs[index], y * columns, x + 1, attr);
                self.backend.write_screen(&mut self.vcs[index], 0, y * columns, attr);
            }
            2 => {
                self.backend.write_screen(&mut self.vcs[index], 0, screen_size, attr);
            }
            _ => {}
        }
    }

    /// Erase in line.
    fn csi_k(&mut self, index: usize, mode: u32) {
        let (columns, x, y, attr) = {
            let vc = &self.vcs[index];
            (vc.columns, vc.x, vc.y, vc.color_attr)
        };
        let (from, count) = match mode {
            0 => (y * columns + x, columns - x),
            1 => (y * columns, x + 1),
            2 => (y * columns, columns),
            _ => return,
        };
        self.backend.write_screen(&mut self.vcs[index], from, count, attr);
    }

    /// Select graphic rendition: fold the parameter list into the packed
    /// attribute, working from an un-reversed baseline.
    fn csi_m(&mut self, index: usize) {
        let vc = &mut self.vcs[index];
        if vc.reverse {
            vc.color_attr = reverse_attr(vc.color_attr);
        }
        let count = (vc.parser.nparms + 1).min(MAX_PARMS);
        for slot in 0..count {
            match vc.parser.parms[slot] {
                0 => vc.default_color_attr(),
                1 => vc.bold = true,
                5 => vc.blink = true,
                7 => vc.reverse = true,
                21 | 22 => vc.bold = false,
                25 => vc.blink = false,
                27 => vc.reverse = false,
                param @ 30..=37 => {
                    vc.color_attr =
                        (vc.color_attr & 0xF8FF) | ANSI_COLOR_TABLE[(param - 30) as usize];
                }
                38 | 39 => {} // default-foreground variants: recognised, ignored
                param @ 40..=47 => {
                    vc.color_attr =
                        (vc.color_attr & 0x8FFF) | (ANSI_COLOR_TABLE[(param - 40) as usize] << 4);
                }
                48 | 49 => {} // default-background variants: recognised, ignored
                _ => {}
            }
        }
        if vc.bold {
            vc.color_attr |= BOLD_BIT;
        } else {
            vc.color_attr &= !BOLD_BIT;
        }
        if vc.blink {
            vc.color_attr |= BLINK_BIT;
        } else {
            vc.color_attr &= !BLINK_BIT;
        }
        if vc.reverse {
            vc.color_attr = reverse_attr(vc.color_attr);
        }
    }

    // ---------------------------------------------------------------------
    // Response injection
    // ---------------------------------------------------------------------

    /// Push reply bytes onto the console's read queue, as if typed, and
    /// kick the line discipline.
    fn insert_seq(&mut self, index: usize, seq: &[u8]) {
        let tty = &mut self.vcs[index].tty;
        for &ch in seq {
            let _ = tty.read_q.put(ch);
        }
        self.services.input_ready(index);
    }

    /// `ESC [ 6 n`: report the raw 0-based cursor position.
    fn report_cursor(&mut self, index: usize) {
        let (x, y) = {
            let vc = &self.vcs[index];
            (vc.x, vc.y)
        };
        let mut seq = SeqBuf::new();
        let _ = write!(seq, "\x1b[{};{}R", y, x);
        self.insert_seq(index, seq.as_bytes());
    }

    // ---------------------------------------------------------------------
    // Reset
    // ---------------------------------------------------------------------

    /// Return a console to its boot state: full-screen region, default
    /// attribute, cleared parser and locks, default tab stops, VT_AUTO,
    /// KD_TEXT, winsize republished to the line discipline.
    pub fn reset(&mut self, index: usize) {
        if self.check_index(index).is_err() {
            return;
        }
        let info = self.backend.info();
        {
            let vc = &mut self.vcs[index];
            vc.top = 0;
            vc.lines = info.lines;
            vc.columns = info.columns;
            vc.screen_lines = info.lines;
            vc.check_x = false;
            vc.led_status = LedFlags::empty();
            vc.scrlock = false;
            vc.numlock = false;
            vc.capslock = false;
            vc.parser.reset();
            vc.default_color_attr();
            vc.insert_mode = false;
            vc.saved_x = 0;
            vc.saved_y = 0;
            vc.tab_stops = TabStops::default_stops();
            vc.tty.winsize = Winsize {
                ws_row: (vc.lines - vc.top) as u16,
                ws_col: vc.columns as u16,
                ws_xpixel: 0,
                ws_ypixel: 0,
            };
            vc.reset_vt();
            vc.flags.remove(VcFlags::BLANKED);
        }
        self.services.set_leds(LedFlags::empty());
        self.backend.update_curpos(&self.vcs[index]);
    }

    // ---------------------------------------------------------------------
    // Console switching
    // ---------------------------------------------------------------------

    /// Request a switch to `new_cons` (keyboard or VT_ACTIVATE path).
    ///
    /// In VT_PROCESS mode the controlling process is signalled and the
    /// switch deferred until it answers via VT_RELDISP; if the process is
    /// gone the console falls back to AUTO and the switch proceeds. A
    /// target in graphics mode refuses silently.
    pub fn select(&mut self, new_cons: usize) {
        if self.check_index(new_cons).is_err() || new_cons == self.current {
            return;
        }
        let cur = self.current;
        if self.vcs[cur].vt_mode.mode == VtModeKind::Process {
            let pid = self.vcs[cur].tty.pid;
            // Historical quirk kept for compatibility: acqsig is delivered
            // on the release path as well; relsig is carried but unused.
            let sig = self.vcs[cur].vt_mode.acqsig;
            if self.services.kill_pid(pid, sig) {
                self.vcs[cur].switchto = Some(new_cons);
                log::debug!("console: switch {} -> {} deferred on pid {}", cur, new_cons, pid);
                return;
            }
            self.vcs[cur].reset_vt();
        }
        if self.vcs[new_cons].kd_mode == KdMode::Graphics {
            return;
        }
        self.select_final(new_cons);
    }

    /// Execute the switch once permitted (directly for AUTO, via the
    /// VT_RELDISP acknowledgement for PROCESS).
    pub fn select_final(&mut self, new_cons: usize) {
        if self.check_index(new_cons).is_err() || new_cons == self.current {
            return;
        }
        sync::without_interrupts(|| self.do_select_final(new_cons));
    }

    fn do_select_final(&mut self, new_cons: usize) {
        let cur = self.current;

        if self.vcs[new_cons].vt_mode.mode == VtModeKind::Process {
            let pid = self.vcs[new_cons].tty.pid;
            let sig = self.vcs[new_cons].vt_mode.acqsig;
            if !self.services.kill_pid(pid, sig) {
                self.vcs[new_cons].reset_vt();
            }
        }

        if self.scrollback.buf_top != 0 {
            self.scrollback.buf_top = 0;
            self.backend.show_cursor(&mut self.vcs[cur], CursorMode::On);
            self.backend.update_curpos(&self.vcs[cur]);
        }

        self.vcs[cur].vidmem = None;
        self.vcs[cur].flags.remove(VcFlags::HAS_FOCUS);
        let address = self.backend.info().address;
        self.vcs[new_cons].vidmem = Some(address);
        self.vcs[new_cons].flags.insert(VcFlags::HAS_FOCUS);

        self.backend.restore_screen(&self.vcs[new_cons]);
        self.current = new_cons;
        let leds = self.vcs[new_cons].led_status;
        self.services.set_leds(leds);
        self.backend.update_curpos(&self.vcs[new_cons]);
        {
            let vc = &self.vcs[new_cons];
            self.scrollback.refresh(&vc.screen, vc.y);
        }
        self.backend.show_cursor(&mut self.vcs[new_cons], CursorMode::Cond);
        self.backend.cursor_blink(&self.vcs[new_cons]);
        log::debug!("console: switched {} -> {}", cur, new_cons);
    }

    // ---------------------------------------------------------------------
    // Scroll lock, blanking, scrollback viewing (keyboard entry points)
    // ---------------------------------------------------------------------

    /// Resume output (^Q / scroll-lock released).
    pub fn start(&mut self, index: usize) {
        if self.check_index(index).is_err() || !self.vcs[index].scrlock {
            return;
        }
        let vc = &mut self.vcs[index];
        vc.led_status.remove(LedFlags::SCRLOCK);
        vc.scrlock = false;
        let leds = vc.led_status;
        self.services.set_leds(leds);
    }

    /// Freeze output (^S / scroll-lock engaged).
    pub fn stop(&mut self, index: usize) {
        if self.check_index(index).is_err() || self.vcs[index].scrlock {
            return;
        }
        let vc = &mut self.vcs[index];
        vc.led_status.insert(LedFlags::SCRLOCK);
        vc.scrlock = true;
        let leds = vc.led_status;
        self.services.set_leds(leds);
    }

    /// Blank the display, leaving the mirror intact.
    pub fn blank(&mut self, index: usize) {
        if self.check_index(index).is_err() || self.vcs[index].flags.contains(VcFlags::BLANKED) {
            return;
        }
        self.backend.blank_screen(&self.vcs[index]);
        self.backend.show_cursor(&mut self.vcs[index], CursorMode::Off);
        self.vcs[index].flags.insert(VcFlags::BLANKED);
    }

    /// Restore a blanked display from the mirror.
    pub fn unblank(&mut self, index: usize) {
        if self.check_index(index).is_err() || !self.vcs[index].flags.contains(VcFlags::BLANKED) {
            return;
        }
        self.backend.restore_screen(&self.vcs[index]);
        self.vcs[index].flags.remove(VcFlags::BLANKED);
        self.backend.show_cursor(&mut self.vcs[index], CursorMode::On);
    }

    /// View older scrollback (half a screen per step).
    pub fn scroll_view_up(&mut self, index: usize) {
        if self.check_index(index).is_err()
            || !self.vcs[index].has_focus()
            || self.vcs[index].kd_mode == KdMode::Graphics
        {
            return;
        }
        sync::without_interrupts(|| {
            let (screen_lines, y) = {
                let vc = &self.vcs[index];
                (vc.screen_lines, vc.y)
            };
            let screen_start = self.scrollback.buf_y.saturating_sub(y);
            let new_top = (self.scrollback.buf_top + screen_lines / 2).min(screen_start);
            if new_top == self.scrollback.buf_top {
                return;
            }
            if self.scrollback.buf_top == 0 {
                self.backend.show_cursor(&mut self.vcs[index], CursorMode::Off);
            }
            self.scrollback.buf_top = new_top;
            let first = screen_start - new_top;
            let view = self.scrollback.view(first, screen_lines);
            self.backend.show_view(&self.vcs[index], view);
        });
    }

    /// Move the scrollback view toward the live screen.
    pub fn scroll_view_down(&mut self, index: usize) {
        if self.check_index(index).is_err()
            || !self.vcs[index].has_focus()
            || self.scrollback.buf_top == 0
        {
            return;
        }
        sync::without_interrupts(|| {
            let (screen_lines, y) = {
                let vc = &self.vcs[index];
                (vc.screen_lines, vc.y)
            };
            let new_top = self.scrollback.buf_top.saturating_sub(screen_lines / 2);
            self.scrollback.buf_top = new_top;
            if new_top == 0 {
                self.backend.restore_screen(&self.vcs[index]);
                self.backend.show_cursor(&mut self.vcs[index], CursorMode::On);
                self.backend.update_curpos(&self.vcs[index]);
            } else {
                let screen_start = self.scrollback.buf_y.saturating_sub(y);
                let first = screen_start - new_top;
                let view = self.scrollback.view(first, screen_lines);
                self.backend.show_view(&self.vcs[index], view);
            }
        });
    }

    /// Leave scrollback viewing: any write or switch lands on the live
    /// screen, never on history.
    fn snap_back(&mut self, index: usize) {
        if self.scrollback.buf_top == 0 {
            return;
        }
        self.scrollback.buf_top = 0;
        self.backend.restore_screen(&self.vcs[index]);
        self.backend.show_cursor(&mut self.vcs[index], CursorMode::On);
        self.backend.update_curpos(&self.vcs[index]);
    }

    // ---------------------------------------------------------------------
    // Kernel log
    // ---------------------------------------------------------------------

    /// Flush kernel log bytes through the system console alias. A full
    /// write queue is drained synchronously and the byte retried until
    /// accepted.
    pub fn flush_log_buf(&mut self, buf: &[u8]) {
        let index = self.current;
        for &ch in buf {
            loop {
                if self.vcs[index].tty.write_q.put(ch).is_ok() {
                    break;
                }
                self.process_output(index);
            }
        }
        self.process_output(index);
    }
}

/// Stack buffer for short reply sequences (no heap after init).
struct SeqBuf {
    buf: [u8; 16],
    len: usize,
}

impl SeqBuf {
    fn new() -> Self {
        Self {
            buf: [0; 16],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl core::fmt::Write for SeqBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for &ch in s.as_bytes() {
            if self.len < self.buf.len() {
                self.buf[self.len] = ch;
                self.len += 1;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Global instance
// ---------------------------------------------------------------------------

static CONSOLE: Once<Mutex<ConsoleSubsystem>> = Once::new();

/// Park the boot-constructed subsystem for the IRQ and TTY entry points.
/// Later calls are ignored; tests construct private aggregates instead.
pub fn init_global(subsystem: ConsoleSubsystem) {
    CONSOLE.call_once(|| Mutex::new(subsystem));
}

/// The global subsystem, if `init_global` has run.
pub fn global() -> ConsoleResult<&'static Mutex<ConsoleSubsystem>> {
    CONSOLE.get().ok_or(ConsoleError::NotInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Cell, COLOR_RED, DEF_MODE};
    use crate::testing::test_console;
    use crate::video::mock::MockEvent;
    use crate::vt::{IoctlArg, VtModeState, VT_RELDISP};

    fn cell_at(con: &ConsoleSubsystem, index: usize, x: usize, y: usize) -> Cell {
        let vc = con.vc(index).unwrap();
        vc.screen[y * vc.columns + x]
    }

    fn cursor(con: &ConsoleSubsystem, index: usize) -> (usize, usize) {
        let vc = con.vc(index).unwrap();
        (vc.x, vc.y)
    }

    fn drain_read_q(con: &mut ConsoleSubsystem, index: usize) -> Vec<u8> {
        let tty = &mut con.vc_mut(index).unwrap().tty;
        let mut out = Vec::new();
        while let Some(ch) = tty.read_q.get() {
            out.push(ch);
        }
        out
    }

    fn process_mode(acqsig: Signal) -> VtModeState {
        VtModeState {
            mode: VtModeKind::Process,
            waitv: 0,
            relsig: 1,
            acqsig,
            frsig: 0,
        }
    }

    #[test]
    fn plain_text_lands_in_cells() {
        let (mut con, svc, _ev) = test_console(2);
        con.write(1, b"Hi\n").unwrap();
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b'H');
        assert_eq!(cell_at(&con, 1, 1, 0).glyph(), b'i');
        assert_eq!(cursor(&con, 1), (0, 1));
        assert!(svc.log().wakeups >= 1);
    }

    #[test]
    fn erase_display_then_home() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"junk junk junk").unwrap();
        con.write(1, b"\x1b[2J\x1b[HX").unwrap();
        for y in 0..25 {
            for x in 0..80 {
                if (x, y) == (0, 0) {
                    continue;
                }
                assert_eq!(cell_at(&con, 1, x, y), Cell::blank(DEF_MODE), "({}, {})", x, y);
            }
        }
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b'X');
        assert_eq!(cursor(&con, 1), (1, 0));
    }

    #[test]
    fn sgr_bold_red_then_reset() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1b[1;31mERR\x1b[0m.").unwrap();
        for (x, glyph) in [b'E', b'R', b'R'].into_iter().enumerate() {
            let cell = cell_at(&con, 1, x, 0);
            assert_eq!(cell.glyph(), glyph);
            assert_eq!(cell.attr(), COLOR_RED | BOLD_BIT);
        }
        let dot = cell_at(&con, 1, 3, 0);
        assert_eq!(dot.glyph(), b'.');
        assert_eq!(dot.attr(), DEF_MODE);
    }

    #[test]
    fn scroll_region_confines_output() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1b[4;10r\x1b[HA\nB\nC").unwrap();
        assert_eq!(cell_at(&con, 1, 0, 3).glyph(), b'A');
        assert_eq!(cell_at(&con, 1, 0, 4).glyph(), b'B');
        assert_eq!(cell_at(&con, 1, 0, 5).glyph(), b'C');
        for y in (0..3).chain(10..25) {
            for x in 0..80 {
                assert_eq!(cell_at(&con, 1, x, y), Cell::blank(DEF_MODE), "({}, {})", x, y);
            }
        }
    }

    #[test]
    fn tabs_advance_to_default_stops() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\t\t").unwrap();
        assert_eq!(cursor(&con, 1), (16, 0));
    }

    #[test]
    fn cursor_position_report() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1b[8;5H").unwrap();
        assert_eq!(cursor(&con, 1), (4, 7));
        con.write(1, b"\x1b[6n").unwrap();
        assert_eq!(drain_read_q(&mut con, 1), b"\x1b[7;4R");
    }

    #[test]
    fn cursor_stays_clamped() {
        let (mut con, _svc, _ev) = test_console(1);
        let sequences: [&[u8]; 10] = [
            b"\x1b[999A",
            b"\x1b[999B",
            b"\x1b[999C",
            b"\x1b[999D",
            b"\x1b[999;999H",
            b"\x1b[0;0H",
            b"\x1b[999E",
            b"\x1b[999F",
            b"\x1b[999G",
            b"\x1b[999d",
        ];
        for seq in sequences {
            con.write(1, seq).unwrap();
            let (x, y) = cursor(&con, 1);
            assert!(x < 80 && y < 25, "escaped bounds after {:?}", seq);
        }
        con.write(1, b"\x1b[999;999H").unwrap();
        assert_eq!(cursor(&con, 1), (79, 24));
        con.write(1, b"\x1b[0;0H").unwrap();
        assert_eq!(cursor(&con, 1), (0, 0));
    }

    #[test]
    fn deferred_wrap_holds_the_last_column() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, &[b'x'; 80]).unwrap();
        {
            let vc = con.vc(1).unwrap();
            assert_eq!((vc.x, vc.y), (79, 0));
            assert!(vc.check_x);
        }
        con.write(1, b"y").unwrap();
        assert_eq!(cursor(&con, 1), (1, 1));
        assert_eq!(cell_at(&con, 1, 0, 1).glyph(), b'y');
    }

    #[test]
    fn deferred_wrap_at_bottom_scrolls_once() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1b[25;80Ha").unwrap();
        {
            let vc = con.vc(1).unwrap();
            assert_eq!((vc.x, vc.y), (79, 24));
            assert!(vc.check_x);
        }
        con.write(1, b"b").unwrap();
        assert_eq!(cursor(&con, 1), (1, 24));
        assert_eq!(cell_at(&con, 1, 0, 24).glyph(), b'b');
        // The 'a' line moved up with the scroll.
        assert_eq!(cell_at(&con, 1, 79, 23).glyph(), b'a');
    }

    #[test]
    fn erase_screen_is_idempotent() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1b[31msome text to erase").unwrap();
        con.write(1, b"\x1b[2J").unwrap();
        let first = con.vc(1).unwrap().screen.clone();
        con.write(1, b"\x1b[2J").unwrap();
        assert_eq!(con.vc(1).unwrap().screen, first);
        let attr = con.vc(1).unwrap().color_attr;
        assert!(first.iter().all(|&cell| cell == Cell::blank(attr)));
    }

    #[test]
    fn save_restore_round_trips() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1b[10;20H\x1b7\x1b[3;4H").unwrap();
        assert_eq!(cursor(&con, 1), (3, 2));
        con.write(1, b"\x1b8").unwrap();
        assert_eq!(cursor(&con, 1), (19, 9));

        con.write(1, b"\x1b[s\x1b[1;1H").unwrap();
        assert_eq!(cursor(&con, 1), (0, 0));
        con.write(1, b"\x1b[u").unwrap();
        assert_eq!(cursor(&con, 1), (19, 9));
    }

    #[test]
    fn reverse_video_folds_from_unreversed_baseline() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1b[7m").unwrap();
        let reversed = con.vc(1).unwrap().color_attr;
        assert_ne!(reversed, DEF_MODE);
        // A second SGR 7 re-derives the same packed attribute instead of
        // swapping twice.
        con.write(1, b"\x1b[7m").unwrap();
        assert_eq!(con.vc(1).unwrap().color_attr, reversed);
        con.write(1, b"\x1b[27m").unwrap();
        assert_eq!(con.vc(1).unwrap().color_attr, DEF_MODE);
    }

    #[test]
    fn focus_is_exclusive_across_switches() {
        let (mut con, _svc, _ev) = test_console(4);
        for target in [2usize, 3, 1, 4, 4, 2] {
            con.select(target);
            let current = con.current_index();
            for index in 1..=4 {
                let vc = con.vc(index).unwrap();
                assert_eq!(vc.has_focus(), index == current, "console {}", index);
                assert_eq!(vc.vidmem.is_some(), index == current, "console {}", index);
            }
        }
    }

    #[test]
    fn scrolled_out_line_reaches_the_ring() {
        let (mut con, _svc, _ev) = test_console(1);
        for i in 0..25u8 {
            con.write(1, &[b'A' + i, b'\n']).unwrap();
        }
        // The 25th newline scrolled the 'A' row out.
        assert_eq!(con.scrollback().line(0)[0].glyph(), b'A');
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b'B');

        con.write(1, b"Z\n").unwrap();
        assert_eq!(con.scrollback().line(1)[0].glyph(), b'B');
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b'C');
    }

    #[test]
    fn replies_keep_interrogation_order() {
        let (mut con, svc, _ev) = test_console(1);
        con.write(1, b"\x1b[5nABC\x1b[6n").unwrap();
        assert_eq!(drain_read_q(&mut con, 1), b"\x1b[0n\x1b[0;3R");
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b'A');
        assert_eq!(cell_at(&con, 1, 2, 0).glyph(), b'C');
        assert_eq!(svc.log().inputs, vec![1, 1]);
    }

    #[test]
    fn device_id_injection() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1bZ").unwrap();
        assert_eq!(drain_read_q(&mut con, 1), b"\x1b[?1;2c");
        con.write(1, b"\x1b[c").unwrap();
        assert_eq!(drain_read_q(&mut con, 1), b"\x1b[?1;2c");
        // A numeric prefix suppresses the reply.
        con.write(1, b"\x1b[0c").unwrap();
        assert!(drain_read_q(&mut con, 1).is_empty());
    }

    #[test]
    fn scroll_lock_freezes_the_write_queue() {
        let (mut con, svc, _ev) = test_console(1);
        con.stop(1);
        assert!(svc.log().leds.last().unwrap().contains(LedFlags::SCRLOCK));
        con.write(1, b"X").unwrap();
        assert_eq!(cell_at(&con, 1, 0, 0), Cell::blank(DEF_MODE));

        con.start(1);
        con.process_output(1);
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b'X');
        assert!(!svc.log().leds.last().unwrap().contains(LedFlags::SCRLOCK));
    }

    #[test]
    fn process_mode_defers_until_reldisp_ack() {
        let (mut con, svc, _ev) = test_console(3);
        {
            let vc = con.vc_mut(1).unwrap();
            vc.vt_mode = process_mode(10);
            vc.tty.pid = 77;
        }
        con.select(2);
        assert_eq!(con.current_index(), 1);
        assert_eq!(con.vc(1).unwrap().switchto, Some(2));
        assert_eq!(svc.log().signals.last().copied(), Some((77, 10)));

        con.ioctl(1, VT_RELDISP, IoctlArg::Int(1), 77).unwrap();
        assert_eq!(con.current_index(), 2);
        assert_eq!(con.vc(1).unwrap().switchto, None);
    }

    #[test]
    fn process_mode_refusal_cancels_the_switch() {
        let (mut con, _svc, _ev) = test_console(3);
        {
            let vc = con.vc_mut(1).unwrap();
            vc.vt_mode = process_mode(10);
            vc.tty.pid = 77;
        }
        con.select(3);
        assert_eq!(con.vc(1).unwrap().switchto, Some(3));
        con.ioctl(1, VT_RELDISP, IoctlArg::Int(0), 77).unwrap();
        assert_eq!(con.vc(1).unwrap().switchto, None);
        assert_eq!(con.current_index(), 1);
    }

    #[test]
    fn dead_controlling_process_coerces_to_auto() {
        let (mut con, svc, _ev) = test_console(3);
        {
            let vc = con.vc_mut(1).unwrap();
            vc.vt_mode = process_mode(10);
            vc.tty.pid = 77;
        }
        svc.set_deliverable(false);
        con.select(2);
        assert_eq!(con.current_index(), 2);
        let old = con.vc(1).unwrap();
        assert_eq!(old.vt_mode.mode, VtModeKind::Auto);
        assert_eq!(old.tty.pid, 0);
    }

    #[test]
    fn acquiring_process_console_is_signalled() {
        let (mut con, svc, _ev) = test_console(3);
        {
            let vc = con.vc_mut(2).unwrap();
            vc.vt_mode = process_mode(12);
            vc.tty.pid = 88;
        }
        con.select(2);
        assert_eq!(con.current_index(), 2);
        // acqsig goes to the incoming console's controlling process too.
        assert_eq!(svc.log().signals.last().copied(), Some((88, 12)));
    }

    #[test]
    fn graphics_target_refuses_switch() {
        let (mut con, _svc, _ev) = test_console(3);
        con.vc_mut(2).unwrap().kd_mode = KdMode::Graphics;
        con.select(2);
        assert_eq!(con.current_index(), 1);
        con.select(3);
        assert_eq!(con.current_index(), 3);
    }

    #[test]
    fn switch_does_not_truncate_an_open_sequence() {
        let (mut con, _svc, _ev) = test_console(2);
        con.write(1, b"\x1b[3").unwrap();
        con.select(2);
        con.select(1);
        con.write(1, b"1m").unwrap();
        assert_eq!(con.vc(1).unwrap().color_attr, COLOR_RED);
    }

    #[test]
    fn full_reset_clears_everything() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1b[5;31m\x1b[4;10rXYZ\x1b[?4h").unwrap();
        con.write(1, b"\x1bc").unwrap();
        let vc = con.vc(1).unwrap();
        assert_eq!(vc.color_attr, DEF_MODE);
        assert_eq!((vc.top, vc.lines), (0, 25));
        assert_eq!((vc.x, vc.y), (0, 0));
        assert_eq!(vc.vt_mode.mode, VtModeKind::Auto);
        assert!(!vc.insert_mode);
        assert!(vc.screen.iter().all(|&cell| cell == Cell::blank(DEF_MODE)));
        assert_eq!(vc.tty.winsize.ws_row, 25);
        assert_eq!(vc.tty.winsize.ws_col, 80);
    }

    #[test]
    fn insert_and_delete_characters() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"ABCD\x1b[1;2H\x1b[2@").unwrap();
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b'A');
        assert_eq!(cell_at(&con, 1, 1, 0).glyph(), b' ');
        assert_eq!(cell_at(&con, 1, 2, 0).glyph(), b' ');
        assert_eq!(cell_at(&con, 1, 3, 0).glyph(), b'B');
        assert_eq!(cell_at(&con, 1, 5, 0).glyph(), b'D');

        con.write(1, b"\x1b[2P").unwrap();
        assert_eq!(cell_at(&con, 1, 1, 0).glyph(), b'B');
        assert_eq!(cell_at(&con, 1, 3, 0).glyph(), b'D');
    }

    #[test]
    fn insert_and_delete_lines() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"one\r\ntwo\r\nthree").unwrap();
        con.write(1, b"\x1b[1;1H\x1b[1M").unwrap();
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b't');
        assert_eq!(cell_at(&con, 1, 1, 0).glyph(), b'w');
        assert_eq!(cell_at(&con, 1, 0, 1).glyph(), b't');
        assert_eq!(cell_at(&con, 1, 2, 1).glyph(), b'r');

        con.write(1, b"\x1b[1L").unwrap();
        assert_eq!(cell_at(&con, 1, 0, 0), Cell::blank(DEF_MODE));
        assert_eq!(cell_at(&con, 1, 0, 1).glyph(), b't');
        assert_eq!(cell_at(&con, 1, 1, 1).glyph(), b'w');
    }

    #[test]
    fn line_ops_clip_to_the_region() {
        let (mut con, _svc, _ev) = test_console(1);
        for _ in 0..24 {
            con.write(1, b"x\r\n").unwrap();
        }
        con.write(1, b"x").unwrap();
        con.write(1, b"\x1b[4;10r\x1b[H\x1b[99L").unwrap();
        for y in 3..10 {
            assert_eq!(cell_at(&con, 1, 0, y), Cell::blank(DEF_MODE), "row {}", y);
        }
        for y in (0..3).chain(10..25) {
            assert_eq!(cell_at(&con, 1, 0, y).glyph(), b'x', "row {}", y);
        }
    }

    #[test]
    fn erase_characters_leaves_cursor() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"ABCDE\x1b[1;2H\x1b[3X").unwrap();
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b'A');
        for x in 1..4 {
            assert_eq!(cell_at(&con, 1, x, 0).glyph(), b' ');
        }
        assert_eq!(cell_at(&con, 1, 4, 0).glyph(), b'E');
        assert_eq!(cursor(&con, 1), (1, 0));
    }

    #[test]
    fn tab_stops_can_be_set_and_cleared() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1b[5G\x1bH\r\t").unwrap();
        assert_eq!(cursor(&con, 1), (4, 0));

        con.write(1, b"\x1b[3g\r\t").unwrap();
        assert_eq!(cursor(&con, 1), (79, 0));
    }

    #[test]
    fn dec_private_modes() {
        let (mut con, _svc, ev) = test_console(1);
        con.write(1, b"\x1b[?25l").unwrap();
        assert!(!con.vc(1).unwrap().cursor_visible);
        assert!(ev
            .snapshot()
            .contains(&MockEvent::ShowCursor(CursorMode::Off)));
        con.write(1, b"\x1b[?25h").unwrap();
        assert!(con.vc(1).unwrap().cursor_visible);

        con.write(1, b"\x1b[?4h").unwrap();
        assert!(con.vc(1).unwrap().insert_mode);
        con.write(1, b"\x1b[?4l").unwrap();
        assert!(!con.vc(1).unwrap().insert_mode);
    }

    #[test]
    fn unknown_sequences_are_dropped_silently() {
        let (mut con, _svc, _ev) = test_console(1);
        con.write(1, b"\x1b[123~ok").unwrap();
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b'o');
        assert_eq!(cell_at(&con, 1, 1, 0).glyph(), b'k');
        con.write(1, b"\x1b%also").unwrap();
        assert_eq!(cell_at(&con, 1, 2, 0).glyph(), b'a');
    }

    #[test]
    fn viewing_scrollback_snaps_back_on_write() {
        let (mut con, _svc, ev) = test_console(1);
        for _ in 0..30 {
            con.write(1, b"line\n").unwrap();
        }
        con.scroll_view_up(1);
        assert_ne!(con.scrollback().buf_top, 0);
        assert!(ev
            .snapshot()
            .iter()
            .any(|event| matches!(event, MockEvent::ShowView { .. })));

        ev.take();
        con.write(1, b"Q").unwrap();
        assert_eq!(con.scrollback().buf_top, 0);
        let events = ev.take();
        let restore_at = events
            .iter()
            .position(|event| *event == MockEvent::RestoreScreen)
            .expect("no restore before the write");
        let put_at = events
            .iter()
            .position(|event| matches!(event, MockEvent::PutChar { .. }))
            .expect("byte was not echoed");
        assert!(restore_at < put_at);
    }

    #[test]
    fn switching_away_leaves_scrollback_view() {
        let (mut con, _svc, _ev) = test_console(2);
        for _ in 0..30 {
            con.write(1, b"line\n").unwrap();
        }
        con.scroll_view_up(1);
        assert_ne!(con.scrollback().buf_top, 0);
        con.select(2);
        assert_eq!(con.scrollback().buf_top, 0);
        // The ring now belongs to console 2 and was re-seeded from its
        // (blank) screen.
        assert_eq!(con.scrollback().buf_y, con.vc(2).unwrap().y);
    }

    #[test]
    fn scroll_view_down_returns_to_live() {
        let (mut con, _svc, ev) = test_console(1);
        for _ in 0..60 {
            con.write(1, b"line\n").unwrap();
        }
        con.scroll_view_up(1);
        con.scroll_view_up(1);
        assert!(con.scrollback().buf_top > 0);
        while con.scrollback().buf_top != 0 {
            con.scroll_view_down(1);
        }
        assert!(ev.snapshot().iter().any(|e| *e == MockEvent::RestoreScreen));
        assert!(con.vc(1).unwrap().cursor_visible);
    }

    #[test]
    fn blank_and_unblank() {
        let (mut con, _svc, ev) = test_console(1);
        con.write(1, b"content").unwrap();
        con.blank(1);
        assert!(con.vc(1).unwrap().flags.contains(VcFlags::BLANKED));
        let blanks = ev
            .snapshot()
            .iter()
            .filter(|e| **e == MockEvent::BlankScreen)
            .count();
        assert_eq!(blanks, 1);
        // Blanking twice is a no-op.
        con.blank(1);
        let still = ev
            .snapshot()
            .iter()
            .filter(|e| **e == MockEvent::BlankScreen)
            .count();
        assert_eq!(still, 1);

        con.unblank(1);
        assert!(!con.vc(1).unwrap().flags.contains(VcFlags::BLANKED));
        assert!(con.vc(1).unwrap().cursor_visible);
        // The mirror survived the blank.
        assert_eq!(cell_at(&con, 1, 0, 0).glyph(), b'c');
    }

    #[test]
    fn log_flush_retries_past_a_full_queue() {
        let (mut con, _svc, _ev) = test_console(2);
        let buf = vec![b'a'; 1500];
        con.flush_log_buf(&buf);
        // 1500 printables from the origin: 18 full rows plus 60 columns.
        assert_eq!(cursor(&con, 1), (60, 18));
        assert!(con.vc(1).unwrap().tty.write_q.is_empty());
    }

    #[test]
    fn boot_state_focuses_console_one() {
        let (con, _svc, ev) = test_console(3);
        assert_eq!(con.current_index(), 1);
        assert!(con.vc(1).unwrap().has_focus());
        assert!(con.vc(2).unwrap().vidmem.is_none());
        assert!(con.devices().is_registered(VCONSOLES_MAJOR, 1));
        assert!(con.devices().is_registered(VCONSOLES_MAJOR, 0));
        assert!(con.devices().is_registered(SYSCON_MAJOR, 0));
        // The boot cursor was adopted from the hardware.
        assert!(ev.snapshot().contains(&MockEvent::GetCurpos));
    }

    #[test]
    fn switch_to_missing_console_is_a_no_op() {
        let (mut con, _svc, _ev) = test_console(2);
        con.select(0);
        con.select(99);
        assert_eq!(con.current_index(), 1);
    }

    // The only test that installs the process-global instance.
    #[test]
    fn global_instance_installs_once() {
        assert_eq!(global().err(), Some(ConsoleError::NotInitialized));
        let (con, _svc, _ev) = test_console(1);
        init_global(con);
        let handle = global().unwrap();
        handle.lock().write(1, b"ok").unwrap();
        assert_eq!(handle.lock().vc(1).unwrap().x, 2);
    }
}
