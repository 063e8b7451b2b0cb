//! Recording backend for the test harness.
//!
//! Applies every primitive to the screen mirror exactly like the hardware
//! backends do, and records the call stream so tests can assert on cell
//! writes, cursor movement and scroll events.

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::cell::Cell;
use crate::vc::Vconsole;
use crate::video::{
    grid_delete_char, grid_fill, grid_insert_char, grid_scroll_down, grid_scroll_up, CursorMode,
    ScrollDir, VideoBackend, VideoInfo,
};

/// One recorded backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockEvent {
    PutChar { x: usize, y: usize, cell: Cell },
    InsertChar { x: usize, y: usize },
    DeleteChar { x: usize, y: usize },
    WriteScreen { from: usize, count: usize, attr: u16 },
    Scroll { top: usize, dir: ScrollDir },
    UpdateCurpos { x: usize, y: usize },
    ShowCursor(CursorMode),
    GetCurpos,
    RestoreScreen,
    BlankScreen,
    ShowView { rows: usize },
    CursorBlink,
}

/// Shared handle onto the recorded event stream.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<MockEvent>>>);

impl EventLog {
    pub fn snapshot(&self) -> Vec<MockEvent> {
        self.0.lock().clone()
    }

    /// Drain the recorded events.
    pub fn take(&self) -> Vec<MockEvent> {
        core::mem::take(&mut *self.0.lock())
    }

    fn push(&self, event: MockEvent) {
        self.0.lock().push(event);
    }
}

pub struct MockBackend {
    info: VideoInfo,
    events: EventLog,
}

impl MockBackend {
    pub fn new(info: VideoInfo) -> Self {
        Self {
            info,
            events: EventLog::default(),
        }
    }

    /// Clone a handle for inspecting events after the backend is boxed.
    pub fn events(&self) -> EventLog {
        self.events.clone()
    }
}

impl VideoBackend for MockBackend {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn put_char(&mut self, vc: &mut Vconsole, ch: u8) {
        let idx = vc.y * vc.columns + vc.x;
        if idx >= vc.screen.len() {
            return;
        }
        let cell = Cell::new(ch, vc.color_attr);
        vc.screen[idx] = cell;
        self.events.push(MockEvent::PutChar {
            x: vc.x,
            y: vc.y,
            cell,
        });
    }

    fn insert_char(&mut self, vc: &mut Vconsole) {
        grid_insert_char(
            &mut vc.screen,
            vc.columns,
            vc.x,
            vc.y,
            Cell::blank(vc.color_attr),
        );
        self.events.push(MockEvent::InsertChar { x: vc.x, y: vc.y });
    }

    fn delete_char(&mut self, vc: &mut Vconsole) {
        grid_delete_char(
            &mut vc.screen,
            vc.columns,
            vc.x,
            vc.y,
            Cell::blank(vc.color_attr),
        );
        self.events.push(MockEvent::DeleteChar { x: vc.x, y: vc.y });
    }

    fn write_screen(&mut self, vc: &mut Vconsole, from: usize, count: usize, attr: u16) {
        grid_fill(&mut vc.screen, from, count, Cell::blank(attr));
        self.events.push(MockEvent::WriteScreen { from, count, attr });
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
        self.events.push(MockEvent::Scroll { top, dir });
    }

    fn update_curpos(&mut self, vc: &Vconsole) {
        self.events.push(MockEvent::UpdateCurpos { x: vc.x, y: vc.y });
    }

    fn show_cursor(&mut self, vc: &mut Vconsole, mode: CursorMode) {
        match mode {
            CursorMode::On => vc.cursor_visible = true,
            CursorMode::Off => vc.cursor_visible = false,
            CursorMode::Cond => {}
        }
        self.events.push(MockEvent::ShowCursor(mode));
    }

    fn get_curpos(&mut self, _vc: &mut Vconsole) {
        self.events.push(MockEvent::GetCurpos);
    }

    fn restore_screen(&mut self, _vc: &Vconsole) {
        self.events.push(MockEvent::RestoreScreen);
    }

    fn blank_screen(&mut self, _vc: &Vconsole) {
        self.events.push(MockEvent::BlankScreen);
    }

    fn show_view(&mut self, vc: &Vconsole, cells: &[Cell]) {
        self.events.push(MockEvent::ShowView {
            rows: cells.len() / vc.columns.max(1),
        });
    }

    fn cursor_blink(&mut self, _vc: &Vconsole) {
        self.events.push(MockEvent::CursorBlink);
    }
}
