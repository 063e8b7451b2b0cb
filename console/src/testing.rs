//! Shared fixtures for the host test suite.
//!
//! Tests drive byte streams into a private subsystem built around the
//! recording mock backend and a recording services implementation; both
//! hand out shared log handles so assertions can run after the aggregates
//! have been boxed into the subsystem.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::bell::CalloutReq;
use crate::console::{ConsoleServices, ConsoleSubsystem};
use crate::tty::{Pid, Signal};
use crate::vc::LedFlags;
use crate::video::mock::{EventLog, MockBackend};
use crate::video::{VideoFlags, VideoInfo};

/// Everything the recording services observed.
#[derive(Debug, Default)]
pub struct ServiceLog {
    pub signals: Vec<(Pid, Signal)>,
    pub leds: Vec<LedFlags>,
    pub inputs: Vec<usize>,
    pub wakeups: usize,
    pub callouts: Vec<(CalloutReq, u32)>,
    /// What `kill_pid` reports; flip to `false` to simulate a dead process.
    pub deliverable: bool,
}

/// Recording [`ConsoleServices`] implementation with a shared log.
#[derive(Clone)]
pub struct RecordingServices(Arc<Mutex<ServiceLog>>);

impl RecordingServices {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ServiceLog {
            deliverable: true,
            ..ServiceLog::default()
        })))
    }

    pub fn log(&self) -> spin::MutexGuard<'_, ServiceLog> {
        self.0.lock()
    }

    pub fn set_deliverable(&self, deliverable: bool) {
        self.0.lock().deliverable = deliverable;
    }
}

impl Default for RecordingServices {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleServices for RecordingServices {
    fn kill_pid(&mut self, pid: Pid, sig: Signal) -> bool {
        let mut log = self.0.lock();
        log.signals.push((pid, sig));
        log.deliverable
    }

    fn set_leds(&mut self, leds: LedFlags) {
        self.0.lock().leds.push(leds);
    }

    fn input_ready(&mut self, console: usize) {
        self.0.lock().inputs.push(console);
    }

    fn wakeup_writers(&mut self) {
        self.0.lock().wakeups += 1;
    }

    fn add_callout(&mut self, req: CalloutReq, expires_ticks: u32) {
        self.0.lock().callouts.push((req, expires_ticks));
    }
}

/// The standard 80x25 text-mode boot description used by the tests.
pub fn test_info() -> VideoInfo {
    VideoInfo {
        columns: 80,
        lines: 25,
        flags: VideoFlags::VGA_TEXT,
        address: 0xB8000,
        port: 0x3D4,
        signature: "mock",
    }
}

/// A subsystem over the mock backend plus handles onto both logs.
pub fn test_console(nr_consoles: usize) -> (ConsoleSubsystem, RecordingServices, EventLog) {
    let info = test_info();
    let backend = MockBackend::new(info);
    let events = backend.events();
    let services = RecordingServices::new();
    let console = ConsoleSubsystem::new(
        info,
        Box::new(backend),
        Box::new(services.clone()),
        nr_consoles,
    );
    (console, services, events)
}
