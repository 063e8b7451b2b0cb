//! Virtual console subsystem.
//!
//! Multiplexes one physical display (VGA text mode or linear framebuffer)
//! into N independent VT100/ANSI terminal emulators, each bound to a
//! teletype endpoint. The core is the byte-at-a-time escape-sequence
//! state machine, the per-console screen mirrors plus the shared
//! scrollback ring, and the VT_AUTO / VT_PROCESS switching protocol that
//! hands the framebuffer between consoles.
//!
//! The crate is freestanding: kernel glue constructs a
//! [`console::ConsoleSubsystem`] at boot from the video description, an
//! injected [`video::VideoBackend`] and the [`console::ConsoleServices`]
//! hooks (signals, LEDs, line-discipline callbacks, callout timer), then
//! parks it via [`console::init_global`]. Host unit tests build private
//! aggregates around the recording mock backend instead.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bell;
pub mod cell;
pub mod console;
pub mod dev;
pub mod error;
pub mod parser;
pub mod scrollback;
pub mod sync;
pub mod tty;
pub mod vc;
pub mod video;
pub mod vt;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cell::Cell;
pub use console::{global, init_global, ConsoleServices, ConsoleSubsystem};
pub use error::{ConsoleError, ConsoleResult};
pub use vc::{Vconsole, NR_VCONSOLES};
pub use video::{VideoBackend, VideoInfo};
