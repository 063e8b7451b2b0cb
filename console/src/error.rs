//! Error types for the virtual console subsystem.
//!
//! Display paths are deliberately soft: a console cannot refuse to display,
//! so malformed sequences are dropped and out-of-range targets are clamped.
//! Only the ioctl surface and the TTY queues surface errors to callers.

use core::fmt;

/// Errors surfaced by the console ioctl and queue interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "console errors must be handled, not silently discarded"]
pub enum ConsoleError {
    /// Console index outside 1..=NR_VCONSOLES.
    NoSuchConsole { index: usize },
    /// Unrecognised ioctl request code.
    BadIoctl { cmd: u32 },
    /// Argument out of range or of the wrong shape for the request.
    InvalidArgument { name: &'static str, value: u64 },
    /// A bounded TTY queue is at capacity.
    QueueFull,
    /// Global subsystem accessed before `init_global`.
    NotInitialized,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchConsole { index } => {
                write!(f, "no such virtual console: {}", index)
            }
            Self::BadIoctl { cmd } => write!(f, "unknown ioctl request {:#06x}", cmd),
            Self::InvalidArgument { name, value } => {
                write!(f, "invalid argument {}={}", name, value)
            }
            Self::QueueFull => write!(f, "tty queue full"),
            Self::NotInitialized => write!(f, "console subsystem not initialized"),
        }
    }
}

/// Result type alias for console operations.
pub type ConsoleResult<T> = Result<T, ConsoleError>;
