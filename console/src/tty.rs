//! Bounded TTY byte queues and per-console teletype state.
//!
//! The line discipline itself (cooking, canonical mode, signal generation)
//! lives outside this crate; what the console core needs is the pair of
//! byte queues it shares with that layer, the controlling process id for
//! the VT_PROCESS handshake, and the window size reported on reset.
//!
//! Queues are sized once at construction and never reallocate afterwards.

use alloc::collections::VecDeque;

use crate::error::{ConsoleError, ConsoleResult};

/// Capacity of each TTY queue, in bytes.
pub const TTY_QUEUE_SIZE: usize = 1024;

/// Process id of a controlling process; 0 means none.
pub type Pid = u32;

/// Signal number delivered through [`crate::console::ConsoleServices`].
pub type Signal = u8;

/// A bounded FIFO byte queue.
///
/// Backed by a `VecDeque` whose capacity is reserved up front; the `put`
/// bound guarantees no growth, so the no-allocation-after-init rule holds.
#[derive(Debug)]
pub struct TtyQueue {
    buf: VecDeque<u8>,
    cap: usize,
}

impl TtyQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Append a byte, failing with `QueueFull` at capacity.
    pub fn put(&mut self, ch: u8) -> ConsoleResult<()> {
        if self.buf.len() >= self.cap {
            return Err(ConsoleError::QueueFull);
        }
        self.buf.push_back(ch);
        Ok(())
    }

    /// Remove and return the oldest byte.
    pub fn get(&mut self) -> Option<u8> {
        self.buf.pop_front()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Terminal window size, matching the C `struct winsize` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Winsize {
    pub ws_row: u16,
    pub ws_col: u16,
    pub ws_xpixel: u16,
    pub ws_ypixel: u16,
}

/// The teletype endpoint bound to one virtual console.
#[derive(Debug)]
pub struct Tty {
    /// Output from user space, drained by the escape-sequence parser.
    pub write_q: TtyQueue,
    /// Input toward user space; interrogation replies are injected here.
    pub read_q: TtyQueue,
    /// Controlling process for VT_PROCESS switching; 0 when unowned.
    pub pid: Pid,
    /// Window size as last reported on console reset.
    pub winsize: Winsize,
}

impl Tty {
    pub fn new() -> Self {
        Self {
            write_q: TtyQueue::new(TTY_QUEUE_SIZE),
            read_q: TtyQueue::new(TTY_QUEUE_SIZE),
            pid: 0,
            winsize: Winsize::default(),
        }
    }
}

impl Default for Tty {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_fifo() {
        let mut q = TtyQueue::new(8);
        q.put(b'a').unwrap();
        q.put(b'b').unwrap();
        q.put(b'c').unwrap();
        assert_eq!(q.get(), Some(b'a'));
        assert_eq!(q.get(), Some(b'b'));
        assert_eq!(q.get(), Some(b'c'));
        assert_eq!(q.get(), None);
    }

    #[test]
    fn queue_rejects_when_full() {
        let mut q = TtyQueue::new(2);
        q.put(1).unwrap();
        q.put(2).unwrap();
        assert_eq!(q.put(3), Err(ConsoleError::QueueFull));
        assert_eq!(q.len(), 2);
        // Draining one byte makes room again.
        assert_eq!(q.get(), Some(1));
        q.put(3).unwrap();
    }
}
