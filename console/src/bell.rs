//! Console bell: PC-speaker tone gated off by a one-shot callout.
//!
//! `BEL` turns the speaker on and registers a callout that turns it off
//! `HZ / 8` ticks later; the callout subsystem itself lives outside this
//! crate and is reached through [`crate::console::ConsoleServices`].

use core::sync::atomic::{AtomicBool, Ordering};

use crate::console::ConsoleServices;

/// Kernel tick rate (ticks per second).
pub const HZ: u32 = 100;

/// Bell tone frequency in Hz.
const BELL_FREQ: u32 = 750;

/// A one-shot timer request: `func(arg)` runs once the callout expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalloutReq {
    pub func: fn(usize),
    pub arg: usize,
}

/// Mirrors the speaker gate so the state is observable everywhere; on
/// bare-metal x86_64 the PIT channel 2 gate is driven as well.
static SPEAKER_ON: AtomicBool = AtomicBool::new(false);

/// Sound the bell and arm its shut-off callout.
pub fn ring(services: &mut dyn ConsoleServices) {
    speaker_on();
    services.add_callout(
        CalloutReq {
            func: speaker_off_callout,
            arg: 0,
        },
        HZ / 8,
    );
}

/// Whether the speaker is currently sounding.
pub fn is_beeping() -> bool {
    SPEAKER_ON.load(Ordering::Relaxed)
}

fn speaker_on() {
    SPEAKER_ON.store(true, Ordering::Relaxed);
    hw::speaker_on(BELL_FREQ);
}

fn speaker_off_callout(_arg: usize) {
    SPEAKER_ON.store(false, Ordering::Relaxed);
    hw::speaker_off();
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod hw {
    use x86_64::instructions::port::Port;

    /// PIT input clock in Hz.
    const PIT_CLOCK: u32 = 1_193_182;

    pub fn speaker_on(freq: u32) {
        let divisor = (PIT_CLOCK / freq.max(1)) as u16;
        // SAFETY: Standard PIT channel 2 programming (mode 3, square wave)
        // via ports 0x43/0x42, then raising the speaker gate bits in port
        // 0x61. Kernel mode with I/O privileges; these ports are always
        // safe to access.
        unsafe {
            Port::<u8>::new(0x43).write(0xB6);
            Port::<u8>::new(0x42).write((divisor & 0xFF) as u8);
            Port::<u8>::new(0x42).write((divisor >> 8) as u8);
            let mut gate = Port::<u8>::new(0x61);
            let bits = gate.read();
            gate.write(bits | 0x03);
        }
    }

    pub fn speaker_off() {
        // SAFETY: Clearing the speaker gate bits in port 0x61. Standard
        // PC speaker control, kernel mode with I/O privileges.
        unsafe {
            let mut gate = Port::<u8>::new(0x61);
            let bits = gate.read();
            gate.write(bits & !0x03);
        }
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod hw {
    pub fn speaker_on(_freq: u32) {}
    pub fn speaker_off() {}
}
