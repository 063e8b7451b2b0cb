//! Interrupt-safe critical sections.
//!
//! The cursor-blink timer and the keyboard IRQ both touch the framebuffer,
//! the focused console's screen mirror and the scrollback ring, so every
//! echo path, focus change and scrollback roll must run with interrupts
//! disabled. On the host (and on non-x86_64 targets, where the IRQ glue is
//! elsewhere) the block simply runs.

/// Run `f` with interrupts disabled, restoring the previous interrupt flag
/// afterwards.
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    x86_64::instructions::interrupts::without_interrupts(f)
}

/// Host / non-bare-metal fallback: no interrupt flag to toggle.
#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    f()
}
