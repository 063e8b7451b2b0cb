//! VT handoff types and the VT/KD ioctl surface.
//!
//! Request codes match the Linux values so user-space written against the
//! usual `<linux/vt.h>` / `<linux/kd.h>` constants works unchanged. The
//! TTY layer decodes the user pointer and calls [`ConsoleSubsystem::ioctl`]
//! with the argument already lifted into an [`IoctlArg`].

use crate::console::ConsoleSubsystem;
use crate::error::{ConsoleError, ConsoleResult};
use crate::tty::Pid;
use crate::vc::LedFlags;
use crate::video::CursorMode;

// =========================================================================
// Request codes (matching Linux values for ABI compatibility)
// =========================================================================

/// Get keyboard LED state.
pub const KDGETLED: u32 = 0x4B31;
/// Set keyboard LED state.
pub const KDSETLED: u32 = 0x4B32;
/// Set console mode (text or graphics).
pub const KDSETMODE: u32 = 0x4B3A;
/// Get console mode.
pub const KDGETMODE: u32 = 0x4B3B;
/// Get VT handoff mode.
pub const VT_GETMODE: u32 = 0x5601;
/// Set VT handoff mode (records the caller as controlling process).
pub const VT_SETMODE: u32 = 0x5602;
/// Acknowledge or refuse a pending display release.
pub const VT_RELDISP: u32 = 0x5605;
/// Switch to the given console.
pub const VT_ACTIVATE: u32 = 0x5606;

/// `VT_RELDISP` argument acknowledging display acquisition.
pub const VT_ACKACQ: u64 = 0x02;

/// Console display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KdMode {
    Text = 0,
    Graphics = 1,
}

/// VT switching discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VtModeKind {
    /// Switches proceed immediately.
    Auto = 0,
    /// Switches are negotiated with the controlling process via signals.
    Process = 1,
}

/// VT handoff state, matching the C `struct vt_mode` field-for-field.
///
/// `relsig` and `frsig` are stored and reset but the switch paths deliver
/// `acqsig` on both release and acquire, preserving the historical
/// behaviour user-space depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VtModeState {
    pub mode: VtModeKind,
    pub waitv: u8,
    pub relsig: u8,
    pub acqsig: u8,
    pub frsig: u8,
}

impl VtModeState {
    /// The boot / reset state: automatic switching, no signals.
    pub const fn auto() -> Self {
        Self {
            mode: VtModeKind::Auto,
            waitv: 0,
            relsig: 0,
            acqsig: 0,
            frsig: 0,
        }
    }
}

/// Ioctl argument, decoded from user space by the TTY layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlArg {
    None,
    Int(u64),
    VtMode(VtModeState),
}

/// Ioctl reply, encoded back to user space by the TTY layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlReply {
    None,
    Int(u64),
    VtMode(VtModeState),
}

impl ConsoleSubsystem {
    /// VT/KD ioctl entry point for console `index`.
    ///
    /// Errors never disturb console or parser state.
    pub fn ioctl(
        &mut self,
        index: usize,
        cmd: u32,
        arg: IoctlArg,
        caller_pid: Pid,
    ) -> ConsoleResult<IoctlReply> {
        self.check_index(index)?;
        match cmd {
            KDGETMODE => Ok(IoctlReply::Int(self.vcs[index].kd_mode as u64)),
            KDSETMODE => {
                let mode = match arg {
                    IoctlArg::Int(0) => KdMode::Text,
                    IoctlArg::Int(1) => KdMode::Graphics,
                    _ => return Err(bad_arg("mode", arg)),
                };
                self.set_kd_mode(index, mode);
                Ok(IoctlReply::None)
            }
            KDGETLED => Ok(IoctlReply::Int(self.vcs[index].led_status.bits() as u64)),
            KDSETLED => {
                let bits = match arg {
                    IoctlArg::Int(v) if v <= 0x07 => v as u8,
                    _ => return Err(bad_arg("leds", arg)),
                };
                let leds = LedFlags::from_bits_truncate(bits);
                self.vcs[index].led_status = leds;
                if self.vcs[index].has_focus() {
                    self.services.set_leds(leds);
                }
                Ok(IoctlReply::None)
            }
            VT_GETMODE => Ok(IoctlReply::VtMode(self.vcs[index].vt_mode)),
            VT_SETMODE => {
                let mode = match arg {
                    IoctlArg::VtMode(m) => m,
                    _ => return Err(bad_arg("vt_mode", arg)),
                };
                let vc = &mut self.vcs[index];
                vc.vt_mode = mode;
                vc.tty.pid = match mode.mode {
                    VtModeKind::Process => caller_pid,
                    VtModeKind::Auto => 0,
                };
                Ok(IoctlReply::None)
            }
            VT_ACTIVATE => {
                let target = match arg {
                    IoctlArg::Int(v) => v as usize,
                    _ => return Err(bad_arg("console", arg)),
                };
                self.check_index(target)?;
                self.select(target);
                Ok(IoctlReply::None)
            }
            VT_RELDISP => {
                let verdict = match arg {
                    IoctlArg::Int(v) => v,
                    _ => return Err(bad_arg("reldisp", arg)),
                };
                self.reldisp(index, verdict)
            }
            _ => Err(ConsoleError::BadIoctl { cmd }),
        }
    }

    /// Enter text or graphics mode on `index`.
    fn set_kd_mode(&mut self, index: usize, mode: KdMode) {
        let focused = self.vcs[index].has_focus();
        self.vcs[index].kd_mode = mode;
        if !focused {
            return;
        }
        match mode {
            KdMode::Text => {
                // Coming back from graphics: the framebuffer content is
                // whatever the process left behind, so repaint it.
                let vc = &mut self.vcs[index];
                self.backend.restore_screen(vc);
                self.backend.show_cursor(vc, CursorMode::Cond);
                self.backend.update_curpos(vc);
            }
            KdMode::Graphics => {
                self.backend.show_cursor(&mut self.vcs[index], CursorMode::Off);
            }
        }
    }

    /// Handle `VT_RELDISP`: the controlling process answers a deferred
    /// switch (0 = refuse, 1 = release, VT_ACKACQ = acquisition ack).
    fn reldisp(&mut self, index: usize, verdict: u64) -> ConsoleResult<IoctlReply> {
        if self.vcs[index].vt_mode.mode != VtModeKind::Process {
            return Err(bad_arg("reldisp", IoctlArg::Int(verdict)));
        }
        match verdict {
            0 => {
                // Switch vetoed; the pending target is forgotten.
                self.vcs[index].switchto = None;
                Ok(IoctlReply::None)
            }
            1 => match self.vcs[index].switchto.take() {
                Some(target) => {
                    self.select_final(target);
                    Ok(IoctlReply::None)
                }
                None => Err(bad_arg("reldisp", IoctlArg::Int(verdict))),
            },
            VT_ACKACQ => Ok(IoctlReply::None),
            _ => Err(bad_arg("reldisp", IoctlArg::Int(verdict))),
        }
    }
}

fn bad_arg(name: &'static str, arg: IoctlArg) -> ConsoleError {
    let value = match arg {
        IoctlArg::Int(v) => v,
        _ => 0,
    };
    ConsoleError::InvalidArgument { name, value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_console;

    #[test]
    fn kd_mode_round_trip() {
        let (mut con, _svc, _ev) = test_console(4);
        assert_eq!(
            con.ioctl(2, KDGETMODE, IoctlArg::None, 0),
            Ok(IoctlReply::Int(0))
        );
        con.ioctl(2, KDSETMODE, IoctlArg::Int(1), 0).unwrap();
        assert_eq!(
            con.ioctl(2, KDGETMODE, IoctlArg::None, 0),
            Ok(IoctlReply::Int(1))
        );
    }

    #[test]
    fn bad_requests_are_rejected() {
        let (mut con, _svc, _ev) = test_console(4);
        assert!(matches!(
            con.ioctl(1, 0xDEAD, IoctlArg::None, 0),
            Err(ConsoleError::BadIoctl { cmd: 0xDEAD })
        ));
        assert!(matches!(
            con.ioctl(1, KDSETMODE, IoctlArg::Int(7), 0),
            Err(ConsoleError::InvalidArgument { .. })
        ));
        assert!(matches!(
            con.ioctl(0, KDGETMODE, IoctlArg::None, 0),
            Err(ConsoleError::NoSuchConsole { index: 0 })
        ));
    }

    #[test]
    fn setmode_records_controlling_pid() {
        let (mut con, _svc, _ev) = test_console(4);
        let mode = VtModeState {
            mode: VtModeKind::Process,
            waitv: 0,
            relsig: 1,
            acqsig: 10,
            frsig: 0,
        };
        con.ioctl(1, VT_SETMODE, IoctlArg::VtMode(mode), 42).unwrap();
        assert_eq!(con.vc(1).unwrap().tty.pid, 42);
        assert_eq!(
            con.ioctl(1, VT_GETMODE, IoctlArg::None, 0),
            Ok(IoctlReply::VtMode(mode))
        );

        // Dropping back to AUTO clears the controlling pid.
        con.ioctl(1, VT_SETMODE, IoctlArg::VtMode(VtModeState::auto()), 42)
            .unwrap();
        assert_eq!(con.vc(1).unwrap().tty.pid, 0);
    }

    #[test]
    fn setled_promotes_to_hardware_only_when_focused() {
        let (mut con, svc, _ev) = test_console(4);
        con.ioctl(1, KDSETLED, IoctlArg::Int(0b101), 0).unwrap();
        assert_eq!(
            svc.log().leds.last().copied(),
            Some(LedFlags::SCRLOCK | LedFlags::CAPSLOCK)
        );

        let before = svc.log().leds.len();
        con.ioctl(3, KDSETLED, IoctlArg::Int(0b010), 0).unwrap();
        assert_eq!(svc.log().leds.len(), before);
        assert_eq!(
            con.ioctl(3, KDGETLED, IoctlArg::None, 0),
            Ok(IoctlReply::Int(0b010))
        );
    }

    #[test]
    fn reldisp_requires_process_mode_and_pending_switch() {
        let (mut con, _svc, _ev) = test_console(4);
        assert!(con.ioctl(1, VT_RELDISP, IoctlArg::Int(1), 0).is_err());

        let mode = VtModeState {
            mode: VtModeKind::Process,
            waitv: 0,
            relsig: 1,
            acqsig: 10,
            frsig: 0,
        };
        con.ioctl(1, VT_SETMODE, IoctlArg::VtMode(mode), 42).unwrap();
        // Process mode but no switch pending.
        assert!(con.ioctl(1, VT_RELDISP, IoctlArg::Int(1), 42).is_err());
        // Acquisition ack is always accepted in process mode.
        assert_eq!(
            con.ioctl(1, VT_RELDISP, IoctlArg::Int(VT_ACKACQ), 42),
            Ok(IoctlReply::None)
        );
    }
}
