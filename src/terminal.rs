//! Controlling-terminal ownership and job-control signal dispositions.

use std::os::fd::{BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::sys::signal::{SigHandler, Signal, killpg, signal};
use nix::sys::termios::{SetArg, Termios, tcgetattr, tcsetattr};
use nix::unistd::{Pid, getpgrp, tcgetpgrp, tcsetpgrp};

/// Signals the terminal sends to its foreground group.
///
/// The shell ignores them for itself; children get them back at their
/// defaults before exec.
const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// The shell's claim on its controlling terminal.
#[derive(Clone)]
pub(crate) struct Terminal {
    fd: RawFd,
    shell_pgid: Pid,
    modes: Termios,
}

impl Terminal {
    /// Block until the shell's process group is in the foreground of `fd`.
    ///
    /// While another group owns the terminal the shell stops itself with
    /// `SIGTTIN`, to be continued once it is moved to the foreground.
    pub(crate) fn wait_until_foreground(fd: RawFd) -> Result<(), Errno> {
        loop {
            let pgrp = getpgrp();
            if tcgetpgrp(borrow(fd))? == pgrp {
                return Ok(());
            }
            tracing::info!(%pgrp, "waiting for terminal ownership");
            killpg(pgrp, Signal::SIGTTIN)?;
        }
    }

    /// Take the terminal for `shell_pgid` and save its current modes.
    pub(crate) fn claim(fd: RawFd, shell_pgid: Pid) -> Result<Self, Errno> {
        tcsetpgrp(borrow(fd), shell_pgid)?;
        let modes = tcgetattr(borrow(fd))?;
        Ok(Self {
            fd,
            shell_pgid,
            modes,
        })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }

    /// Make `pgid` the foreground process group.
    pub(crate) fn give_to(&self, pgid: Pid) -> Result<(), Errno> {
        tcsetpgrp(borrow(self.fd), pgid)
    }

    /// Move the shell back to the foreground and restore the saved modes,
    /// undoing whatever the last foreground child did to the terminal.
    pub(crate) fn reclaim(&self) -> Result<(), Errno> {
        tcsetpgrp(borrow(self.fd), self.shell_pgid)?;
        tcsetattr(borrow(self.fd), SetArg::TCSADRAIN, &self.modes)
    }
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("fd", &self.fd)
            .field("shell_pgid", &self.shell_pgid)
            .finish_non_exhaustive()
    }
}

pub(crate) fn borrow(fd: RawFd) -> BorrowedFd<'static> {
    // SAFETY: the terminal fd is the shell's stdin, open for the whole process.
    unsafe { BorrowedFd::borrow_raw(fd) }
}

pub(crate) fn ignore_job_control_signals() -> Result<(), Errno> {
    set_job_control_signals(SigHandler::SigIgn)
}

/// Restore default handling. Only calls `sigaction`, so it is safe to run
/// between fork and exec.
pub(crate) fn default_job_control_signals() -> Result<(), Errno> {
    set_job_control_signals(SigHandler::SigDfl)
}

fn set_job_control_signals(handler: SigHandler) -> Result<(), Errno> {
    for sig in JOB_CONTROL_SIGNALS {
        // SAFETY: SigIgn and SigDfl install no Rust handler code.
        unsafe { signal(sig, handler) }?;
    }
    Ok(())
}
