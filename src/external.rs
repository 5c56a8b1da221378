//! Launching external commands and supervising them.
//!
//! In an interactive session every child gets its own process group. A
//! foreground child also gets the terminal and the shell blocks until it exits
//! or is suspended; a background child is recorded in the job table instead.
//! Both the child (before exec) and the shell (after spawn) perform the group
//! and terminal assignment, so whichever runs first wins and the second is a
//! no-op.

use std::io::Write;
use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{Pid, getpgrp, setpgid, tcsetpgrp};

use crate::error::LaunchError;
use crate::job::{Announce, JobState};
use crate::parser::Placement;
use crate::session::Session;
use crate::terminal::{self, Terminal};

/// Where a launched command ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// The shell waited for the child. `code` is its exit status, or 128 plus
    /// the signal number when it was killed.
    Completed { pid: Pid, code: i32 },
    /// A foreground child was suspended and is now tracked as job `number`.
    Stopped { pid: Pid, number: u32 },
    /// The child keeps running as background job `number`.
    Background { pid: Pid, number: u32 },
}

/// Spawn `argv` as a child process.
///
/// `line` is the text shown for the job in announcements. Job announcements
/// and the sweep that follows every launch are written to `out`.
pub fn launch(
    session: &mut Session,
    line: &str,
    argv: &[String],
    placement: Placement,
    out: &mut dyn Write,
) -> Result<Launch, LaunchError> {
    let (program, args) = argv.split_first().ok_or(LaunchError::EmptyCommand)?;
    let mut cmd = Command::new(program);
    cmd.args(args);

    let Some(terminal) = session.terminal().cloned() else {
        let child = cmd
            .spawn()
            .map_err(|e| LaunchError::from_spawn(program, e))?;
        let pid = Pid::from_raw(child.id() as i32);
        tracing::debug!(%pid, command = %program, "spawned without job control");
        session.sweep(Announce::SILENT, out);
        // No job control: even `&` commands are waited for.
        let status = wait_for(pid, false)?;
        return Ok(Launch::Completed {
            pid,
            code: exit_code(status),
        });
    };

    let foreground = placement.is_foreground();
    let fd = terminal.fd();
    cmd.process_group(0);
    // SAFETY: the hook only issues tcsetpgrp and sigaction, both
    // async-signal-safe, and touches no memory owned by the parent.
    unsafe {
        cmd.pre_exec(move || {
            if foreground {
                let _ = tcsetpgrp(terminal::borrow(fd), getpgrp());
            }
            terminal::default_job_control_signals()?;
            Ok(())
        });
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            // The hook may already have handed the terminal over.
            if foreground {
                reclaim(&terminal);
            }
            return Err(LaunchError::from_spawn(program, e));
        }
    };
    let pid = Pid::from_raw(child.id() as i32);
    tracing::debug!(%pid, ?placement, command = %program, "spawned");

    if let Err(e) = setpgid(pid, pid) {
        // EACCES once the child has exec'd: it already did this itself.
        tracing::trace!(%pid, "setpgid from parent: {}", e);
    }

    if !foreground {
        let job = session.track(pid, line);
        let number = job.number;
        if let Err(e) = writeln!(out, "{}", job.started()) {
            tracing::warn!("failed to announce job {}: {}", number, e);
        }
        session.sweep(Announce::FINISHED, out);
        return Ok(Launch::Background { pid, number });
    }

    if let Err(e) = terminal.give_to(pid) {
        tracing::trace!(%pid, "tcsetpgrp from parent: {}", e);
    }
    let status = wait_for(pid, true);
    reclaim(&terminal);
    let launch = match status? {
        WaitStatus::Stopped(..) => {
            let job = session.track(pid, line);
            job.state = JobState::Stopped;
            let number = job.number;
            if let Err(e) = writeln!(out, "{}", job.stopped()) {
                tracing::warn!("failed to announce job {}: {}", number, e);
            }
            Launch::Stopped { pid, number }
        }
        status => Launch::Completed {
            pid,
            code: exit_code(status),
        },
    };
    session.sweep(Announce::FINISHED, out);
    Ok(launch)
}

/// Block until `pid` exits, is killed, or (with `untraced`) is stopped.
fn wait_for(pid: Pid, untraced: bool) -> Result<WaitStatus, LaunchError> {
    let flags = untraced.then_some(WaitPidFlag::WUNTRACED);
    loop {
        match waitpid(pid, flags) {
            Ok(
                status @ (WaitStatus::Exited(..)
                | WaitStatus::Signaled(..)
                | WaitStatus::Stopped(..)),
            ) => return Ok(status),
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(source) => return Err(LaunchError::Wait { pid, source }),
        }
    }
}

fn reclaim(terminal: &Terminal) {
    if let Err(e) = terminal.reclaim() {
        tracing::warn!("failed to reclaim terminal: {}", e);
    }
}

fn exit_code(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
        _ => -1,
    }
}
