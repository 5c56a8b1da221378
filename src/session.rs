//! Process-wide shell state.

use std::env as stdenv;
use std::io::{IsTerminal, Write};

use nix::libc::STDIN_FILENO;
use nix::unistd::{Pid, getpgrp, getpid, setpgid};

use crate::error::SessionError;
use crate::job::{Announce, Job, JobTable, WaitPid};
use crate::terminal::{self, Terminal};

/// Environment variable holding the prompt text.
pub const PROMPT_VAR: &str = "MY_PROMPT";

/// Prompt used when [`PROMPT_VAR`] is unset or empty.
pub const DEFAULT_PROMPT: &str = "shell> ";

/// Read the prompt from the environment variable `var`.
pub fn prompt_from_env(var: &str) -> String {
    match stdenv::var(var) {
        Ok(prompt) if !prompt.is_empty() => prompt,
        _ => DEFAULT_PROMPT.to_owned(),
    }
}

/// State shared by the dispatcher and the launcher for the lifetime of the shell.
///
/// An interactive session owns the controlling terminal between foreground
/// commands and ignores the terminal's job-control signals. A non-interactive
/// session (input is a file or pipe) never touches process groups.
#[derive(Debug)]
pub struct Session {
    terminal: Option<Terminal>,
    prompt: String,
    jobs: JobTable,
    exiting: bool,
}

impl Session {
    /// Set up the shell for the current process.
    ///
    /// When stdin is a terminal this blocks until the shell is in the
    /// foreground, then moves it into its own process group and takes the
    /// terminal.
    pub fn init() -> Result<Self, SessionError> {
        let prompt = prompt_from_env(PROMPT_VAR);
        if !std::io::stdin().is_terminal() {
            tracing::info!("stdin is not a terminal, job control disabled");
            return Ok(Self::detached(prompt));
        }

        Terminal::wait_until_foreground(STDIN_FILENO).map_err(SessionError::ForegroundWait)?;
        terminal::ignore_job_control_signals().map_err(SessionError::Signals)?;

        let shell_pgid = getpid();
        if getpgrp() != shell_pgid {
            setpgid(shell_pgid, shell_pgid).map_err(SessionError::ProcessGroup)?;
        }
        let terminal = Terminal::claim(STDIN_FILENO, shell_pgid).map_err(SessionError::Terminal)?;
        tracing::info!(pgid = %shell_pgid, "interactive session started");

        Ok(Self {
            terminal: Some(terminal),
            prompt,
            jobs: JobTable::new(),
            exiting: false,
        })
    }

    /// A session without job control.
    pub fn detached(prompt: impl Into<String>) -> Self {
        Self {
            terminal: None,
            prompt: prompt.into(),
            jobs: JobTable::new(),
            exiting: false,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    /// Ask the read loop to stop after the current line.
    pub fn request_exit(&mut self) {
        self.exiting = true;
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub(crate) fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    pub(crate) fn shell_pgid(&self) -> Option<Pid> {
        self.terminal.as_ref().map(Terminal::shell_pgid)
    }

    /// Start tracking a background child.
    pub(crate) fn track(&mut self, pid: Pid, command: &str) -> &mut Job {
        self.jobs.push(pid, command)
    }

    /// Reap finished background jobs, announcing according to `announce`.
    pub fn sweep(&mut self, announce: Announce, out: &mut dyn Write) {
        if let Err(e) = self.jobs.reap(&mut WaitPid, announce, out) {
            tracing::warn!("failed to report job status: {}", e);
        }
    }
}
