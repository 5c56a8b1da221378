//! Background job bookkeeping and reaping.

use std::fmt;
use std::io::{self, Write};

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

/// One tracked background child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub number: u32,
    pub pid: Pid,
    pub command: String,
    pub state: JobState,
}

/// Last known state of a live job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Running,
    Stopped,
}

impl Job {
    /// Announcement printed when the job is created: `[n] pid command`.
    pub fn started(&self) -> impl fmt::Display + '_ {
        Line(self, "")
    }

    /// `[n] pid Running command`.
    pub fn running(&self) -> impl fmt::Display + '_ {
        Line(self, "Running ")
    }

    /// `[n] pid Stopped command`.
    pub fn stopped(&self) -> impl fmt::Display + '_ {
        Line(self, "Stopped ")
    }

    /// The listing line for the job's current state.
    pub fn status(&self) -> impl fmt::Display + '_ {
        let state = match self.state {
            JobState::Running => "Running ",
            JobState::Stopped => "Stopped ",
        };
        Line(self, state)
    }

    /// `[n] Done command`.
    pub fn done(&self) -> impl fmt::Display + '_ {
        Done(self)
    }
}

struct Line<'a>(&'a Job, &'static str);

impl fmt::Display for Line<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Line(job, state) = self;
        write!(f, "[{}] {} {}{}", job.number, job.pid, state, job.command)
    }
}

struct Done<'a>(&'a Job);

impl fmt::Display for Done<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] Done {}", self.0.number, self.0.command)
    }
}

/// Jobs in creation order.
///
/// A new job gets one more than the highest number still present, so numbers
/// are recycled only once every higher job has been reaped.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_number(&self) -> u32 {
        self.jobs.iter().map(|j| j.number).max().unwrap_or(0) + 1
    }

    /// Record a new job for `pid` and return it.
    ///
    /// A pid that is already tracked is replaced, keeping one entry per process.
    pub fn push(&mut self, pid: Pid, command: impl Into<String>) -> &mut Job {
        self.jobs.retain(|j| j.pid != pid);
        let job = Job {
            number: self.next_number(),
            pid,
            command: command.into(),
            state: JobState::Running,
        };
        self.jobs.push(job);
        let last = self.jobs.len() - 1;
        &mut self.jobs[last]
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Walk the table once, probing every job exactly once and dropping the
    /// ones whose process has terminated.
    pub fn reap(
        &mut self,
        probe: &mut dyn StatusProbe,
        announce: Announce,
        out: &mut dyn Write,
    ) -> io::Result<Vec<Job>> {
        let mut finished = Vec::new();
        let mut written = Ok(());
        for mut job in std::mem::take(&mut self.jobs) {
            match probe.probe(job.pid) {
                ProcessState::Terminated => {
                    tracing::debug!(job = job.number, pid = %job.pid, "job finished");
                    if announce.finished {
                        written = written.and(writeln!(out, "{}", job.done()));
                    }
                    finished.push(job);
                    continue;
                }
                ProcessState::Unchanged => {}
                ProcessState::Running => job.state = JobState::Running,
                ProcessState::Stopped => job.state = JobState::Stopped,
            }
            if announce.finished && announce.running {
                written = written.and(writeln!(out, "{}", job.status()));
            }
            self.jobs.push(job);
        }
        written.map(|()| finished)
    }
}

/// Which announcements a sweep prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Announce {
    pub finished: bool,
    /// Only honoured together with `finished`.
    pub running: bool,
}

impl Announce {
    pub const SILENT: Announce = Announce {
        finished: false,
        running: false,
    };
    pub const FINISHED: Announce = Announce {
        finished: true,
        running: false,
    };
    pub const ALL: Announce = Announce {
        finished: true,
        running: true,
    };
}

/// Outcome of a non-blocking status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Alive, with nothing new to report since the last check.
    Unchanged,
    Running,
    Stopped,
    Terminated,
}

/// A non-blocking status check for a child process.
pub trait StatusProbe {
    fn probe(&mut self, pid: Pid) -> ProcessState;
}

/// Probes with `waitpid(pid, WNOHANG)`, collecting the exit status of
/// terminated children and noticing stops and continues.
#[derive(Debug, Default, Clone, Copy)]
pub struct WaitPid;

impl StatusProbe for WaitPid {
    fn probe(&mut self, pid: Pid) -> ProcessState {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        loop {
            match waitpid(pid, Some(flags)) {
                Ok(WaitStatus::Stopped(..)) => return ProcessState::Stopped,
                Ok(WaitStatus::Continued(_)) => return ProcessState::Running,
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    tracing::debug!(?status, "reaped child");
                    return ProcessState::Terminated;
                }
                Ok(_) => return ProcessState::Unchanged,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    // Nothing left to collect for this pid.
                    tracing::warn!(%pid, "unable to check job status: {}", e);
                    return ProcessState::Terminated;
                }
            }
        }
    }
}
