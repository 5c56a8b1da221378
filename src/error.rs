use nix::errno::Errno;

/// Failures while turning the process into an interactive shell.
///
/// These are the only errors that end the whole process.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("couldn't wait for terminal ownership: {0}")]
    ForegroundWait(#[source] Errno),

    #[error("couldn't ignore job-control signals: {0}")]
    Signals(#[source] Errno),

    #[error("couldn't put the shell in its own process group: {0}")]
    ProcessGroup(#[source] Errno),

    #[error("couldn't take control of the terminal: {0}")]
    Terminal(#[source] Errno),
}

/// Failures while starting or supervising an external command.
///
/// Each one aborts the current line only.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("{0}: command not found")]
    NotFound(String),

    #[error("{0}: permission denied")]
    PermissionDenied(String),

    #[error("failed to start a new process for {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for process {pid}: {source}")]
    Wait {
        pid: nix::unistd::Pid,
        #[source]
        source: Errno,
    },

    #[error("empty command")]
    EmptyCommand,
}

impl LaunchError {
    pub(crate) fn from_spawn(command: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => LaunchError::NotFound(command.to_owned()),
            std::io::ErrorKind::PermissionDenied => {
                LaunchError::PermissionDenied(command.to_owned())
            }
            _ => LaunchError::Spawn {
                command: command.to_owned(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_spawn_errors_are_classified() {
        let err = LaunchError::from_spawn("nope", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.to_string(), "nope: command not found");

        let err = LaunchError::from_spawn("./x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, LaunchError::PermissionDenied(_)));

        let err = LaunchError::from_spawn("ls", io::Error::from_raw_os_error(nix::libc::EAGAIN));
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }
}
