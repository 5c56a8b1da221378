//! Foreground/background detection on a tokenized command.

/// Where a launched command runs relative to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The shell waits for the command and hands it the terminal.
    Foreground,
    /// The command is tracked as a job and the shell keeps reading input.
    Background,
}

impl Placement {
    pub fn is_foreground(self) -> bool {
        self == Placement::Foreground
    }
}

/// Inspect the last token for a trailing `&` and strip it.
///
/// A last token that consisted only of `&` is removed entirely, so the vector
/// may come back empty; callers treat that like a blank line.
pub fn detect_background(argv: &mut Vec<String>) -> Placement {
    let Some(last) = argv.last_mut() else {
        return Placement::Foreground;
    };
    if !last.ends_with('&') {
        return Placement::Foreground;
    }
    last.pop();
    if last.is_empty() {
        argv.pop();
    }
    Placement::Background
}
