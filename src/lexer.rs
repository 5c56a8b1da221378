//! Splitting a raw input line into an argument vector.
//!
//! There is no quoting, escaping or expansion: a command is a flat sequence of
//! tokens separated by runs of spaces.

use std::fmt;

use nix::unistd::{SysconfVar, sysconf};

/// Used when the platform does not report an argument limit.
const FALLBACK_ARG_MAX: usize = 4096;

/// Errors that can occur while splitting a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexingError {
    /// The line holds more tokens than the platform allows for one program.
    TooManyArguments { limit: usize },
}

impl fmt::Display for LexingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexingError::TooManyArguments { limit } => {
                write!(f, "too many arguments (limit is {limit})")
            }
        }
    }
}

impl std::error::Error for LexingError {}

/// The maximum number of tokens accepted on one line, from `sysconf(_SC_ARG_MAX)`.
pub fn argument_limit() -> usize {
    match sysconf(SysconfVar::ARG_MAX) {
        Ok(Some(limit)) if limit > 0 => limit as usize,
        _ => FALLBACK_ARG_MAX,
    }
}

/// Split `line` into tokens using the platform argument limit.
///
/// Leading and trailing whitespace is stripped first; the remainder is split
/// on runs of spaces. A blank line yields an empty vector.
pub fn split_into_tokens(line: &str) -> Result<Vec<String>, LexingError> {
    split_with_limit(line, argument_limit())
}

/// Same as [`split_into_tokens`] with an explicit token limit.
pub fn split_with_limit(line: &str, limit: usize) -> Result<Vec<String>, LexingError> {
    let mut tokens = Vec::new();
    for token in line.trim().split(' ').filter(|t| !t.is_empty()) {
        if tokens.len() == limit {
            return Err(LexingError::TooManyArguments { limit });
        }
        tokens.push(token.to_owned());
    }
    Ok(tokens)
}
