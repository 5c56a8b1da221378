//! Read-only access to previously accepted lines.
//!
//! The log itself belongs to the line editor; builtins only ever list it.

use rustyline::history::DefaultHistory;

/// Anything that can list accepted lines, oldest first.
pub trait HistorySource {
    fn lines(&self) -> Vec<&str>;
}

impl HistorySource for DefaultHistory {
    fn lines(&self) -> Vec<&str> {
        self.iter().map(String::as_str).collect()
    }
}

impl HistorySource for [String] {
    fn lines(&self) -> Vec<&str> {
        self.iter().map(String::as_str).collect()
    }
}

impl HistorySource for Vec<String> {
    fn lines(&self) -> Vec<&str> {
        self.as_slice().lines()
    }
}
