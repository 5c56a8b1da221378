//! The execution core of a small job-control shell.
//!
//! One raw input line is split into a flat argument vector, checked against the
//! shell's own built-in commands, and otherwise launched as a child process in
//! its own process group. Foreground children own the controlling terminal
//! until they exit; background children are tracked in a [`job::JobTable`] and
//! reaped lazily between input lines.
//!
//! The main entry point is [`Interpreter`], which wires a [`session::Session`]
//! to a line editor. The public modules expose the individual stages so they
//! can be driven and tested on their own.

pub mod builtin;
pub mod error;
pub mod external;
pub mod history;
mod interpreter;
pub mod job;
pub mod lexer;
pub mod parser;
pub mod session;
mod terminal;

/// Re-export of the read loop.
///
/// See [`Interpreter`] for the per-line control flow.
pub use interpreter::{Interpreter, LineOutcome};
