use crate::builtin;
use crate::external::{self, Launch};
use crate::history::HistorySource;
use crate::job::Announce;
use crate::lexer;
use crate::parser;
use crate::session::Session;
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use std::io::{self, Write};

/// What the read loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Exit,
}

/// The shell's read loop.
///
/// Each line goes through the tokenizer, background detection, the builtin
/// dispatcher and, when it is not a builtin, the process launcher. Finished
/// background jobs are announced whenever a line is blank, a builtin runs, or
/// a command has been launched.
///
/// Example
/// ```
/// use jobshell::{Interpreter, LineOutcome};
/// use jobshell::session::Session;
///
/// let mut sh = Interpreter::new(Session::detached("> "));
/// let history: Vec<String> = Vec::new();
/// let (mut out, mut err) = (Vec::new(), Vec::new());
/// let outcome = sh.process_line("exit", &history, &mut out, &mut err);
/// assert_eq!(outcome, LineOutcome::Exit);
/// ```
pub struct Interpreter {
    session: Session,
}

impl Interpreter {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handle one raw input line.
    ///
    /// Diagnostics go to `stderr`; job announcements and builtin output go to
    /// `stdout`. Every error is local to the line.
    pub fn process_line(
        &mut self,
        line: &str,
        history: &dyn HistorySource,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> LineOutcome {
        let mut argv = match lexer::split_into_tokens(line) {
            Ok(argv) => argv,
            Err(e) => {
                let _ = writeln!(stderr, "jobshell: {e}");
                return LineOutcome::Continue;
            }
        };
        if argv.is_empty() {
            self.session.sweep(Announce::FINISHED, stdout);
            return LineOutcome::Continue;
        }

        let placement = parser::detect_background(&mut argv);
        if argv.is_empty() {
            // The line was a bare `&`.
            self.session.sweep(Announce::FINISHED, stdout);
            return LineOutcome::Continue;
        }

        if builtin::dispatch(&argv, &mut self.session, history, stdout, stderr) {
            return if self.session.is_exiting() {
                LineOutcome::Exit
            } else {
                LineOutcome::Continue
            };
        }

        match external::launch(&mut self.session, line.trim(), &argv, placement, stdout) {
            Ok(Launch::Completed { pid, code }) => {
                tracing::debug!(%pid, code, "foreground command finished");
            }
            Ok(launch) => tracing::debug!(?launch, "command left running"),
            Err(e) => {
                let _ = writeln!(stderr, "jobshell: {e}");
                self.session.sweep(Announce::FINISHED, stdout);
            }
        }
        LineOutcome::Continue
    }

    /// Read lines from the terminal until end-of-input or `exit`.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        // Every accepted line is recorded, repeats included.
        let config = Config::builder().history_ignore_dups(false)?.build();
        let mut rl = DefaultEditor::with_config(config)?;

        loop {
            let readline = rl.readline(self.session.prompt());
            match readline {
                Ok(line) => {
                    let outcome = self.process_line(
                        &line,
                        rl.history(),
                        &mut io::stdout(),
                        &mut io::stderr(),
                    );
                    if !line.trim().is_empty()
                        && let Err(e) = rl.add_history_entry(line.as_str())
                    {
                        tracing::warn!("failed to add history entry: {}", e);
                    }
                    if outcome == LineOutcome::Exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        tracing::info!(jobs = self.session.jobs().len(), "session ended");
        Ok(())
    }
}
