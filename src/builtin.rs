use crate::history::HistorySource;
use crate::job::Announce;
use crate::session::Session;
use anyhow::{Context as _, Result, anyhow};
use argh::{EarlyExit, FromArgs};
use nix::unistd::{User, getuid};
use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

/// Conventional exit status of a builtin: 0 for success, non-zero for error.
pub type ExitCode = i32;

/// What a builtin may touch while it runs.
pub struct Context<'a> {
    pub session: &'a mut Session,
    pub history: &'a dyn HistorySource,
    pub stdout: &'a mut dyn Write,
}

/// Commands interpreted by the shell itself.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// in-process without spawning a child.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd".
    fn name() -> &'static str;

    /// What the job sweep preceding this command reports.
    fn announce() -> Announce {
        Announce::FINISHED
    }

    /// Adjust the words before `argh` sees them.
    fn prepare<'a>(args: &[&'a str]) -> Vec<&'a str> {
        args.to_vec()
    }

    fn execute(self, ctx: &mut Context<'_>) -> Result<ExitCode>;
}

/// The set of recognised builtins, resolved once from the command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Cd,
    History,
    Jobs,
    Exit,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 4] = [
        BuiltinKind::Cd,
        BuiltinKind::History,
        BuiltinKind::Jobs,
        BuiltinKind::Exit,
    ];

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Cd => Cd::name(),
            BuiltinKind::History => History::name(),
            BuiltinKind::Jobs => Jobs::name(),
            BuiltinKind::Exit => Exit::name(),
        }
    }
}

/// Run `argv` as a builtin if its first word names one.
///
/// Every call sweeps the job table first, so finished background jobs are
/// announced even when the line turns out to be an external command.
/// Returns `true` when the line was handled here; errors from the builtin are
/// written to `stderr` and still count as handled.
pub fn dispatch(
    argv: &[String],
    session: &mut Session,
    history: &dyn HistorySource,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> bool {
    let Some(name) = argv.first() else {
        tracing::warn!("builtin dispatch called with an empty command vector");
        let _ = writeln!(stderr, "jobshell: invalid command: empty command vector");
        return false;
    };

    let Some(kind) = BuiltinKind::lookup(name) else {
        session.sweep(Announce::FINISHED, stdout);
        return false;
    };

    let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
    let mut ctx = Context {
        session,
        history,
        stdout,
    };
    let result = match kind {
        BuiltinKind::Cd => run::<Cd>(&args, &mut ctx),
        BuiltinKind::History => run::<History>(&args, &mut ctx),
        BuiltinKind::Jobs => run::<Jobs>(&args, &mut ctx),
        BuiltinKind::Exit => run::<Exit>(&args, &mut ctx),
    };
    match result {
        Ok(code) => tracing::debug!(builtin = kind.name(), code, "builtin finished"),
        Err(e) => {
            let _ = writeln!(stderr, "jobshell: {e:#}");
        }
    }
    true
}

fn run<T: BuiltinCommand>(args: &[&str], ctx: &mut Context<'_>) -> Result<ExitCode> {
    match T::from_args(&[T::name()], &T::prepare(args)) {
        Ok(cmd) => {
            ctx.session.sweep(T::announce(), ctx.stdout);
            cmd.execute(ctx)
        }
        Err(EarlyExit { output, status }) => {
            ctx.session.sweep(Announce::FINISHED, ctx.stdout);
            match status {
                Ok(()) => {
                    write!(ctx.stdout, "{output}")?;
                    Ok(0)
                }
                Err(()) => Err(anyhow!("{}: {}", T::name(), output.trim_end())),
            }
        }
    }
}

#[derive(FromArgs)]
/// Change the working directory of the shell.
/// Without a target, changes to $HOME or, if unset, the account's home directory.
/// Words after the first are ignored.
pub struct Cd {
    #[argh(positional, greedy)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Vec<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    /// Every word is a directory name, even `-x` or `help`; only `--help`
    /// keeps its meaning.
    fn prepare<'a>(args: &[&'a str]) -> Vec<&'a str> {
        match args.first() {
            None | Some(&"--help") | Some(&"--") => args.to_vec(),
            Some(_) => std::iter::once("--").chain(args.iter().copied()).collect(),
        }
    }

    fn execute(self, _ctx: &mut Context<'_>) -> Result<ExitCode> {
        let target = self.target.into_iter().next();
        let target = resolve_target(target, env::var_os("HOME"))?;
        env::set_current_dir(&target)
            .with_context(|| format!("cd: can't chdir to {}", target.display()))?;
        Ok(0)
    }
}

/// Pick the directory `cd` should switch to.
fn resolve_target(target: Option<String>, home: Option<OsString>) -> Result<PathBuf> {
    if let Some(target) = target {
        return Ok(PathBuf::from(target));
    }
    if let Some(home) = home {
        return Ok(PathBuf::from(home));
    }
    let uid = getuid();
    let user = User::from_uid(uid)
        .with_context(|| format!("cd: unable to get passwd entry for uid {uid}"))?
        .ok_or_else(|| anyhow!("cd: no passwd entry for uid {uid}"))?;
    Ok(user.dir)
}

#[derive(FromArgs)]
/// List previously entered lines, oldest first.
pub struct History {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn execute(self, ctx: &mut Context<'_>) -> Result<ExitCode> {
        for line in ctx.history.lines() {
            writeln!(ctx.stdout, "\t- {line}")?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List background jobs that are still running and report finished ones.
pub struct Jobs {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Jobs {
    fn name() -> &'static str {
        "jobs"
    }

    fn announce() -> Announce {
        Announce::ALL
    }

    fn execute(self, _ctx: &mut Context<'_>) -> Result<ExitCode> {
        // The listing is the sweep that ran before this call.
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Leave the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, ctx: &mut Context<'_>) -> Result<ExitCode> {
        ctx.session.request_exit();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    use std::env as stdenv;
    use std::fs;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use std::time::{Duration, Instant};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    struct Outcome {
        handled: bool,
        stdout: String,
        stderr: String,
    }

    fn run_line(session: &mut Session, history: &[&str], words: &[&str]) -> Outcome {
        let history = argv(history);
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let handled = dispatch(&argv(words), session, &history, &mut stdout, &mut stderr);
        Outcome {
            handled,
            stdout: String::from_utf8(stdout).unwrap(),
            stderr: String::from_utf8(stderr).unwrap(),
        }
    }

    #[test]
    fn test_lookup_is_exact() {
        assert_eq!(BuiltinKind::lookup("cd"), Some(BuiltinKind::Cd));
        assert_eq!(BuiltinKind::lookup("jobs"), Some(BuiltinKind::Jobs));
        assert_eq!(BuiltinKind::lookup("exit"), Some(BuiltinKind::Exit));
        assert_eq!(BuiltinKind::lookup("history"), Some(BuiltinKind::History));
        assert_eq!(BuiltinKind::lookup("CD"), None);
        assert_eq!(BuiltinKind::lookup("exit&"), None);
        assert_eq!(BuiltinKind::lookup("ls"), None);
    }

    #[test]
    fn test_exit_sets_flag() {
        let mut session = Session::detached("> ");
        let out = run_line(&mut session, &[], &["exit"]);
        assert!(out.handled);
        assert!(session.is_exiting());
    }

    #[test]
    fn test_exit_ignores_arguments() {
        let mut session = Session::detached("> ");
        assert!(run_line(&mut session, &[], &["exit", "3"]).handled);
        assert!(session.is_exiting());
    }

    #[test]
    fn test_unknown_command_is_not_handled() {
        let mut session = Session::detached("> ");
        let out = run_line(&mut session, &[], &["ls", "-la"]);
        assert!(!out.handled);
        assert!(out.stdout.is_empty());
        assert!(out.stderr.is_empty());
        assert!(!session.is_exiting());
    }

    #[test]
    fn test_empty_vector_is_reported() {
        let mut session = Session::detached("> ");
        let out = run_line(&mut session, &[], &[]);
        assert!(!out.handled);
        assert!(out.stderr.contains("invalid command"));
    }

    #[test]
    fn test_history_lists_lines_in_order() {
        let mut session = Session::detached("> ");
        let out = run_line(&mut session, &["ls", "sleep 5 &"], &["history"]);
        assert!(out.handled);
        assert_eq!(out.stdout, "\t- ls\n\t- sleep 5 &\n");
    }

    #[test]
    fn test_bad_arguments_are_reported_and_handled() {
        let mut session = Session::detached("> ");
        let out = run_line(&mut session, &[], &["jobs", "--bogus"]);
        assert!(out.handled);
        assert!(out.stderr.starts_with("jobshell: jobs:"));
    }

    #[test]
    fn test_extra_words_are_ignored() {
        let mut session = Session::detached("> ");
        for words in [&["jobs", "&"][..], &["jobs", "extra"], &["history", "&"]] {
            let out = run_line(&mut session, &["x"], words);
            assert!(out.handled);
            assert!(out.stderr.is_empty(), "{words:?} reported {:?}", out.stderr);
        }
    }

    #[test]
    fn test_cd_uses_first_word_only() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();

        let mut session = Session::detached("> ");
        let target = canonical.to_string_lossy().to_string();
        let out = run_line(&mut session, &[], &["cd", &target, "ignored", "&"]);
        let now = fs::canonicalize(stdenv::current_dir().unwrap()).unwrap();
        stdenv::set_current_dir(&orig).unwrap();

        assert!(out.stderr.is_empty(), "unexpected: {}", out.stderr);
        assert_eq!(now, canonical);
    }

    #[test]
    fn test_cd_into_dash_prefixed_directory() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();
        fs::create_dir(canonical.join("-dir")).unwrap();

        stdenv::set_current_dir(&canonical).unwrap();
        let mut session = Session::detached("> ");
        let out = run_line(&mut session, &[], &["cd", "-dir"]);
        let now = fs::canonicalize(stdenv::current_dir().unwrap()).unwrap();
        stdenv::set_current_dir(&orig).unwrap();

        assert!(out.stderr.is_empty(), "unexpected: {}", out.stderr);
        assert_eq!(now, canonical.join("-dir"));
    }

    #[test]
    fn test_cd_prepare_keeps_help_flags() {
        assert_eq!(Cd::prepare(&["-dir", "x"]), vec!["--", "-dir", "x"]);
        assert_eq!(Cd::prepare(&["help"]), vec!["--", "help"]);
        assert_eq!(Cd::prepare(&["--help"]), vec!["--help"]);
        assert!(Cd::prepare(&[]).is_empty());
    }

    #[test]
    fn test_help_goes_to_stdout() {
        let mut session = Session::detached("> ");
        let out = run_line(&mut session, &[], &["cd", "--help"]);
        assert!(out.handled);
        assert!(out.stdout.contains("Usage: cd"));
        assert!(out.stderr.is_empty());
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();

        let mut session = Session::detached("> ");
        let target = canonical.to_string_lossy().to_string();
        let out = run_line(&mut session, &[], &["cd", &target]);
        let now = fs::canonicalize(stdenv::current_dir().unwrap()).unwrap();
        stdenv::set_current_dir(&orig).unwrap();

        assert!(out.handled);
        assert!(out.stderr.is_empty(), "unexpected: {}", out.stderr);
        assert_eq!(now, canonical);
    }

    #[test]
    fn test_cd_nonexistent_path_leaves_cwd() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();

        let mut session = Session::detached("> ");
        let out = run_line(&mut session, &[], &["cd", "/nonexistent/jobshell/dir"]);

        assert!(out.handled);
        assert!(out.stderr.contains("cd: can't chdir to /nonexistent/jobshell/dir"));
        assert_eq!(stdenv::current_dir().unwrap(), orig);
        assert!(!session.is_exiting());
    }

    #[test]
    fn test_resolve_target_prefers_argument_then_home() {
        let explicit = resolve_target(Some("/tmp".into()), Some("/home/x".into())).unwrap();
        assert_eq!(explicit, PathBuf::from("/tmp"));

        let home = resolve_target(None, Some("/home/x".into())).unwrap();
        assert_eq!(home, PathBuf::from("/home/x"));
    }

    #[test]
    fn test_resolve_target_falls_back_to_passwd() {
        let resolved = resolve_target(None, None);
        match User::from_uid(getuid()) {
            Ok(Some(user)) => assert_eq!(resolved.unwrap(), user.dir),
            _ => assert!(resolved.is_err()),
        }
    }

    #[test]
    fn test_jobs_lists_running_then_done() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        let mut session = Session::detached("> ");
        session.track(pid, "sleep 30 &");

        let out = run_line(&mut session, &[], &["jobs"]);
        assert!(out.handled);
        assert_eq!(out.stdout, format!("[1] {pid} Running sleep 30 &\n"));

        kill(pid, Signal::SIGKILL).unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut seen = String::new();
        while !session.jobs().is_empty() && Instant::now() < deadline {
            seen.push_str(&run_line(&mut session, &[], &["jobs"]).stdout);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(session.jobs().is_empty());
        assert!(seen.ends_with("[1] Done sleep 30 &\n"), "got {seen:?}");
        // Already reaped through waitpid.
        let _ = child.try_wait();
    }

    #[test]
    fn test_other_builtins_do_not_list_running_jobs() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        let mut session = Session::detached("> ");
        session.track(pid, "sleep 30 &");
        let out = run_line(&mut session, &["x"], &["history"]);
        assert_eq!(out.stdout, "\t- x\n");
        assert_eq!(session.jobs().len(), 1);

        kill(pid, Signal::SIGKILL).unwrap();
        let _ = child.wait();
    }
}
