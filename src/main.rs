use std::env;
use std::process::ExitCode;

use argh::FromArgs;
use jobshell::Interpreter;
use jobshell::session::Session;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Flags understood on the command line.
const KNOWN_FLAGS: [&str; 3] = ["-v", "--version", "--help"];

#[derive(FromArgs)]
/// A small interactive shell with job control.
struct Args {
    #[argh(switch, short = 'v')]
    /// print the program name and version, then exit.
    version: bool,
}

impl Args {
    /// Parse the process arguments, reporting and dropping any flag that is
    /// not understood instead of refusing to start.
    fn from_env_lenient() -> Self {
        let argv: Vec<String> = env::args().collect();
        let program = argv.first().map(String::as_str).unwrap_or(env!("CARGO_PKG_NAME"));
        let known: Vec<&str> = argv
            .iter()
            .skip(1)
            .map(String::as_str)
            .filter(|arg| {
                let ok = KNOWN_FLAGS.contains(arg);
                if !ok {
                    eprintln!("{}: ignoring unrecognized option '{arg}'", env!("CARGO_PKG_NAME"));
                }
                ok
            })
            .collect();

        match Args::from_args(&[program], &known) {
            Ok(args) => args,
            Err(early) => {
                // Only --help gets here.
                println!("{}", early.output);
                std::process::exit(if early.status.is_ok() { 0 } else { 1 })
            }
        }
    }
}

fn version_line() -> String {
    format!(
        "{} Version {}.{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR")
    )
}

fn main() -> ExitCode {
    // Silent unless RUST_LOG is set; stderr keeps logs apart from job output.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::from_env_lenient();
    if args.version {
        println!("{}", version_line());
        return ExitCode::SUCCESS;
    }

    let session = match Session::init() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}: {e}", env!("CARGO_PKG_NAME"));
            return ExitCode::FAILURE;
        }
    };

    match Interpreter::new(session).repl() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", env!("CARGO_PKG_NAME"));
            ExitCode::FAILURE
        }
    }
}
