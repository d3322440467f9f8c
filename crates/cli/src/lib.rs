#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` implements the command-line front-ends of the six DTail
//! programs: `dtail`, `dcat`, `dgrep` and `dmap` fan one request out to
//! many servers, `dtailhealth` checks a single server and `dserver` runs
//! the server itself. Each binary is a one-line `main` around [`run`].
//!
//! # Design
//!
//! [`run`] parses the arguments with a [`clap`](https://docs.rs/clap/)
//! definition per [`Program`]. Single-dash long flags (`-servers`) are
//! rewritten to clap's double-dash form first, so both spellings work.
//! Parsed flags are layered over the configuration file and environment,
//! logging is installed, and a multi-threaded tokio runtime drives the
//! rest.
//!
//! Without `-servers` and `-discovery` the client programs run
//! serverless: the server handler lives in the same process and no SSH
//! connection is made.
//!
//! # Errors
//!
//! `run` never panics. Usage mistakes are printed to the error stream with
//! [`ExitCode::Warning`], start-up failures with [`ExitCode::Fatal`], and
//! runs in which a server failed end with [`ExitCode::Critical`].
//!
//! # Examples
//!
//! ```
//! use cli::{ExitCode, Program, run};
//!
//! let mut stdout = Vec::new();
//! let mut stderr = Vec::new();
//! let code = run(Program::Cat, ["dcat", "-version"], &mut stdout, &mut stderr);
//!
//! assert_eq!(code, ExitCode::Ok);
//! assert!(String::from_utf8(stdout).unwrap().starts_with("dcat "));
//! ```

use std::ffi::OsString;
use std::io::Write;

mod arguments;
mod error;
mod exit_code;
mod fanout;
mod health;
mod prompt;
mod serve;
mod setup;

pub use arguments::{ClientArgs, HealthArgs, Parsed, Program, ServerArgs, clap_command, normalize, parse_args};
pub use error::CliError;
pub use exit_code::ExitCode;

/// Version shared by every program.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Banner printed by `-version`.
pub fn version_line(program: Program) -> String {
    format!("{} {VERSION} (protocol {})", program.name(), protocol::PROTOCOL_COMPAT)
}

/// Runs `program` with `arguments` (program name first).
///
/// Streamed content and server messages of client runs go to the process's
/// own stdout and stderr; `stdout` and `stderr` receive the program's own
/// output such as the version, usage errors and health verdicts.
pub fn run<I, T>(program: Program, arguments: I, stdout: &mut dyn Write, stderr: &mut dyn Write) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let parsed = match parse_args(program, arguments) {
        Ok(parsed) => parsed,
        Err(err) => {
            let rendered = err.render().to_string();
            return if err.use_stderr() {
                let _ = write!(stderr, "{rendered}");
                ExitCode::Warning
            } else {
                let _ = write!(stdout, "{rendered}");
                ExitCode::Ok
            };
        }
    };

    let outcome = match parsed {
        Parsed::Version => {
            let _ = writeln!(stdout, "{}", version_line(program));
            return ExitCode::Ok;
        }
        Parsed::Client(args) => fanout::run(program, &args),
        Parsed::Health(args) => health::run(&args, stdout),
        Parsed::Server(args) => serve::run(&args),
    };
    match outcome {
        Ok(code) => code,
        Err(CliError::Usage(message)) => {
            let _ = writeln!(stderr, "{}: {message}", program.name());
            ExitCode::Warning
        }
        Err(err) => {
            let _ = writeln!(stderr, "{}: {err}", program.name());
            ExitCode::Fatal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_captured(program: Program, args: &[&str]) -> (ExitCode, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = run(program, args.iter().copied(), &mut out, &mut err);
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn version_is_printed_for_every_program() {
        let (code, out, err) = run_captured(Program::Server, &["dserver", "--version"]);
        assert_eq!(code, ExitCode::Ok);
        assert!(out.starts_with("dserver "));
        assert!(err.is_empty());
    }

    #[test]
    fn help_goes_to_stdout() {
        let (code, out, _) = run_captured(Program::Map, &["dmap", "-help"]);
        assert_eq!(code, ExitCode::Ok);
        assert!(out.contains("-query"));
    }

    #[test]
    fn unknown_flags_are_usage_errors() {
        let (code, _, err) = run_captured(Program::Tail, &["dtail", "--bogus"]);
        assert_eq!(code, ExitCode::Warning);
        assert!(err.contains("--bogus"));
    }

    #[test]
    fn missing_files_are_usage_errors() {
        let (code, _, err) = run_captured(Program::Cat, &["dcat", "-cfg", "none"]);
        assert_eq!(code, ExitCode::Warning);
        assert!(err.starts_with("dcat: "));
    }

    #[test]
    fn unreadable_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let missing = missing.to_str().unwrap();
        let (code, _, _) = run_captured(Program::Cat, &["dcat", "-cfg", missing, "-files", "/x"]);
        assert_eq!(code, ExitCode::Fatal);
    }
}
