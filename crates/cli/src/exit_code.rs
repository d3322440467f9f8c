//! Process exit statuses shared by every program.

use std::fmt;

/// Exit status of a DTail program.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ExitCode {
    /// Everything worked.
    #[default]
    Ok,
    /// Usage errors, and health checks without a server.
    Warning,
    /// A server failed or could not be reached.
    Critical,
    /// The program could not initialise.
    Fatal,
}

impl ExitCode {
    /// Numeric status.
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Warning => 1,
            Self::Critical => 2,
            Self::Fatal => 3,
        }
    }

    /// Prefix of health check output.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARN",
            Self::Critical => "CRITICAL",
            Self::Fatal => "UNKNOWN",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.as_i32() as u8)
    }
}
