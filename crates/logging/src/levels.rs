//! crates/logging/src/levels.rs
//! Log levels accepted by `-logLevel` and the configuration file.

use std::fmt;
use std::str::FromStr;

use crate::LoggingError;

/// Crates whose events are promoted by [`LogLevel::Verbose`].
pub const WORKSPACE_TARGETS: &[&str] = &[
    "dtail",
    "cli",
    "client",
    "compress",
    "config",
    "filters",
    "mapr",
    "protocol",
    "server",
    "transport",
];

/// Severity threshold for emitted log lines.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Errors and warnings.
    Warn,
    /// Regular operation messages.
    #[default]
    Info,
    /// Debug output from DTail's own crates, info from dependencies.
    Verbose,
    /// Debug output everywhere.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    /// All levels, quietest first.
    pub const ALL: [Self; 6] = [
        Self::Error,
        Self::Warn,
        Self::Info,
        Self::Verbose,
        Self::Debug,
        Self::Trace,
    ];

    /// Lowercase name as accepted on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// `EnvFilter` directive string equivalent to this level.
    pub fn directive(self) -> String {
        match self {
            Self::Verbose => {
                let mut directive = String::from("info");
                for target in WORKSPACE_TARGETS {
                    directive.push(',');
                    directive.push_str(target);
                    directive.push_str("=debug");
                }
                directive
            }
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "error" | "fatal" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" | "" => Ok(Self::Info),
            "verbose" => Ok(Self::Verbose),
            "debug" | "devel" => Ok(Self::Debug),
            "trace" | "all" => Ok(Self::Trace),
            _ => Err(LoggingError::UnknownLevel(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for level in LogLevel::ALL {
            assert_eq!(level.as_str().parse::<LogLevel>().unwrap(), level);
        }
    }

    #[test]
    fn aliases_are_accepted() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("fatal".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("devel".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn verbose_promotes_only_workspace_targets() {
        let directive = LogLevel::Verbose.directive();
        assert!(directive.starts_with("info,"));
        assert!(directive.contains("server=debug"));
        assert!(directive.contains("mapr=debug"));
        assert_eq!(LogLevel::Debug.directive(), "debug");
    }

    #[test]
    fn ordering_follows_verbosity() {
        assert!(LogLevel::Error < LogLevel::Info);
        assert!(LogLevel::Trace > LogLevel::Debug);
    }
}
