//! Serialisable line regex with `default`, `invert` and `noop` flags.

use std::fmt;
use std::str::FromStr;

use regex::bytes::Regex;

use crate::error::FilterError;

const PREFIX: &str = "regex";

/// How a [`LineRegex`] decides whether a line passes.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum RegexFlag {
    /// Lines matching the pattern pass.
    #[default]
    Default,
    /// Lines not matching the pattern pass.
    Invert,
    /// Every line passes.
    Noop,
}

impl RegexFlag {
    /// Wire spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Invert => "invert",
            Self::Noop => "noop",
        }
    }
}

/// A compiled regex that survives the trip to the server as text.
///
/// The serialised form is `regex:FLAG PATTERN`; the pattern is everything
/// after the first space and may itself contain spaces.
#[derive(Clone, Debug)]
pub struct LineRegex {
    pattern: String,
    flag: RegexFlag,
    compiled: Option<Regex>,
}

impl LineRegex {
    /// Compiles `pattern`. An empty pattern (or `.`) degrades to
    /// [`RegexFlag::Noop`] unless inverted.
    pub fn new(pattern: &str, flag: RegexFlag) -> Result<Self, FilterError> {
        let flag = match flag {
            RegexFlag::Default if pattern.is_empty() || pattern == "." => RegexFlag::Noop,
            other => other,
        };
        let compiled = match flag {
            RegexFlag::Noop => None,
            RegexFlag::Default | RegexFlag::Invert => Some(
                Regex::new(pattern)
                    .map_err(|source| FilterError::compile(pattern.to_owned(), source))?,
            ),
        };
        Ok(Self {
            pattern: pattern.to_owned(),
            flag,
            compiled,
        })
    }

    /// A regex letting every line through.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            pattern: String::new(),
            flag: RegexFlag::Noop,
            compiled: None,
        }
    }

    /// The pattern as given.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The effective flag.
    #[must_use]
    pub const fn flag(&self) -> RegexFlag {
        self.flag
    }

    /// Whether `line` passes the filter.
    #[must_use]
    pub fn is_match(&self, line: &[u8]) -> bool {
        match (&self.compiled, self.flag) {
            (Some(regex), RegexFlag::Default) => regex.is_match(line),
            (Some(regex), RegexFlag::Invert) => !regex.is_match(line),
            _ => true,
        }
    }

    /// The wire form, `regex:FLAG PATTERN`.
    #[must_use]
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LineRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}:{} {}", self.flag.as_str(), self.pattern)
    }
}

impl FromStr for LineRegex {
    type Err = FilterError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.trim().is_empty() {
            return Ok(Self::noop());
        }
        let (head, pattern) = text.split_once(' ').unwrap_or((text, ""));
        let flags = head
            .strip_prefix(PREFIX)
            .ok_or_else(|| FilterError::malformed(text.to_owned()))?;

        let mut flag = RegexFlag::Default;
        for name in flags.trim_start_matches(':').split(',').filter(|f| !f.is_empty()) {
            flag = match name {
                "default" => flag,
                "invert" => RegexFlag::Invert,
                "noop" => RegexFlag::Noop,
                _ => return Err(FilterError::malformed(text.to_owned())),
            };
        }
        Self::new(pattern, flag)
    }
}

impl PartialEq for LineRegex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.flag == other.flag
    }
}

impl Eq for LineRegex {}
