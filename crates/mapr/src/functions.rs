//! Functions usable in `set` expressions.

use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};

use crate::error::QueryError;

/// A string function applied by `set`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetFunction {
    /// Lowercase hex MD5 digest of the input.
    Md5Sum,
    /// Every ASCII digit replaced by `.`.
    MaskDigits,
}

impl SetFunction {
    /// Name as written in queries.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Md5Sum => "md5sum",
            Self::MaskDigits => "maskdigits",
        }
    }

    /// Applies the function.
    pub fn apply(self, input: &str) -> String {
        match self {
            Self::Md5Sum => {
                let digest = Md5::digest(input.as_bytes());
                digest.iter().map(|byte| format!("{byte:02x}")).collect()
            }
            Self::MaskDigits => input
                .chars()
                .map(|c| if c.is_ascii_digit() { '.' } else { c })
                .collect(),
        }
    }
}

impl FromStr for SetFunction {
    type Err = QueryError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "md5sum" => Ok(Self::Md5Sum),
            "maskdigits" => Ok(Self::MaskDigits),
            _ => Err(QueryError::UnknownFunction(name.to_owned())),
        }
    }
}

impl fmt::Display for SetFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5sum_is_lowercase_hex() {
        assert_eq!(
            SetFunction::Md5Sum.apply("hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn maskdigits_replaces_digits_only() {
        assert_eq!(
            SetFunction::MaskDigits.apply("user 1234 at 10.0.0.1"),
            "user .... at ........"
        );
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("MD5SUM".parse::<SetFunction>().unwrap(), SetFunction::Md5Sum);
        assert!("sha1".parse::<SetFunction>().is_err());
    }
}
