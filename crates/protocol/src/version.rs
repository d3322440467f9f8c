//! Protocol compatibility strings.

use std::fmt;

/// Compatibility string spoken by this build.
///
/// Client and server must agree on it exactly; peers speaking `3` or older
/// additionally expect a newline after every frame.
pub const PROTOCOL_COMPAT: &str = "4";

/// A compatibility string as announced by a peer in its `protocol` token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompatVersion {
    raw: String,
}

impl CompatVersion {
    /// Wraps the raw version string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The version spoken by this build.
    pub fn current() -> Self {
        Self::new(PROTOCOL_COMPAT)
    }

    /// Returns the raw version string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Leading numeric component, if any.
    pub fn major(&self) -> Option<u32> {
        let digits: String = self.raw.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    /// Whether this peer is exactly compatible with the local build.
    pub fn is_compatible(&self) -> bool {
        self.raw == PROTOCOL_COMPAT
    }

    /// Peers at version 3 or below separate frames with a trailing newline.
    pub fn expects_newline(&self) -> bool {
        self.major().is_some_and(|major| major <= 3)
    }

    /// Human readable explanation of a mismatch, naming the side to update.
    ///
    /// `self` is the client's version as seen by the server.
    pub fn mismatch_message(&self) -> String {
        let ours = CompatVersion::current();
        let update = match (self.major(), ours.major()) {
            (Some(theirs), Some(local)) if theirs < local => "please update the DTail client",
            (Some(theirs), Some(local)) if theirs > local => "please update the DTail server",
            _ => "please update DTail on both sides",
        };
        format!(
            "The DTail server protocol version '{ours}' does not match client protocol version '{self}', {update}"
        )
    }
}

impl fmt::Display for CompatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_version_is_compatible() {
        assert!(CompatVersion::current().is_compatible());
        assert!(!CompatVersion::current().expects_newline());
    }

    #[test]
    fn legacy_versions_expect_newline() {
        assert!(CompatVersion::new("3").expects_newline());
        assert!(CompatVersion::new("2").expects_newline());
        assert!(!CompatVersion::new("5").expects_newline());
        assert!(!CompatVersion::new("garbage").expects_newline());
    }

    #[test]
    fn mismatch_message_names_the_outdated_side() {
        assert!(
            CompatVersion::new("3")
                .mismatch_message()
                .contains("update the DTail client")
        );
        assert!(
            CompatVersion::new("9")
                .mismatch_message()
                .contains("update the DTail server")
        );
    }
}
