use std::fmt;

/// Error produced when a line regex cannot be compiled or deserialised.
#[derive(Debug)]
pub struct FilterError {
    pattern: String,
    source: Option<regex::Error>,
}

impl FilterError {
    /// Creates a new [`FilterError`] for a pattern that failed to compile.
    pub(crate) fn compile(pattern: String, source: regex::Error) -> Self {
        Self {
            pattern,
            source: Some(source),
        }
    }

    /// Creates a new [`FilterError`] for text that is not a serialised regex.
    pub(crate) fn malformed(text: String) -> Self {
        Self {
            pattern: text,
            source: None,
        }
    }

    /// Returns the offending pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(
                f,
                "failed to compile line regex '{}': {}",
                self.pattern, source
            ),
            None => write!(f, "malformed serialised regex '{}'", self.pattern),
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::FilterError;
    use std::error::Error as _;

    #[test]
    fn filter_error_preserves_pattern_and_source() {
        let regex_err = regex::Regex::new("(").unwrap_err();
        let error = FilterError::compile("(".into(), regex_err.clone());

        assert_eq!(error.pattern(), "(");
        assert!(error.to_string().contains("failed to compile"));
        assert_eq!(error.source().unwrap().to_string(), regex_err.to_string());
    }

    #[test]
    fn malformed_error_has_no_source() {
        let error = FilterError::malformed("grep:foo".into());
        assert!(error.source().is_none());
        assert!(error.to_string().contains("grep:foo"));
    }
}
