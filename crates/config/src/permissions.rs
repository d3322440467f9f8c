//! Per-user access rules.
//!
//! A rule is written as `[readfiles:|runcommands:][!]REGEX`. Rules without a
//! prefix apply to file reads. A subject is allowed when at least one
//! positive rule of its kind matches and no negated rule of that kind does.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// What a rule governs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PermissionKind {
    /// Paths that may be opened by `cat`, `grep`, `tail` and `map`.
    ReadFiles,
    /// Command lines that may be executed by `run`.
    RunCommands,
}

/// One compiled rule.
#[derive(Clone, Debug)]
pub struct PermissionRule {
    kind: PermissionKind,
    negated: bool,
    regex: Regex,
}

impl PermissionRule {
    /// Compiles a rule from its textual form.
    pub fn parse(rule: &str) -> Result<Self, ConfigError> {
        let (kind, rest) = if let Some(rest) = rule.strip_prefix("readfiles:") {
            (PermissionKind::ReadFiles, rest)
        } else if let Some(rest) = rule.strip_prefix("runcommands:") {
            (PermissionKind::RunCommands, rest)
        } else {
            (PermissionKind::ReadFiles, rule)
        };
        let (negated, pattern) = match rest.strip_prefix('!') {
            Some(pattern) => (true, pattern),
            None => (false, rest),
        };
        let regex = Regex::new(pattern).map_err(|source| ConfigError::Permission {
            rule: rule.to_owned(),
            source,
        })?;
        Ok(Self {
            kind,
            negated,
            regex,
        })
    }

    /// The kind of subject this rule applies to.
    pub const fn kind(&self) -> PermissionKind {
        self.kind
    }

    /// Whether a match denies instead of allows.
    pub const fn is_negated(&self) -> bool {
        self.negated
    }
}

/// The compiled rule list of one user.
#[derive(Clone, Debug, Default)]
pub struct PermissionSet {
    rules: Vec<PermissionRule>,
}

impl PermissionSet {
    /// Compiles every rule.
    pub fn compile<S: AsRef<str>>(rules: &[S]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|rule| PermissionRule::parse(rule.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    /// Evaluates `subject` against the rules of `kind`.
    pub fn allows(&self, kind: PermissionKind, subject: &str) -> bool {
        let mut allowed = false;
        for rule in self.rules.iter().filter(|rule| rule.kind == kind) {
            if !rule.regex.is_match(subject) {
                continue;
            }
            if rule.negated {
                return false;
            }
            allowed = true;
        }
        allowed
    }
}

/// The `Permissions` section of the server configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Permissions {
    /// Rules for users without an entry in `users`.
    pub default: Vec<String>,
    /// Rules per user name.
    pub users: BTreeMap<String, Vec<String>>,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            default: vec!["readfiles:^/.*".to_owned()],
            users: BTreeMap::new(),
        }
    }
}

impl Permissions {
    /// Compiled rules for `user`, falling back to the default list.
    pub fn for_user(&self, user: &str) -> Result<PermissionSet, ConfigError> {
        let rules = self.users.get(user).unwrap_or(&self.default);
        PermissionSet::compile(rules)
    }

    /// Compiles every rule once to surface configuration mistakes early.
    pub fn validate(&self) -> Result<(), ConfigError> {
        PermissionSet::compile(&self.default)?;
        for rules in self.users.values() {
            PermissionSet::compile(rules)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_permissions_allow_absolute_paths_only() {
        let set = Permissions::default().for_user("anyone").unwrap();
        assert!(set.allows(PermissionKind::ReadFiles, "/var/log/syslog"));
        assert!(!set.allows(PermissionKind::ReadFiles, "relative/file.log"));
        assert!(!set.allows(PermissionKind::RunCommands, "/bin/ls"));
    }

    #[test]
    fn negated_rule_wins_over_positive_match() {
        let set = PermissionSet::compile(&["^/var/log/.*", "!\\.secret$"]).unwrap();
        assert!(set.allows(PermissionKind::ReadFiles, "/var/log/app.log"));
        assert!(!set.allows(PermissionKind::ReadFiles, "/var/log/app.secret"));
    }

    #[test]
    fn run_rules_are_separate_from_read_rules() {
        let set = PermissionSet::compile(&["readfiles:^/tmp/", "runcommands:^/usr/bin/uptime$"])
            .unwrap();
        assert!(set.allows(PermissionKind::RunCommands, "/usr/bin/uptime"));
        assert!(!set.allows(PermissionKind::RunCommands, "/tmp/evil"));
        assert!(set.allows(PermissionKind::ReadFiles, "/tmp/evil"));
    }

    #[test]
    fn per_user_rules_replace_defaults() {
        let mut permissions = Permissions::default();
        permissions
            .users
            .insert("ops".to_owned(), vec!["^/srv/".to_owned()]);
        let set = permissions.for_user("ops").unwrap();
        assert!(!set.allows(PermissionKind::ReadFiles, "/var/log/syslog"));
        assert!(set.allows(PermissionKind::ReadFiles, "/srv/app.log"));
    }

    #[test]
    fn invalid_regex_is_reported_with_rule() {
        let err = PermissionRule::parse("readfiles:![unclosed").unwrap_err();
        assert!(err.to_string().contains("[unclosed"));
    }
}
