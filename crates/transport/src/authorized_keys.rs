//! `authorized_keys` lookup for public key authentication.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use russh::keys::PublicKey;

use crate::known_hosts::key_parts;

const KEY_TYPE_PREFIXES: &[&str] = &["ssh-", "ecdsa-sha2-", "sk-ssh-", "sk-ecdsa-"];

/// Keys allowed to log in as one user.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthorizedKeys {
    keys: Vec<(String, String)>,
}

impl AuthorizedKeys {
    /// Parses file contents. Options before the key type are ignored.
    pub fn parse(text: &str) -> Self {
        let keys = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                let at = tokens
                    .iter()
                    .position(|t| KEY_TYPE_PREFIXES.iter().any(|p| t.starts_with(p)))?;
                let blob = tokens.get(at + 1)?;
                Some((tokens[at].to_owned(), (*blob).to_owned()))
            })
            .collect();
        Self { keys }
    }

    /// Reads and parses `path`.
    pub fn load(path: &Path) -> io::Result<Self> {
        fs::read_to_string(path).map(|text| Self::parse(&text))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key was found.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether `key` is listed.
    pub fn contains(&self, key: &PublicKey) -> bool {
        key_parts(key).is_ok_and(|(algorithm, blob)| {
            self.keys.iter().any(|(a, b)| *a == algorithm && *b == blob)
        })
    }
}

/// Candidate files for `user`: `CACHE/<user>.authorized_keys`, then the
/// user's `~/.ssh/authorized_keys`.
pub fn candidate_files(cache_dir: &Path, user: &str) -> Vec<PathBuf> {
    if user.is_empty() || user.contains(['/', '\\']) || user.starts_with('.') {
        return Vec::new();
    }
    let mut files = vec![cache_dir.join(format!("{user}.authorized_keys"))];
    if let Ok(Some(account)) = nix::unistd::User::from_name(user) {
        files.push(account.dir.join(".ssh").join("authorized_keys"));
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_with_and_without_options() {
        let keys = AuthorizedKeys::parse(
            "# admins\n\
             ssh-ed25519 AAAAone alice@host\n\
             no-pty,from=\"10.0.0.0/8\" ssh-rsa AAAAtwo bob\n\
             garbage line\n",
        );
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.keys[1], ("ssh-rsa".to_owned(), "AAAAtwo".to_owned()));
    }

    #[test]
    fn user_names_cannot_escape_the_cache_dir() {
        assert!(candidate_files(Path::new("cache"), "../etc").is_empty());
        assert!(candidate_files(Path::new("cache"), "").is_empty());
        assert_eq!(
            candidate_files(Path::new("cache"), "nobody-here-xyz")[0],
            PathBuf::from("cache/nobody-here-xyz.authorized_keys")
        );
    }
}
