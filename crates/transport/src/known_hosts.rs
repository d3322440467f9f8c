//! OpenSSH `known_hosts` reading and atomic rewriting.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use russh::keys::PublicKey;

use crate::error::TransportError;

/// Verdict of a known hosts lookup.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostStatus {
    /// An entry matches host and key.
    Known,
    /// An entry for the host exists with a different key.
    Changed,
    /// No entry mentions the host.
    Unknown,
}

/// One `known_hosts` line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KnownHostEntry {
    /// Host patterns (`name`, `[name]:port`).
    pub patterns: Vec<String>,
    /// Key algorithm, e.g. `ssh-ed25519`.
    pub algorithm: String,
    /// Base64 key blob.
    pub key: String,
}

impl KnownHostEntry {
    /// Entry for `host:port` holding `key`.
    pub fn new(host: &str, port: u16, key: &PublicKey) -> Result<Self, TransportError> {
        let (algorithm, blob) = key_parts(key)?;
        Ok(Self {
            patterns: vec![host_pattern(host, port)],
            algorithm,
            key: blob,
        })
    }

    /// Parses a line; comments, markers and hashed hosts yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('@') || line.starts_with('|') {
            return None;
        }
        let mut parts = line.split_whitespace();
        let patterns = parts.next()?.split(',').map(str::to_owned).collect();
        let algorithm = parts.next()?.to_owned();
        let key = parts.next()?.to_owned();
        Some(Self {
            patterns,
            algorithm,
            key,
        })
    }

    /// Whether any pattern names `pattern`.
    pub fn mentions(&self, pattern: &str) -> bool {
        self.patterns.iter().any(|p| p.eq_ignore_ascii_case(pattern))
    }

    /// The line as written to the file.
    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.patterns.join(","), self.algorithm, self.key)
    }
}

/// `host`, or `[host]:port` when the port is not 22.
pub fn host_pattern(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_owned()
    } else {
        format!("[{host}]:{port}")
    }
}

/// Algorithm name and base64 blob of a public key.
pub fn key_parts(key: &PublicKey) -> Result<(String, String), TransportError> {
    let text = key
        .to_openssh()
        .map_err(|e| TransportError::KeyEncoding(e.to_string()))?;
    let mut parts = text.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(algorithm), Some(blob)) => Ok((algorithm.to_owned(), blob.to_owned())),
        _ => Err(TransportError::KeyEncoding(text.clone())),
    }
}

/// A `known_hosts` file.
#[derive(Clone, Debug)]
pub struct KnownHosts {
    path: PathBuf,
}

impl KnownHosts {
    /// Wraps `path`; the file need not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> io::Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.lines().map(str::to_owned).collect()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// Looks up `pattern` with a fresh read of the file.
    pub fn check(&self, pattern: &str, algorithm: &str, key: &str) -> Result<HostStatus, TransportError> {
        let lines = self
            .read_lines()
            .map_err(|e| TransportError::file(&self.path, e))?;
        let mut status = HostStatus::Unknown;
        for entry in lines.iter().filter_map(|l| KnownHostEntry::parse(l)) {
            if !entry.mentions(pattern) {
                continue;
            }
            if entry.algorithm == algorithm && entry.key == key {
                return Ok(HostStatus::Known);
            }
            status = HostStatus::Changed;
        }
        Ok(status)
    }

    /// Adds `entries`, dropping older lines that mention any of their
    /// patterns. The file is replaced through a temporary file and a
    /// rename so readers never observe a partial file.
    pub fn trust(&self, entries: &[KnownHostEntry]) -> Result<(), TransportError> {
        let lines = self
            .read_lines()
            .map_err(|e| TransportError::file(&self.path, e))?;
        let collides = |line: &String| {
            KnownHostEntry::parse(line).is_some_and(|old| {
                entries
                    .iter()
                    .any(|new| new.patterns.iter().any(|p| old.mentions(p)))
            })
        };

        let mut contents = String::new();
        for line in lines.iter().filter(|line| !collides(line)) {
            contents.push_str(line);
            contents.push('\n');
        }
        for entry in entries {
            contents.push_str(&entry.to_line());
            contents.push('\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TransportError::file(parent, e))?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        let mut file = fs::File::create(&tmp).map_err(|e| TransportError::file(&tmp, e))?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| TransportError::file(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| TransportError::file(&self.path, e))
    }
}
