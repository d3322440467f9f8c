//! The server's SSH host key.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use russh::keys::ssh_key::private::{Ed25519Keypair, KeypairData};
use russh::keys::ssh_key::LineEnding;
use russh::keys::{load_secret_key, PrivateKey};
use tracing::info;

use crate::error::TransportError;

/// Loads the host key at `path`, generating an Ed25519 key there first if
/// the file is missing. New key files are created with mode `0600`.
pub fn load_or_generate(path: &Path) -> Result<PrivateKey, TransportError> {
    if path.exists() {
        return Ok(load_secret_key(path, None)?);
    }

    let seed: [u8; 32] = rand::random();
    let keypair = Ed25519Keypair::from_seed(&seed);
    let key = PrivateKey::new(KeypairData::from(keypair), "dtail host key")
        .map_err(|e| TransportError::KeyEncoding(e.to_string()))?;
    let encoded = key
        .to_openssh(LineEnding::LF)
        .map_err(|e| TransportError::KeyEncoding(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| TransportError::file(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| TransportError::file(path, e))?;
    file.write_all(encoded.as_bytes())
        .map_err(|e| TransportError::file(path, e))?;
    info!(path = %path.display(), "generated new host key");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_is_reloaded_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("ssh_host_key");
        let first = load_or_generate(&path).unwrap();
        let second = load_or_generate(&path).unwrap();
        assert_eq!(
            first.public_key().to_openssh().unwrap(),
            second.public_key().to_openssh().unwrap()
        );
        let mode = fs::metadata(&path).unwrap().permissions();
        assert_eq!(std::os::unix::fs::PermissionsExt::mode(&mode) & 0o777, 0o600);
    }
}
