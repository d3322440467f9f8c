//! Server-side authentication policy.
//!
//! - Public keys are checked against the user's authorized keys files.
//! - The health user logs in with its own name as password.
//! - Scheduled and continuous jobs log in with the job name as password,
//!   but only from addresses their `allow_from` list names.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use config::Config;
use ipnet::IpNet;
use russh::keys::PublicKey;
use tracing::{debug, warn};

use crate::authorized_keys::{candidate_files, AuthorizedKeys};
use crate::session::SessionKind;

/// User (and password) of health check sessions.
pub const HEALTH_USER: &str = "DTAIL-HEALTH";

/// Addresses a job may authenticate from.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AllowFrom {
    nets: Vec<IpNet>,
    names: Vec<String>,
}

impl AllowFrom {
    /// Splits entries into networks (CIDRs or plain addresses) and names.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut allow = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if let Ok(net) = entry.parse::<IpNet>() {
                allow.nets.push(net);
            } else if let Ok(ip) = entry.parse::<IpAddr>() {
                allow.nets.push(IpNet::from(ip));
            } else if !entry.is_empty() {
                allow.names.push(entry.to_ascii_lowercase());
            }
        }
        allow
    }

    /// Whether `ip` is in a listed network, resolves back to a listed
    /// name, or is one of a listed name's addresses.
    pub async fn permits(&self, ip: IpAddr) -> bool {
        if self.nets.iter().any(|net| net.contains(&ip)) {
            return true;
        }
        if self.names.is_empty() {
            return false;
        }
        let names = self.names.clone();
        tokio::task::spawn_blocking(move || {
            if let Ok(reverse) = dns_lookup::lookup_addr(&ip) {
                let reverse = reverse.trim_end_matches('.').to_ascii_lowercase();
                if names.iter().any(|n| *n == reverse) {
                    return true;
                }
            }
            names.iter().any(|name| {
                dns_lookup::lookup_host(name).is_ok_and(|addrs| addrs.contains(&ip))
            })
        })
        .await
        .unwrap_or(false)
    }
}

/// Decides who may log in.
#[derive(Clone, Debug)]
pub struct AuthPolicy {
    cache_dir: PathBuf,
    jobs: HashMap<String, AllowFrom>,
}

impl AuthPolicy {
    /// Policy reading authorized keys from `cache_dir` and accepting the
    /// given `(job name, allow_from)` pairs.
    pub fn new(cache_dir: impl Into<PathBuf>, jobs: impl IntoIterator<Item = (String, AllowFrom)>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            jobs: jobs.into_iter().collect(),
        }
    }

    /// Policy for a server configuration; disabled jobs cannot log in.
    pub fn from_config(config: &Config) -> Self {
        let scheduled = config
            .server
            .schedule
            .iter()
            .filter(|job| job.enable)
            .map(|job| (job.name.clone(), AllowFrom::parse(job.allow_from.as_slice())));
        let continuous = config
            .server
            .continuous
            .iter()
            .filter(|job| job.enable)
            .map(|job| (job.name.clone(), AllowFrom::parse(job.allow_from.as_slice())));
        Self::new(config.common.cache_dir.clone(), scheduled.chain(continuous))
    }

    /// Password authentication; returns the session kind on success.
    pub async fn password(&self, user: &str, password: &str, peer: Option<IpAddr>) -> Option<SessionKind> {
        if user == HEALTH_USER {
            return (password == HEALTH_USER).then_some(SessionKind::Health);
        }
        let allow = self.jobs.get(password)?;
        let ip = peer?;
        if allow.permits(ip).await {
            debug!(%user, job = %password, %ip, "job authenticated");
            Some(SessionKind::Job(password.to_owned()))
        } else {
            warn!(%user, job = %password, %ip, "job login from address not in allow list");
            None
        }
    }

    /// Public key authentication against the user's authorized keys.
    pub async fn public_key(&self, user: &str, key: &PublicKey) -> bool {
        if user == HEALTH_USER {
            return false;
        }
        let files = candidate_files(&self.cache_dir, user);
        let key = key.clone();
        tokio::task::spawn_blocking(move || {
            files
                .iter()
                .find_map(|path| AuthorizedKeys::load(path).ok())
                .is_some_and(|keys| keys.contains(&key))
        })
        .await
        .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AuthPolicy {
        AuthPolicy::new(
            "cache",
            [(
                "nightly".to_owned(),
                AllowFrom::parse(&["10.1.0.0/16", "192.168.1.7"]),
            )],
        )
    }

    #[tokio::test]
    async fn health_user_needs_its_password() {
        let policy = policy();
        assert_eq!(
            policy.password(HEALTH_USER, HEALTH_USER, None).await,
            Some(SessionKind::Health)
        );
        assert_eq!(policy.password(HEALTH_USER, "guess", None).await, None);
    }

    #[tokio::test]
    async fn jobs_are_limited_to_their_networks() {
        let policy = policy();
        let inside: IpAddr = "10.1.4.2".parse().unwrap();
        let single: IpAddr = "192.168.1.7".parse().unwrap();
        let outside: IpAddr = "10.2.0.1".parse().unwrap();
        assert_eq!(
            policy.password("dtail", "nightly", Some(inside)).await,
            Some(SessionKind::Job("nightly".into()))
        );
        assert!(policy.password("dtail", "nightly", Some(single)).await.is_some());
        assert_eq!(policy.password("dtail", "nightly", Some(outside)).await, None);
        assert_eq!(policy.password("dtail", "other", Some(inside)).await, None);
        assert_eq!(policy.password("dtail", "nightly", None).await, None);
    }
}
