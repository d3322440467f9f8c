//! Host key verification with interactive trust.
//!
//! A [`TrustStore`] answers the SSH client's host key callback. Keys found
//! in the known hosts file pass immediately. Anything else becomes an
//! [`UnknownHost`] on a channel; whoever drains the channel (the client's
//! prompter) answers each entry and persists the trusted ones through
//! [`KnownHosts::trust`], so edits to the file are serialised by a single
//! task. Rejected hosts are remembered for the rest of the run.

use std::sync::Arc;

use dashmap::DashSet;
use russh::keys::{HashAlg, PublicKey};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::known_hosts::{host_pattern, HostStatus, KnownHostEntry, KnownHosts};

/// A host whose key is not (or no longer) in the known hosts file.
#[derive(Debug)]
pub struct UnknownHost {
    /// `host:port` as dialed.
    pub address: String,
    /// Line to add when trusted.
    pub entry: KnownHostEntry,
    /// SHA-256 fingerprint for display.
    pub fingerprint: String,
    /// Whether a different key was on file.
    pub status: HostStatus,
    reply: oneshot::Sender<bool>,
}

impl UnknownHost {
    /// Sends the verdict back to the waiting connection.
    pub fn answer(self, trusted: bool) {
        let _ = self.reply.send(trusted);
    }
}

#[derive(Debug)]
enum Policy {
    Prompt(mpsc::Sender<UnknownHost>),
    AcceptAll,
}

/// Host key verification shared by all connections of a run.
#[derive(Debug)]
pub struct TrustStore {
    known_hosts: KnownHosts,
    policy: Policy,
    untrusted: DashSet<String>,
}

impl TrustStore {
    /// Store that forwards unknown hosts to `prompts`.
    pub fn new(known_hosts: KnownHosts, prompts: mpsc::Sender<UnknownHost>) -> Arc<Self> {
        Arc::new(Self {
            known_hosts,
            policy: Policy::Prompt(prompts),
            untrusted: DashSet::new(),
        })
    }

    /// Store that accepts every key without recording it.
    pub fn accept_all(known_hosts: KnownHosts) -> Arc<Self> {
        Arc::new(Self {
            known_hosts,
            policy: Policy::AcceptAll,
            untrusted: DashSet::new(),
        })
    }

    /// The known hosts file consulted.
    pub fn known_hosts(&self) -> &KnownHosts {
        &self.known_hosts
    }

    /// Whether `address` was rejected earlier in this run.
    pub fn is_untrusted(&self, address: &str) -> bool {
        self.untrusted.contains(address)
    }

    /// Decides whether the key presented by `host:port` is trusted.
    pub async fn verify(&self, host: &str, port: u16, key: &PublicKey) -> bool {
        let address = format!("{host}:{port}");
        if self.is_untrusted(&address) {
            return false;
        }
        let sender = match &self.policy {
            Policy::AcceptAll => return true,
            Policy::Prompt(sender) => sender,
        };

        let entry = match KnownHostEntry::new(host, port, key) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%address, %err, "unable to encode host key");
                return false;
            }
        };
        let known_hosts = self.known_hosts.clone();
        let pattern = host_pattern(host, port);
        let (algorithm, blob) = (entry.algorithm.clone(), entry.key.clone());
        let status = tokio::task::spawn_blocking(move || known_hosts.check(&pattern, &algorithm, &blob))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| e.to_string()));
        let status = match status {
            Ok(HostStatus::Known) => return true,
            Ok(status) => status,
            Err(err) => {
                warn!(%address, %err, "unable to read known hosts");
                HostStatus::Unknown
            }
        };
        if status == HostStatus::Changed {
            warn!(%address, "host key differs from the known hosts entry");
        }

        let (reply, verdict) = oneshot::channel();
        let request = UnknownHost {
            address: address.clone(),
            fingerprint: key.fingerprint(HashAlg::Sha256).to_string(),
            entry,
            status,
            reply,
        };
        let trusted = sender.send(request).await.is_ok() && verdict.await.unwrap_or(false);
        if !trusted {
            debug!(%address, "host marked untrusted");
            self.untrusted.insert(address);
        }
        trusted
    }
}

