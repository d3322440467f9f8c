//! Interactive trust decisions for unknown server host keys.
//!
//! Connections that meet an unknown key park on a channel. The prompter
//! collects them into batches so the operator is asked once per wave of
//! connections rather than once per server. A batch closes at
//! [`BATCH_LIMIT`] hosts or once [`BATCH_WINDOW`] passes without a new one.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use transport::{HostStatus, KnownHosts, UnknownHost};

/// Most hosts shown in one question.
pub const BATCH_LIMIT: usize = 50;

/// How long a batch stays open after its latest host.
pub const BATCH_WINDOW: Duration = Duration::from_secs(2);

const QUEUE_DEPTH: usize = 1024;

/// An operator's reply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Answer {
    /// Trust this batch.
    Yes,
    /// Reject this batch.
    No,
    /// Trust this batch and every later one without asking.
    All,
    /// Show fingerprints, then ask again.
    Details,
}

impl FromStr for Answer {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Ok(Self::Yes),
            "n" | "no" => Ok(Self::No),
            "a" | "all" => Ok(Self::All),
            "d" | "details" => Ok(Self::Details),
            other => Err(format!("unrecognised answer '{other}'")),
        }
    }
}

/// Terminal (or scripted) side of the conversation.
pub trait Prompter: Send {
    /// Shows informational text.
    fn show(&mut self, text: &str);
    /// Asks `question`; `None` when no answer can be read.
    fn ask(&mut self, question: &str) -> Option<String>;
}

/// What the operator saw for one host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostSummary {
    /// `host:port`.
    pub address: String,
    /// SHA-256 key fingerprint.
    pub fingerprint: String,
    /// Unknown, or changed since it was recorded.
    pub status: HostStatus,
}

impl fmt::Display for HostSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            HostStatus::Changed => "CHANGED",
            HostStatus::Known => "known",
            HostStatus::Unknown => "unknown",
        };
        write!(f, "{} {} ({status})", self.address, self.fingerprint)
    }
}

/// Verdict on a batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Trust these hosts.
    Trust,
    /// Trust these and all later hosts.
    TrustAll,
    /// Reject these hosts.
    Reject,
}

/// Asks about `hosts` until a usable answer arrives.
pub fn decide(prompter: &mut dyn Prompter, hosts: &[HostSummary]) -> Decision {
    let names: Vec<&str> = hosts.iter().map(|h| h.address.as_str()).collect();
    prompter.show(&format!(
        "Encountered {} unknown host key(s): {}",
        hosts.len(),
        names.join(", ")
    ));
    loop {
        let Some(reply) = prompter.ask("Trust these hosts? (y=yes, a=all, n=no, d=details)") else {
            return Decision::Reject;
        };
        match reply.parse::<Answer>() {
            Ok(Answer::Yes) => return Decision::Trust,
            Ok(Answer::All) => return Decision::TrustAll,
            Ok(Answer::No) => return Decision::Reject,
            Ok(Answer::Details) => {
                for host in hosts {
                    prompter.show(&host.to_string());
                }
            }
            Err(err) => prompter.show(&err),
        }
    }
}

/// Starts the prompting task. Feed the returned sender to
/// [`transport::TrustStore::new`]; the task ends when every sender is
/// gone or `cancel` fires, rejecting whatever is still queued.
pub fn spawn_prompter(
    known_hosts: KnownHosts,
    prompter: Box<dyn Prompter>,
    cancel: CancellationToken,
) -> (mpsc::Sender<UnknownHost>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let task = tokio::spawn(prompt_loop(known_hosts, prompter, rx, cancel));
    (tx, task)
}

async fn prompt_loop(
    known_hosts: KnownHosts,
    mut prompter: Box<dyn Prompter>,
    mut rx: mpsc::Receiver<UnknownHost>,
    cancel: CancellationToken,
) {
    let mut trust_all = false;
    loop {
        let first = tokio::select! {
            () = cancel.cancelled() => break,
            host = rx.recv() => host,
        };
        let Some(first) = first else { break };
        let batch = collect_batch(first, &mut rx).await;

        let decision = if trust_all {
            Decision::TrustAll
        } else {
            let summaries: Vec<HostSummary> = batch
                .iter()
                .map(|host| HostSummary {
                    address: host.address.clone(),
                    fingerprint: host.fingerprint.clone(),
                    status: host.status,
                })
                .collect();
            let asked = tokio::task::spawn_blocking(move || {
                let decision = decide(prompter.as_mut(), &summaries);
                (prompter, decision)
            })
            .await;
            match asked {
                Ok((returned, decision)) => {
                    prompter = returned;
                    decision
                }
                Err(err) => {
                    warn!(%err, "trust prompt failed");
                    reject(batch);
                    break;
                }
            }
        };

        match decision {
            Decision::Reject => {
                info!(hosts = batch.len(), "host keys rejected");
                reject(batch);
            }
            Decision::Trust | Decision::TrustAll => {
                trust_all |= decision == Decision::TrustAll;
                persist(&known_hosts, &batch).await;
                for host in batch {
                    host.answer(true);
                }
            }
        }
    }

    rx.close();
    let mut leftover = Vec::new();
    while let Ok(host) = rx.try_recv() {
        leftover.push(host);
    }
    reject(leftover);
}

/// Gathers `first` and whatever follows it, each arrival extending the
/// window by [`BATCH_WINDOW`].
async fn collect_batch<T>(first: T, rx: &mut mpsc::Receiver<T>) -> Vec<T> {
    let mut batch = vec![first];
    while batch.len() < BATCH_LIMIT {
        match tokio::time::timeout(BATCH_WINDOW, rx.recv()).await {
            Ok(Some(item)) => batch.push(item),
            Ok(None) | Err(_) => break,
        }
    }
    batch
}

async fn persist(known_hosts: &KnownHosts, batch: &[UnknownHost]) {
    let entries: Vec<_> = batch.iter().map(|host| host.entry.clone()).collect();
    let known_hosts = known_hosts.clone();
    let path = known_hosts.path().to_path_buf();
    let written = tokio::task::spawn_blocking(move || known_hosts.trust(&entries)).await;
    match written {
        Ok(Ok(())) => info!(hosts = batch.len(), path = %path.display(), "host keys trusted"),
        Ok(Err(err)) => warn!(%err, "cannot record trusted host keys"),
        Err(err) => warn!(%err, "cannot record trusted host keys"),
    }
}

fn reject(batch: Vec<UnknownHost>) {
    for host in batch {
        host.answer(false);
    }
}
