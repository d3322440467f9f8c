#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `transport` carries DTail sessions. A session is an authenticated byte
//! stream between a client connector and a server-side
//! [`SessionHandler`]; the protocol spoken on top of it lives in the
//! `protocol` crate.
//!
//! # Design
//!
//! - [`dial`] connects over SSH (russh), authenticates with keys or a
//!   password and opens a shell channel whose stream is returned as a
//!   [`BoxedStream`].
//! - [`SshServer`] runs the server side of the SSH protocol on accepted
//!   TCP connections; authentication decisions come from [`AuthPolicy`].
//! - [`TrustStore`] verifies host keys against [`KnownHosts`] and routes
//!   unknown keys to an interactive prompter through a channel.
//! - [`connect_serverless`] pairs a client with an in-process handler over
//!   an in-memory pipe, skipping SSH entirely.
//!
//! # Invariants
//!
//! - The known hosts file is only ever replaced by rename, never
//!   rewritten in place.
//! - A host rejected once is not offered to the prompter again during the
//!   same run.
//!
//! # Errors
//!
//! All fallible operations return [`TransportError`];
//! [`TransportError::is_untrusted`] tells reconnect loops to give up.

mod auth;
mod authorized_keys;
mod client;
mod error;
mod host_key;
mod known_hosts;
mod server;
mod serverless;
mod session;
mod trust;

pub use auth::{AllowFrom, AuthPolicy, HEALTH_USER};
pub use authorized_keys::{candidate_files, AuthorizedKeys};
pub use client::{dial, ClientAuth, DialOptions, SessionHandle};
pub use error::TransportError;
pub use host_key::load_or_generate;
pub use known_hosts::{host_pattern, key_parts, HostStatus, KnownHostEntry, KnownHosts};
pub use server::SshServer;
pub use serverless::{connect_serverless, SERVERLESS_BUFFER};
pub use session::{AsyncStream, BoxedStream, SessionHandler, SessionInfo, SessionKind};
pub use trust::{TrustStore, UnknownHost};
