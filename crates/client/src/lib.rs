#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `client` is the fan-out half of DTail. It turns operator flags into a
//! list of [`Target`]s, sends the same commands to every one of them and
//! hands the frames that come back to a per-session [`Handler`].
//!
//! # Design
//!
//! - [`Discovery`] resolves the server list (inline, file or a registered
//!   custom method), filters, deduplicates and optionally shuffles it.
//! - [`Engine`] runs one worker per target. Dials share a throttle sized
//!   by [`default_throttle`]; tail-style runs reconnect until cancelled
//!   and re-send the original commands on every session.
//! - [`Connector`] opens either an SSH session or a serverless one wired
//!   straight into an in-process server handler.
//! - Handlers print ([`BaseHandler`]), judge health ([`HealthHandler`]) or
//!   merge map-reduce partials ([`MaprHandler`]) whose result
//!   [`MaprReport`] presents.
//! - Unknown host keys are batched and put to the operator by
//!   [`spawn_prompter`].
//!
//! # Errors
//!
//! Fallible operations return [`ClientError`]. Per-server failures are
//! collected in [`RunSummary`] rather than aborting sibling sessions.

mod commands;
mod connector;
mod discovery;
mod engine;
mod error;
mod handler;
mod output;
mod prompter;
mod reduce;
mod session;
mod stats;

pub use commands::{health_command, map_commands, read_commands, run_command};
pub use connector::{Connector, OpenSession, SERVERLESS_NAME, Target};
pub use discovery::{CustomDiscovery, Discovery, DiscoveryMethod, DiscoveryRegistry, Endpoint};
pub use engine::{
    DEFAULT_CONNECTIONS_PER_CPU, Engine, EngineOptions, RECONNECT_DELAY, RetryPolicy, RunSummary,
    default_throttle,
};
pub use error::ClientError;
pub use handler::{BaseHandler, Handler, HandlerFactory, HealthHandler, HealthStatus};
pub use reduce::{MaprHandler, MaprReport, Reporting};
pub use output::{Capture, Printer};
pub use prompter::{
    Answer, BATCH_LIMIT, BATCH_WINDOW, Decision, HostSummary, Prompter, decide, spawn_prompter,
};
pub use session::{COMMAND_TIMEOUT, run_session};
pub use stats::{ClientStats, INTERRUPT_WINDOW, SessionGuard};
