#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `server` is the `dserver` side of DTail. [`Server`] implements
//! [`transport::SessionHandler`]: every session, whether it arrived over
//! SSH through [`SshListener`] or in-process through the serverless
//! connector, is served by the same code.
//!
//! # Design
//!
//! A session reads enveloped commands and dispatches each to its own task:
//!
//! - `cat`, `grep` and `tail` expand a file glob, check the user's read
//!   permissions and stream every file through a blocking reader and the
//!   line filter. Readers are bounded by two pools, one for whole-file
//!   reads and one for tails; a saturated pool queues the request and
//!   tells the client.
//! - `map` installs an aggregate that the following reads feed instead of
//!   sending lines; partial results go out as `AGGREGATE` frames every
//!   query interval and once more when the session closes.
//! - `run` executes a permitted program in its own process group.
//! - `health` answers `OK`.
//!
//! When the last task ends the session drains its output, sends
//! `.syn close connection` and waits briefly for the client's
//! acknowledgement.
//!
//! [`run`] wires a complete process: host key, listener, connection
//! limit, the periodic `MAPREDUCE:STATS` line ([`report_stats`]) and the
//! scheduled and continuous jobs from the configuration.
//!
//! # Errors
//!
//! Process-level failures are [`ServerError`]s. Failures inside a session
//! become `SERVER` messages to the client and never end sibling commands.

mod error;
mod files;
mod handler;
mod jobs;
mod listener;
mod map;
mod messenger;
mod pools;
mod read;
mod reader;
mod run;
mod runtime;
mod server;
mod stats;

pub use error::ServerError;
pub use files::{expand_once, glob_id};
pub use jobs::{RESTART_DELAY, SCHEDULE_CHECK};
pub use listener::SshListener;
pub use run::resolve_program;
pub use runtime::run;
pub use server::{Server, Timing};
pub use stats::{ConnectionGuard, STATS_TABLE, ServerStats, report_stats};
