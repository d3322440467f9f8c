#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `protocol` defines everything that travels over a DTail session: the
//! command envelope the client writes (`protocol V base64 B;`), the decoded
//! command grammar (`verb:opt=val:opt=val ARG …`), and the frames the server
//! streams back (`REMOTE|…`, `SERVER|…`, `AGGREGATE|…`, hidden control
//! messages) separated by the single byte [`MESSAGE_DELIMITER`].
//!
//! # Design
//!
//! - [`Command`] and [`Request`] model the decoded client command. They
//!   render with [`std::fmt::Display`] and parse with [`std::str::FromStr`]
//!   so the exact text re-sent on reconnect is always reproducible.
//! - [`Frame`] models one server-to-client message.
//! - [`FrameCodec`] and [`CommandCodec`] plug both directions into
//!   [`tokio_util::codec`] so sessions can be driven as streams and sinks.
//! - [`CompatVersion`] captures the compatibility string exchanged in the
//!   `protocol` token and decides whether a legacy newline must follow
//!   every frame.
//!
//! # Invariants
//!
//! - A frame never contains [`MESSAGE_DELIMITER`] except as its terminator;
//!   [`FrameCodec`] escapes that byte inside frame bodies and restores it
//!   on decode, so content round-trips byte for byte.
//! - A command envelope never contains [`COMMAND_TERMINATOR`] except as its
//!   terminator (base64 has no `;`).
//!
//! # Examples
//!
//! ```
//! use protocol::{Command, Options, Request, ReadMode};
//!
//! let command = Command::new(
//!     Options { spartan: true, ..Options::default() },
//!     Request::Read {
//!         mode: ReadMode::Cat,
//!         glob: "/var/log/app.log".to_owned(),
//!         regex: "regex:noop ".to_owned(),
//!     },
//! );
//! let text = command.to_string();
//! assert_eq!(text, "cat:spartan=true /var/log/app.log regex:noop ");
//! assert_eq!(text.parse::<Command>().unwrap(), command);
//! ```

mod codec;
mod command;
mod constants;
mod envelope;
mod error;
mod frame;
mod version;

pub use codec::{CommandCodec, FrameCodec, MAX_FRAME_LENGTH};
pub use command::{Command, Options, ReadMode, Request};
pub use constants::{
    ACK_CLOSE_CONNECTION, AGGREGATE_DELIMITER, AGGREGATE_GROUP_KEY_COMBINATOR,
    AGGREGATE_KV_DELIMITER, COMMAND_TERMINATOR, CSV_DELIMITER, FIELD_DELIMITER, HIDDEN_PREFIX,
    MESSAGE_DELIMITER, SYN_CLOSE_CONNECTION,
};
pub use envelope::{Envelope, encode_envelope};
pub use error::ProtocolError;
pub use frame::Frame;
pub use version::{CompatVersion, PROTOCOL_COMPAT};
