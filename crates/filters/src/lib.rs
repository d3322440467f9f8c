#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `filters` decides which lines a DTail reader ships to the client. It
//! provides the serialisable [`LineRegex`], the 100-line
//! [`TransmitSampler`] behind the transmitted percentage shown with every
//! line, the local grep context ([`GrepContext`], `-B/-A/-m`) and the
//! [`LineFilter`] stage tying them together.
//!
//! # Design
//!
//! - [`LineRegex`] carries a pattern and a [`RegexFlag`]
//!   (`default`/`invert`/`noop`) and travels to the server as
//!   `regex:FLAG PATTERN`.
//! - [`LineFilter::evaluate`] is synchronous; [`LineFilter::run`] drives it
//!   between two bounded channels. Tail readers may drop lines when the
//!   output is full; cat and grep readers, and any filter with an active
//!   context window, never do.
//!
//! # Invariants
//!
//! - Lines from one input keep their order on the output.
//! - The transmitted percentage is 100 whenever nothing in the last 100
//!   matched lines was dropped.
//! - `max_count == 0` disables the match limit.
//!
//! # Errors
//!
//! [`LineRegex::new`] and parsing report [`FilterError`] with the offending
//! pattern.
//!
//! # Examples
//!
//! ```
//! use filters::{LineRegex, RegexFlag};
//!
//! let regex = LineRegex::new("ERROR|WARN", RegexFlag::Invert).unwrap();
//! let wire = regex.serialize();
//! assert_eq!(wire, "regex:invert ERROR|WARN");
//!
//! let decoded: LineRegex = wire.parse().unwrap();
//! assert!(decoded.is_match(b"INFO all good"));
//! assert!(!decoded.is_match(b"ERROR broken"));
//! ```

mod context;
mod error;
mod filter;
mod line_regex;
mod sampler;

pub use context::{ContextOptions, GrepContext};
pub use error::FilterError;
pub use filter::{FilterStats, Line, LineFilter, RawLine};
pub use line_regex::{LineRegex, RegexFlag};
pub use sampler::{SAMPLE_WINDOW, TransmitSampler};
