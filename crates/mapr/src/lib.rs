#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `mapr` is the map-reduce engine: it parses the SQL-like query language,
//! turns log lines into fields, folds them into per-group aggregates on the
//! server and merges the partial results on the client.
//!
//! # Design
//!
//! - [`Query`] is parsed once and shared (`Arc`) by every stage.
//! - A [`LogParser`] built by [`new_parser`] converts each line into
//!   [`Fields`].
//! - [`GroupSet::aggregate`] applies `where`, then `set`, then groups by the
//!   joined `group by` values and updates the group's [`AggregateSet`].
//! - Servers ship their group set as `AGGREGATE` payloads
//!   ([`GroupSet::serialize`]) every `interval` and reset it. Clients fold
//!   each payload into a local [`GroupSet`] and hand it to
//!   [`GlobalGroupSet::merge_noblock`].
//! - Slots are [`Value`]s; a slot of the wrong kind is reported as
//!   [`AggregateError::TypeMismatch`] rather than coerced.
//!
//! # Invariants
//!
//! - A parsed query has at least one `select` field and its `order by`
//!   column is one of them.
//! - Merging partial results is order independent for `count`, `sum`,
//!   `avg`, `min` and `max`.
//! - `avg` slots hold sums; the division by the sample count happens only
//!   when a result is rendered.
//!
//! # Examples
//!
//! ```
//! use mapr::{GroupSet, Query, new_parser};
//!
//! let query = Query::parse("select count($line) from STATS group by $hostname").unwrap();
//! let mut parser = new_parser(&query.log_format, &query.table, "web01").unwrap();
//! let mut groups = GroupSet::new();
//! let line = "INFO|20211002-071947|1|stats|8|9|0|0.1|60|MAPREDUCE:STATS|concurrentConnections=1";
//! if let Some(fields) = parser.parse(line) {
//!     groups.aggregate(&query, fields).unwrap();
//! }
//! assert_eq!(groups.to_csv(&query), "count($line)\n1\n");
//! ```

mod aggregate;
mod error;
mod functions;
mod global;
mod group;
mod parser;
mod query;
mod value;

pub use aggregate::{AggregateOp, AggregateSet};
pub use error::{AggregateError, OutputError, ParserError, QueryError};
pub use functions::SetFunction;
pub use global::{sidecar_path, GlobalGroupSet, QUERY_SIDECAR_SUFFIX};
pub use group::{group_key, GroupSet};
pub use parser::{
    new_parser, BaseFields, CsvParser, DefaultParser, Fields, GenericKvParser, GenericParser,
    LogParser, LOG_FORMATS,
};
pub use query::{
    tokenize, Condition, Operand, Operator, OrderBy, Outfile, Query, SelectField, SetClause, Token,
    TokenKind, DEFAULT_INTERVAL, DEFAULT_LOG_FORMAT, KEYWORDS,
};
pub use value::{compare_cells, Value};
