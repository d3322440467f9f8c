use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing a query.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum QueryError {
    /// The query has no `select` fields.
    #[error("query has no select fields")]
    EmptySelect,

    /// A quote or backtick was not closed.
    #[error("unterminated {0} in query")]
    Unterminated(&'static str),

    /// A clause keyword was not followed by what it needs.
    #[error("'{keyword}' expects {expected}")]
    Expected {
        /// The clause keyword.
        keyword: &'static str,
        /// Human description of the missing part.
        expected: &'static str,
    },

    /// A `select` entry names an unknown aggregation.
    #[error("unknown aggregation function '{0}'")]
    UnknownAggregation(String),

    /// A `set` expression names an unknown function.
    #[error("unknown set function '{0}'")]
    UnknownFunction(String),

    /// A `where` condition uses an unknown operator.
    #[error("unknown where operator '{0}'")]
    UnknownOperator(String),

    /// The `order by` field is not one of the selected fields.
    #[error("order by field '{0}' is not selected")]
    OrderByNotSelected(String),

    /// A number could not be parsed.
    #[error("'{keyword}' expects a number, got '{value}'")]
    InvalidNumber {
        /// The clause keyword.
        keyword: &'static str,
        /// The offending token.
        value: String,
    },

    /// A token appeared outside of any clause.
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
}

/// Errors raised while folding values into aggregates.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AggregateError {
    /// An operator found a slot holding the wrong kind of value.
    #[error("aggregate slot '{key}' holds {found}, expected {expected}")]
    TypeMismatch {
        /// Storage key of the slot.
        key: String,
        /// Kind the operator needs.
        expected: &'static str,
        /// Kind that was found.
        found: &'static str,
    },

    /// A numeric operator received a non-numeric value.
    #[error("value '{value}' of '{key}' is not a number")]
    NotANumber {
        /// Storage key of the slot.
        key: String,
        /// The offending value.
        value: String,
    },

    /// A serialised aggregate could not be decoded.
    #[error("malformed serialised aggregate: {0}")]
    Malformed(String),
}

/// Errors raised by log format parsers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ParserError {
    /// The log format name is unknown.
    #[error("unknown log format '{0}'")]
    UnknownFormat(String),

    /// The log format is declared but has no implementation.
    #[error("log format '{0}' is not implemented")]
    NotImplemented(String),
}

/// Errors raised while writing results.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Writing or renaming the outfile failed.
    #[error("unable to write {path}: {source}")]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}
