//! The SQL-like map-reduce query.
//!
//! ```text
//! select AGG(field) | field [, ...]
//! from TABLE
//! [where field OP value [and ...]]
//! [set $field = fn(...(expr)...) [, ...]]
//! [group by field [, ...]]
//! [order by field | rorder by field]
//! [interval N] [limit N] [outfile [append] path] [logformat NAME]
//! ```
//!
//! Clauses may appear in any order. Keywords are case-insensitive and
//! commas are whitespace. A [`Query`] prints back into text that parses
//! to an equal query.

mod clauses;
mod lexer;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use clauses::{Condition, Operand, Operator, SelectField, SetClause, KEYWORDS};
pub use lexer::{tokenize, Token, TokenKind};

use crate::error::QueryError;
use clauses::write_field;

/// Seconds between partial aggregate flushes when `interval` is absent.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Log format used when `logformat` is absent.
pub const DEFAULT_LOG_FORMAT: &str = "default";

/// Sort request from `order by` or `rorder by`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderBy {
    /// Selected column name (as produced by [`SelectField::name`]).
    pub field: String,
    /// `rorder by`: ascending instead of descending.
    pub reverse: bool,
}

/// Where results are written instead of the terminal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Outfile {
    /// Target CSV path.
    pub path: PathBuf,
    /// Append rows instead of replacing the file.
    pub append: bool,
}

/// A parsed query.
#[derive(Clone, Debug)]
pub struct Query {
    raw: String,
    /// Selected fields, in output column order.
    pub select: Vec<SelectField>,
    /// `MAPREDUCE:` table lines must carry; empty accepts any.
    pub table: String,
    /// All conditions must hold.
    pub conditions: Vec<Condition>,
    /// Field rewrites, applied in order after `where`.
    pub sets: Vec<SetClause>,
    /// Fields forming the group key.
    pub group_by: Vec<String>,
    /// Optional result ordering.
    pub order_by: Option<OrderBy>,
    /// Flush period of partial aggregates.
    pub interval: Duration,
    /// Maximum rows rendered; `None` renders all.
    pub limit: Option<usize>,
    /// Optional CSV output.
    pub outfile: Option<Outfile>,
    /// Log format parser name.
    pub log_format: String,
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.select == other.select
            && self.table == other.table
            && self.conditions == other.conditions
            && self.sets == other.sets
            && self.group_by == other.group_by
            && self.order_by == other.order_by
            && self.interval == other.interval
            && self.limit == other.limit
            && self.outfile == other.outfile
            && self.log_format == other.log_format
    }
}

const CLAUSES: &[&str] = &[
    "select",
    "from",
    "where",
    "set",
    "group",
    "order",
    "rorder",
    "interval",
    "limit",
    "outfile",
    "logformat",
];

fn starts_clause(token: &Token) -> bool {
    CLAUSES.iter().any(|clause| token.is_keyword(clause))
}

impl Query {
    /// Parses query text.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for grammar violations, an empty `select`
    /// list, or an `order by` column that is not selected.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(text)?;
        let mut query = Self {
            raw: text.trim().to_owned(),
            select: Vec::new(),
            table: String::new(),
            conditions: Vec::new(),
            sets: Vec::new(),
            group_by: Vec::new(),
            order_by: None,
            interval: DEFAULT_INTERVAL,
            limit: None,
            outfile: None,
            log_format: DEFAULT_LOG_FORMAT.to_owned(),
        };

        let mut pos = 0;
        while pos < tokens.len() {
            let keyword = &tokens[pos];
            if !starts_clause(keyword) {
                return Err(QueryError::UnexpectedToken(keyword.text.clone()));
            }
            let end = tokens[pos + 1..]
                .iter()
                .position(starts_clause)
                .map_or(tokens.len(), |offset| pos + 1 + offset);
            let args = &tokens[pos + 1..end];
            query.apply_clause(&keyword.text.to_ascii_lowercase(), args)?;
            pos = end;
        }

        if query.select.is_empty() {
            return Err(QueryError::EmptySelect);
        }
        if let Some(order) = &query.order_by {
            if !query.select.iter().any(|field| field.name() == order.field) {
                return Err(QueryError::OrderByNotSelected(order.field.clone()));
            }
        }
        Ok(query)
    }

    fn apply_clause(&mut self, keyword: &str, args: &[Token]) -> Result<(), QueryError> {
        match keyword {
            "select" => {
                for token in args {
                    self.select.push(SelectField::parse(token)?);
                }
            }
            "from" => {
                let [table] = args else {
                    return Err(QueryError::Expected {
                        keyword: "from",
                        expected: "one table name",
                    });
                };
                self.table.clone_from(&table.text);
            }
            "where" => {
                let operands: Vec<&Token> = args.iter().filter(|t| !t.is_keyword("and")).collect();
                if operands.is_empty() || operands.len() % 3 != 0 {
                    return Err(QueryError::Expected {
                        keyword: "where",
                        expected: "conditions of the form 'field OP value'",
                    });
                }
                for chunk in operands.chunks(3) {
                    self.conditions.push(Condition {
                        lhs: Operand::from_token(chunk[0]),
                        op: Operator::parse(&chunk[1].text)?,
                        rhs: Operand::from_token(chunk[2]),
                    });
                }
            }
            "set" => {
                if args.is_empty() || args.len() % 3 != 0 {
                    return Err(QueryError::Expected {
                        keyword: "set",
                        expected: "assignments of the form '$field = expr'",
                    });
                }
                for chunk in args.chunks(3) {
                    if chunk[1].text != "=" {
                        return Err(QueryError::Expected {
                            keyword: "set",
                            expected: "'=' after the target field",
                        });
                    }
                    self.sets.push(SetClause::parse(&chunk[0], &chunk[2])?);
                }
            }
            "group" => {
                let fields = strip_by("group by", args)?;
                if fields.is_empty() {
                    return Err(QueryError::Expected {
                        keyword: "group by",
                        expected: "at least one field",
                    });
                }
                self.group_by
                    .extend(fields.iter().map(|token| token.text.clone()));
            }
            "order" | "rorder" => {
                let reverse = keyword == "rorder";
                let name = if reverse { "rorder by" } else { "order by" };
                let [field] = strip_by(name, args)? else {
                    return Err(QueryError::Expected {
                        keyword: name,
                        expected: "exactly one field",
                    });
                };
                self.order_by = Some(OrderBy {
                    field: SelectField::parse(field)?.name(),
                    reverse,
                });
            }
            "interval" => {
                let secs: u64 = single_number("interval", args)?;
                self.interval = Duration::from_secs(secs.max(1));
            }
            "limit" => {
                let limit: i64 = single_number("limit", args)?;
                self.limit = usize::try_from(limit).ok();
            }
            "outfile" => {
                let (append, rest) = match args {
                    [first, rest @ ..] if first.is_keyword("append") => (true, rest),
                    _ => (false, args),
                };
                let [path] = rest else {
                    return Err(QueryError::Expected {
                        keyword: "outfile",
                        expected: "one path",
                    });
                };
                self.outfile = Some(Outfile {
                    path: PathBuf::from(&path.text),
                    append,
                });
            }
            "logformat" => {
                let [format] = args else {
                    return Err(QueryError::Expected {
                        keyword: "logformat",
                        expected: "one format name",
                    });
                };
                self.log_format = format.text.to_ascii_lowercase();
            }
            other => return Err(QueryError::UnexpectedToken(other.to_owned())),
        }
        Ok(())
    }

    /// The query text as given by the user.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Column names in output order.
    pub fn columns(&self) -> Vec<String> {
        self.select.iter().map(SelectField::name).collect()
    }

    /// Whether a `group by` clause is present.
    pub fn has_group_by(&self) -> bool {
        !self.group_by.is_empty()
    }
}

fn strip_by<'a>(keyword: &'static str, args: &'a [Token]) -> Result<&'a [Token], QueryError> {
    match args {
        [by, rest @ ..] if by.is_keyword("by") => Ok(rest),
        _ => Err(QueryError::Expected {
            keyword,
            expected: "'by'",
        }),
    }
}

fn single_number<T: FromStr>(keyword: &'static str, args: &[Token]) -> Result<T, QueryError> {
    let [token] = args else {
        return Err(QueryError::Expected {
            keyword,
            expected: "one number",
        });
    };
    token.text.parse().map_err(|_| QueryError::InvalidNumber {
        keyword,
        value: token.text.clone(),
    })
}

impl FromStr for Query {
    type Err = QueryError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("select ")?;
        write_list(f, &self.select)?;
        if !self.table.is_empty() {
            f.write_str(" from ")?;
            write_field(f, &self.table)?;
        }
        for (index, condition) in self.conditions.iter().enumerate() {
            f.write_str(if index == 0 { " where " } else { " and " })?;
            write!(f, "{condition}")?;
        }
        if !self.sets.is_empty() {
            f.write_str(" set ")?;
            write_list(f, &self.sets)?;
        }
        if !self.group_by.is_empty() {
            f.write_str(" group by ")?;
            for (index, field) in self.group_by.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write_field(f, field)?;
            }
        }
        if let Some(order) = &self.order_by {
            f.write_str(if order.reverse { " rorder by " } else { " order by " })?;
            write_field(f, &order.field)?;
        }
        if self.interval != DEFAULT_INTERVAL {
            write!(f, " interval {}", self.interval.as_secs())?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {limit}")?;
        }
        if let Some(outfile) = &self.outfile {
            f.write_str(" outfile ")?;
            if outfile.append {
                f.write_str("append ")?;
            }
            write!(f, "\"{}\"", outfile.path.display())?;
        }
        if self.log_format != DEFAULT_LOG_FORMAT {
            write!(f, " logformat {}", self.log_format)?;
        }
        Ok(())
    }
}
