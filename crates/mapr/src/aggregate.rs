//! Per-group aggregate slots and their wire form.
//!
//! A serialised aggregate is one `AGGREGATE` frame payload:
//! `groupKey∥samples∥name≔value∥name≔value...`. Slot types are not on the
//! wire; the receiving side recovers them from the query's operators.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use protocol::{AGGREGATE_DELIMITER, AGGREGATE_KV_DELIMITER};

use crate::error::{AggregateError, QueryError};
use crate::parser::Fields;
use crate::query::{Query, SelectField};
use crate::value::Value;

/// Aggregation functions of `select`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AggregateOp {
    /// Number of samples.
    Count,
    /// Sum of numeric values.
    Sum,
    /// Mean; stored as a sum and divided by the samples on output.
    Avg,
    /// Smallest numeric value.
    Min,
    /// Largest numeric value.
    Max,
    /// Most recent value.
    Last,
    /// Length of the most recent value.
    Len,
}

impl AggregateOp {
    /// Name as written in queries.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Last => "last",
            Self::Len => "len",
        }
    }

    /// Whether slots of this operator hold text.
    pub const fn is_textual(self) -> bool {
        matches!(self, Self::Last)
    }

    fn decode(self, raw: &str, key: &str) -> Result<Value, AggregateError> {
        if self.is_textual() {
            return Ok(Value::Text(raw.to_owned()));
        }
        raw.parse()
            .map(Value::Number)
            .map_err(|_| AggregateError::NotANumber {
                key: key.to_owned(),
                value: raw.to_owned(),
            })
    }
}

impl FromStr for AggregateOp {
    type Err = QueryError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(match name.to_ascii_lowercase().as_str() {
            "count" => Self::Count,
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            "last" => Self::Last,
            "len" => Self::Len,
            _ => return Err(QueryError::UnknownAggregation(name.to_owned())),
        })
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_number(key: &str, raw: &str) -> Result<f64, AggregateError> {
    raw.trim()
        .parse()
        .map_err(|_| AggregateError::NotANumber {
            key: key.to_owned(),
            value: raw.to_owned(),
        })
}

fn expect_number(key: &str, value: &Value) -> Result<f64, AggregateError> {
    value.as_number().ok_or_else(|| AggregateError::TypeMismatch {
        key: key.to_owned(),
        expected: "a number",
        found: value.kind(),
    })
}

/// The aggregate slots of one group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateSet {
    /// Lines folded into this set.
    pub samples: u64,
    /// Slots keyed by [`SelectField::name`].
    pub values: BTreeMap<String, Value>,
}

impl AggregateSet {
    /// Folds one line's fields into the set.
    ///
    /// Returns `Ok(false)` and leaves the set untouched when a selected
    /// field is missing from `fields`.
    ///
    /// # Errors
    ///
    /// Fails when a numeric operator receives a non-numeric value.
    pub fn add(&mut self, query: &Query, fields: &Fields) -> Result<bool, AggregateError> {
        let mut inputs = Vec::with_capacity(query.select.len());
        for select in &query.select {
            match fields.get(&select.field) {
                Some(raw) => inputs.push((select, raw.as_str())),
                None => return Ok(false),
            }
        }

        let mut staged = Vec::with_capacity(inputs.len());
        for (select, raw) in inputs {
            let key = select.name();
            let current = self.values.get(&key);
            let next = fold(select, &key, current, raw)?;
            staged.push((key, next));
        }
        self.values.extend(staged);
        self.samples += 1;
        Ok(true)
    }

    /// Merges another partial result for the same group.
    ///
    /// # Errors
    ///
    /// Fails when the two sides disagree on a slot's type.
    pub fn merge(&mut self, query: &Query, other: &Self) -> Result<(), AggregateError> {
        for select in &query.select {
            let key = select.name();
            let Some(incoming) = other.values.get(&key) else {
                continue;
            };
            let merged = match self.values.get(&key) {
                None => incoming.clone(),
                Some(current) => combine(select, &key, current, incoming)?,
            };
            self.values.insert(key, merged);
        }
        self.samples += other.samples;
        Ok(())
    }

    /// Output value of one column, dividing averages by the samples.
    pub fn result(&self, select: &SelectField) -> String {
        let Some(value) = self.values.get(&select.name()) else {
            return String::new();
        };
        match (select.op, value) {
            (AggregateOp::Avg, Value::Number(sum)) if self.samples > 0 => {
                #[allow(clippy::cast_precision_loss)]
                let samples = self.samples as f64;
                Value::Number(sum / samples).to_string()
            }
            _ => value.to_string(),
        }
    }

    /// Renders the set as an `AGGREGATE` payload.
    pub fn serialize(&self, group_key: &str) -> String {
        let mut out = format!("{group_key}{AGGREGATE_DELIMITER}{}", self.samples);
        for (key, value) in &self.values {
            out.push_str(AGGREGATE_DELIMITER);
            out.push_str(key);
            out.push_str(AGGREGATE_KV_DELIMITER);
            out.push_str(&value.to_string());
        }
        out
    }

    /// Parses an `AGGREGATE` payload into its group key and set.
    ///
    /// # Errors
    ///
    /// Fails on a missing sample count, a part without `≔`, or a number
    /// slot that does not parse.
    pub fn deserialize(query: &Query, payload: &str) -> Result<(String, Self), AggregateError> {
        let mut parts = payload.split(AGGREGATE_DELIMITER);
        let group_key = parts.next().unwrap_or_default().to_owned();
        let samples = parts
            .next()
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| AggregateError::Malformed(payload.to_owned()))?;

        let mut set = Self {
            samples,
            values: BTreeMap::new(),
        };
        for part in parts {
            let (key, raw) = part
                .split_once(AGGREGATE_KV_DELIMITER)
                .ok_or_else(|| AggregateError::Malformed(part.to_owned()))?;
            let Some(select) = query.select.iter().find(|s| s.name() == key) else {
                continue;
            };
            set.values.insert(key.to_owned(), select.op.decode(raw, key)?);
        }
        Ok((group_key, set))
    }
}

fn fold(
    select: &SelectField,
    key: &str,
    current: Option<&Value>,
    raw: &str,
) -> Result<Value, AggregateError> {
    let value = match select.op {
        AggregateOp::Count => {
            let previous = current.map_or(Ok(0.0), |v| expect_number(key, v))?;
            Value::Number(previous + 1.0)
        }
        AggregateOp::Sum | AggregateOp::Avg => {
            let previous = current.map_or(Ok(0.0), |v| expect_number(key, v))?;
            Value::Number(previous + parse_number(key, raw)?)
        }
        AggregateOp::Min | AggregateOp::Max => {
            let incoming = parse_number(key, raw)?;
            let value = match current {
                None => incoming,
                Some(v) => {
                    let previous = expect_number(key, v)?;
                    if select.op == AggregateOp::Min {
                        previous.min(incoming)
                    } else {
                        previous.max(incoming)
                    }
                }
            };
            Value::Number(value)
        }
        AggregateOp::Last => Value::Text(raw.to_owned()),
        #[allow(clippy::cast_precision_loss)]
        AggregateOp::Len => Value::Number(raw.chars().count() as f64),
    };
    Ok(value)
}

fn combine(
    select: &SelectField,
    key: &str,
    current: &Value,
    incoming: &Value,
) -> Result<Value, AggregateError> {
    if select.op.is_textual() {
        return match incoming {
            Value::Text(_) => Ok(incoming.clone()),
            Value::Number(_) => Err(AggregateError::TypeMismatch {
                key: key.to_owned(),
                expected: "text",
                found: incoming.kind(),
            }),
        };
    }
    let a = expect_number(key, current)?;
    let b = expect_number(key, incoming)?;
    Ok(Value::Number(match select.op {
        AggregateOp::Count | AggregateOp::Sum | AggregateOp::Avg => a + b,
        AggregateOp::Min => a.min(b),
        AggregateOp::Max => a.max(b),
        AggregateOp::Len | AggregateOp::Last => b,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn query() -> Query {
        Query::parse("select count($line), sum($n), avg($n), min($n), max($n), last($t), len($t) from T")
            .unwrap()
    }

    #[test]
    fn folds_every_operator() {
        let q = query();
        let mut set = AggregateSet::default();
        for (n, t) in [("4", "a"), ("1", "bcd"), ("7", "ef")] {
            let f = fields(&[("$line", "x"), ("$n", n), ("$t", t)]);
            assert!(set.add(&q, &f).unwrap());
        }
        let results: Vec<String> = q.select.iter().map(|s| set.result(s)).collect();
        assert_eq!(results, ["3", "12", "4", "1", "7", "ef", "2"]);
        assert_eq!(set.samples, 3);
    }

    #[test]
    fn missing_field_skips_the_line() {
        let q = query();
        let mut set = AggregateSet::default();
        assert!(!set.add(&q, &fields(&[("$line", "x")])).unwrap());
        assert_eq!(set, AggregateSet::default());
    }

    #[test]
    fn non_numeric_input_is_an_error() {
        let q = query();
        let mut set = AggregateSet::default();
        let err = set
            .add(&q, &fields(&[("$line", "x"), ("$n", "lots"), ("$t", "a")]))
            .unwrap_err();
        assert!(matches!(err, AggregateError::NotANumber { .. }));
    }

    #[test]
    fn merge_rejects_mixed_slot_types() {
        let q = Query::parse("select sum($n) from T").unwrap();
        let mut left = AggregateSet::default();
        left.values.insert("sum($n)".into(), Value::Text("oops".into()));
        let mut right = AggregateSet::default();
        right.values.insert("sum($n)".into(), Value::Number(1.0));
        assert!(matches!(
            left.merge(&q, &right),
            Err(AggregateError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn wire_form_survives_transfer() {
        let q = query();
        let mut set = AggregateSet::default();
        set.add(&q, &fields(&[("$line", "x"), ("$n", "2.5"), ("$t", "hi there")]))
            .unwrap();
        let payload = set.serialize("web01,INFO");
        assert!(payload.starts_with("web01,INFO∥1∥"));
        let (key, back) = AggregateSet::deserialize(&q, &payload).unwrap();
        assert_eq!(key, "web01,INFO");
        assert_eq!(back, set);
    }

    #[test]
    fn malformed_payloads() {
        let q = query();
        assert!(AggregateSet::deserialize(&q, "key").is_err());
        assert!(AggregateSet::deserialize(&q, "key∥1∥novalue").is_err());
        assert!(AggregateSet::deserialize(&q, "key∥1∥sum($n)≔abc").is_err());
    }
}
