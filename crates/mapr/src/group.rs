//! Aggregates keyed by group, plus result rendering.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use protocol::{AGGREGATE_GROUP_KEY_COMBINATOR, CSV_DELIMITER};

use crate::aggregate::AggregateSet;
use crate::error::AggregateError;
use crate::parser::Fields;
use crate::query::Query;
use crate::value::compare_cells;

/// Aggregates for every group seen in one mapping window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupSet {
    sets: BTreeMap<String, AggregateSet>,
}

impl GroupSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Whether no group has been seen.
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// The aggregate of `group_key`, if any.
    pub fn get(&self, group_key: &str) -> Option<&AggregateSet> {
        self.sets.get(group_key)
    }

    /// Runs one parsed line through `where`, `set`, grouping and
    /// aggregation. Returns whether the line was aggregated.
    ///
    /// # Errors
    ///
    /// Propagates [`AggregateError`] from the aggregation step.
    pub fn aggregate(&mut self, query: &Query, mut fields: Fields) -> Result<bool, AggregateError> {
        if !query.conditions.iter().all(|c| c.matches(&fields)) {
            return Ok(false);
        }
        for set in &query.sets {
            set.apply(&mut fields);
        }
        let key = group_key(query, &fields);
        let mut candidate = self.sets.remove(&key).unwrap_or_default();
        let added = candidate.add(query, &fields);
        if added.as_ref().is_ok_and(|added| *added) || !candidate.values.is_empty() {
            self.sets.insert(key, candidate);
        }
        added
    }

    /// Merges a partial result for one group.
    ///
    /// # Errors
    ///
    /// Fails when slot types disagree.
    pub fn merge_set(
        &mut self,
        query: &Query,
        group_key: String,
        other: &AggregateSet,
    ) -> Result<(), AggregateError> {
        self.sets
            .entry(group_key)
            .or_default()
            .merge(query, other)
    }

    /// Merges an `AGGREGATE` frame payload.
    ///
    /// # Errors
    ///
    /// Fails on malformed payloads or slot type conflicts.
    pub fn merge_serialized(&mut self, query: &Query, payload: &str) -> Result<(), AggregateError> {
        let (key, set) = AggregateSet::deserialize(query, payload)?;
        self.merge_set(query, key, &set)
    }

    /// Merges every group of `other`.
    ///
    /// # Errors
    ///
    /// Fails when slot types disagree; groups merged before the failure
    /// stay merged.
    pub fn merge(&mut self, query: &Query, other: &Self) -> Result<(), AggregateError> {
        for (key, set) in &other.sets {
            self.merge_set(query, key.clone(), set)?;
        }
        Ok(())
    }

    /// One `AGGREGATE` payload per group.
    pub fn serialize(&self) -> impl Iterator<Item = String> + '_ {
        self.sets.iter().map(|(key, set)| set.serialize(key))
    }

    /// Result rows, ordered and limited as the query asks.
    pub fn rows(&self, query: &Query) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = self
            .sets
            .values()
            .map(|set| query.select.iter().map(|s| set.result(s)).collect())
            .collect();

        if let Some(order) = &query.order_by {
            if let Some(column) = query.select.iter().position(|s| s.name() == order.field) {
                rows.sort_by(|a, b| {
                    let ordering = compare_cells(&a[column], &b[column]);
                    if order.reverse {
                        ordering
                    } else {
                        ordering.reverse()
                    }
                });
            }
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows
    }

    /// CSV header line (without newline).
    pub fn csv_header(query: &Query) -> String {
        query.columns().join(CSV_DELIMITER)
    }

    /// CSV rows, one per line, each ending in a newline.
    pub fn csv_rows(&self, query: &Query) -> String {
        let mut out = String::new();
        for row in self.rows(query) {
            let cells: Vec<String> = row.iter().map(|cell| csv_escape(cell)).collect();
            out.push_str(&cells.join(CSV_DELIMITER));
            out.push('\n');
        }
        out
    }

    /// Header plus rows.
    pub fn to_csv(&self, query: &Query) -> String {
        let mut out = Self::csv_header(query);
        out.push('\n');
        out.push_str(&self.csv_rows(query));
        out
    }

    /// Terminal table. Grouped columns are shown as `[name]`, the sort
    /// column carries `↓` (`order by`) or `↑` (`rorder by`), and numbers
    /// are right-aligned.
    pub fn render_table(&self, query: &Query) -> String {
        let headers: Vec<String> = query
            .select
            .iter()
            .map(|select| {
                let name = select.name();
                let mut header = if select.bare && query.group_by.contains(&select.field) {
                    format!("[{name}]")
                } else {
                    name.clone()
                };
                if let Some(order) = query.order_by.as_ref().filter(|o| o.field == name) {
                    header.push_str(if order.reverse { "↑" } else { "↓" });
                }
                header
            })
            .collect();
        let rows = self.rows(query);

        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        let header_cells: Vec<String> = headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!(" {h:<w$} "))
            .collect();
        let _ = writeln!(out, "{}", header_cells.join("|"));
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        let _ = writeln!(out, "{}", rule.join("+"));
        for row in rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| {
                    if cell.parse::<f64>().is_ok() {
                        format!(" {cell:>w$} ")
                    } else {
                        format!(" {cell:<w$} ")
                    }
                })
                .collect();
            let _ = writeln!(out, "{}", cells.join("|"));
        }
        out
    }
}

/// Joins the `group by` values; missing fields contribute empty strings.
pub fn group_key(query: &Query, fields: &Fields) -> String {
    query
        .group_by
        .iter()
        .map(|name| fields.get(name).map_or("", String::as_str))
        .collect::<Vec<_>>()
        .join(AGGREGATE_GROUP_KEY_COMBINATOR)
}

fn csv_escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_owned()
    }
}
