//! Log format parsers turning raw lines into field maps.
//!
//! Every parser injects the same base fields so queries can group by host
//! or inspect the raw line regardless of format:
//!
//! | field | value |
//! |---|---|
//! | `$hostname`, `$server` | name of the host running the parser |
//! | `$line` | the raw line |
//! | `$empty` | the empty string |
//! | `$timezone`, `$timeoffset` | local zone name and `+hhmm` offset |
//! | `*` | `*`, so that `count(*)` counts every line |
//!
//! When a `$time` field in `YYYYMMDD-HHMMSS` layout is present, `$date`,
//! `$hour` and `$minute` are derived from it.

mod csv;
mod default;
mod generic;

use std::collections::HashMap;

use chrono::Local;

pub use csv::CsvParser;
pub use default::DefaultParser;
pub use generic::{GenericKvParser, GenericParser};

use crate::error::ParserError;

/// Field name to value.
pub type Fields = HashMap<String, String>;

/// Converts one log line into fields.
pub trait LogParser: Send {
    /// Parses `line` (without its trailing newline). `None` skips the line.
    fn parse(&mut self, line: &str) -> Option<Fields>;
}

/// Names accepted by `logformat`.
pub const LOG_FORMATS: &[&str] = &["default", "generic", "generickv", "csv", "custom1", "custom2"];

/// Builds the parser for `format`.
///
/// # Errors
///
/// [`ParserError::NotImplemented`] for the reserved `custom1`, `custom2`
/// and `mimecast` names, [`ParserError::UnknownFormat`] otherwise.
pub fn new_parser(
    format: &str,
    table: &str,
    hostname: &str,
) -> Result<Box<dyn LogParser>, ParserError> {
    let base = BaseFields::new(hostname);
    match format.to_ascii_lowercase().as_str() {
        "" | "default" => Ok(Box::new(DefaultParser::new(base, table))),
        "generic" => Ok(Box::new(GenericParser::new(base))),
        "generickv" => Ok(Box::new(GenericKvParser::new(base))),
        "csv" => Ok(Box::new(CsvParser::new(base))),
        "custom1" | "custom2" | "mimecast" => Err(ParserError::NotImplemented(format.to_owned())),
        _ => Err(ParserError::UnknownFormat(format.to_owned())),
    }
}

/// Fields shared by every parser.
#[derive(Clone, Debug)]
pub struct BaseFields {
    hostname: String,
    timezone: String,
    time_offset: String,
}

impl BaseFields {
    /// Captures the hostname and the local time zone.
    pub fn new(hostname: &str) -> Self {
        let now = Local::now();
        Self {
            hostname: hostname.to_owned(),
            timezone: now.format("%Z").to_string(),
            time_offset: now.format("%z").to_string(),
        }
    }

    /// A field map holding the base fields for `line`.
    pub fn fields(&self, line: &str) -> Fields {
        let mut fields = Fields::with_capacity(16);
        fields.insert("$hostname".to_owned(), self.hostname.clone());
        fields.insert("$server".to_owned(), self.hostname.clone());
        fields.insert("$line".to_owned(), line.to_owned());
        fields.insert("$empty".to_owned(), String::new());
        fields.insert("$timezone".to_owned(), self.timezone.clone());
        fields.insert("$timeoffset".to_owned(), self.time_offset.clone());
        fields.insert("*".to_owned(), "*".to_owned());
        fields
    }
}

/// Adds `$date`, `$hour` and `$minute` when `$time` is `YYYYMMDD-HHMMSS`.
pub(crate) fn derive_time_fields(fields: &mut Fields) {
    let Some(time) = fields.get("$time") else {
        return;
    };
    let bytes = time.as_bytes();
    let well_formed = bytes.len() == 15
        && bytes[8] == b'-'
        && bytes[..8].iter().chain(&bytes[9..]).all(u8::is_ascii_digit);
    if !well_formed {
        return;
    }
    let (date, hour, minute) = (time[..8].to_owned(), time[9..11].to_owned(), time[11..13].to_owned());
    fields.insert("$date".to_owned(), date);
    fields.insert("$hour".to_owned(), hour);
    fields.insert("$minute".to_owned(), minute);
}

/// Splits `k=v` into a pair; parts without `=` yield `None`.
pub(crate) fn key_value(part: &str) -> Option<(String, String)> {
    let (key, value) = part.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then(|| (key.to_owned(), value.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_fields_are_always_present() {
        let mut parser = new_parser("generic", "", "web01").unwrap();
        let fields = parser.parse("anything").unwrap();
        assert_eq!(fields["$hostname"], "web01");
        assert_eq!(fields["$server"], "web01");
        assert_eq!(fields["$line"], "anything");
        assert_eq!(fields["$empty"], "");
        assert_eq!(fields["*"], "*");
        assert!(fields.contains_key("$timezone"));
        assert!(fields["$timeoffset"].starts_with(['+', '-']));
    }

    #[test]
    fn reserved_and_unknown_formats() {
        assert_eq!(
            new_parser("custom1", "", "h").err(),
            Some(ParserError::NotImplemented("custom1".into()))
        );
        assert_eq!(
            new_parser("xml", "", "h").err(),
            Some(ParserError::UnknownFormat("xml".into()))
        );
    }

    #[test]
    fn time_fields_follow_time() {
        let mut fields = Fields::new();
        fields.insert("$time".into(), "20211002-071947".into());
        derive_time_fields(&mut fields);
        assert_eq!(fields["$date"], "20211002");
        assert_eq!(fields["$hour"], "07");
        assert_eq!(fields["$minute"], "19");

        let mut odd = Fields::new();
        odd.insert("$time".into(), "yesterday".into());
        derive_time_fields(&mut odd);
        assert!(!odd.contains_key("$date"));
    }
}
