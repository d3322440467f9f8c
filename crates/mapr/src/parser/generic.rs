use protocol::FIELD_DELIMITER;

use super::{derive_time_fields, key_value, BaseFields, Fields, LogParser};

/// Accepts every line and provides only the base fields.
#[derive(Debug)]
pub struct GenericParser {
    base: BaseFields,
}

impl GenericParser {
    /// New parser.
    pub const fn new(base: BaseFields) -> Self {
        Self { base }
    }
}

impl LogParser for GenericParser {
    fn parse(&mut self, line: &str) -> Option<Fields> {
        Some(self.base.fields(line))
    }
}

/// Reads `k=v|k=v|...` lines; parts without `=` are ignored.
#[derive(Debug)]
pub struct GenericKvParser {
    base: BaseFields,
}

impl GenericKvParser {
    /// New parser.
    pub const fn new(base: BaseFields) -> Self {
        Self { base }
    }
}

impl LogParser for GenericKvParser {
    fn parse(&mut self, line: &str) -> Option<Fields> {
        let mut fields = self.base.fields(line);
        fields.extend(line.split(FIELD_DELIMITER).filter_map(key_value));
        derive_time_fields(&mut fields);
        Some(fields)
    }
}
