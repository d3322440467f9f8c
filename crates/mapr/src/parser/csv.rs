use protocol::CSV_DELIMITER;

use super::{derive_time_fields, BaseFields, Fields, LogParser};

/// Treats the first line as a header naming the columns of later lines.
///
/// Rows whose column count differs from the header are skipped.
#[derive(Debug)]
pub struct CsvParser {
    base: BaseFields,
    header: Option<Vec<String>>,
}

impl CsvParser {
    /// New parser that has not seen its header yet.
    pub const fn new(base: BaseFields) -> Self {
        Self { base, header: None }
    }
}

impl LogParser for CsvParser {
    fn parse(&mut self, line: &str) -> Option<Fields> {
        let Some(header) = &self.header else {
            self.header = Some(line.split(CSV_DELIMITER).map(|h| h.trim().to_owned()).collect());
            return None;
        };
        let values: Vec<&str> = line.split(CSV_DELIMITER).collect();
        if values.len() != header.len() {
            return None;
        }
        let mut fields = self.base.fields(line);
        for (name, value) in header.iter().zip(values) {
            fields.insert(name.clone(), value.to_owned());
        }
        derive_time_fields(&mut fields);
        Some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_rows() {
        let mut parser = CsvParser::new(BaseFields::new("h"));
        assert!(parser.parse("name, count").is_none());
        let row = parser.parse("alpha,3").unwrap();
        assert_eq!(row["name"], "alpha");
        assert_eq!(row["count"], "3");
        assert!(parser.parse("only-one").is_none());
    }
}
