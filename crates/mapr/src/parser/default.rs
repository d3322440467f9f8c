use protocol::FIELD_DELIMITER;

use super::{derive_time_fields, key_value, BaseFields, Fields, LogParser};

const MAPREDUCE_PREFIX: &str = "MAPREDUCE:";

/// Names of the positional fields ahead of the `MAPREDUCE:` marker.
pub const POSITIONAL_FIELDS: [&str; 9] = [
    "$severity",
    "$time",
    "$pid",
    "$caller",
    "$cpus",
    "$goroutines",
    "$cgocalls",
    "$loadavg",
    "$uptime",
];

/// Parses DTail's own log layout:
/// `SEVERITY|TIME|...|MAPREDUCE:TABLE|k=v|k=v`.
///
/// Lines without a `MAPREDUCE:` part, or whose table differs from the
/// query's, are skipped.
#[derive(Debug)]
pub struct DefaultParser {
    base: BaseFields,
    table: String,
}

impl DefaultParser {
    /// Parser accepting `table` (any table when empty).
    pub fn new(base: BaseFields, table: &str) -> Self {
        Self {
            base,
            table: table.to_owned(),
        }
    }
}

impl LogParser for DefaultParser {
    fn parse(&mut self, line: &str) -> Option<Fields> {
        let parts: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        let marker = parts.iter().position(|p| p.starts_with(MAPREDUCE_PREFIX))?;
        let table = &parts[marker][MAPREDUCE_PREFIX.len()..];
        if !self.table.is_empty() && !self.table.eq_ignore_ascii_case(table) {
            return None;
        }

        let mut fields = self.base.fields(line);
        for (name, value) in POSITIONAL_FIELDS.iter().zip(&parts[..marker]) {
            fields.insert((*name).to_owned(), (*value).to_owned());
        }
        fields.insert("$table".to_owned(), table.to_owned());
        fields.extend(parts[marker + 1..].iter().filter_map(|part| key_value(part)));
        derive_time_fields(&mut fields);
        Some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS: &str = "INFO|20211002-071947|4242|stats|8|17|0|0.42|3600|MAPREDUCE:STATS|\
        concurrentConnections=3|lifetimeConnections=11";

    fn parser(table: &str) -> DefaultParser {
        DefaultParser::new(BaseFields::new("srv"), table)
    }

    #[test]
    fn stats_line() {
        let fields = parser("STATS").parse(STATS).unwrap();
        assert_eq!(fields["$severity"], "INFO");
        assert_eq!(fields["$time"], "20211002-071947");
        assert_eq!(fields["$goroutines"], "17");
        assert_eq!(fields["$uptime"], "3600");
        assert_eq!(fields["concurrentConnections"], "3");
        assert_eq!(fields["lifetimeConnections"], "11");
        assert_eq!(fields["$hour"], "07");
    }

    #[test]
    fn short_prefix_and_case_insensitive_table() {
        let fields = parser("stats")
            .parse("WARN|20211002-071947|src|MAPREDUCE:STATS|k=v")
            .unwrap();
        assert_eq!(fields["$pid"], "src");
        assert_eq!(fields["k"], "v");
        assert!(!fields.contains_key("$caller"));
    }

    #[test]
    fn skips_other_lines() {
        assert!(parser("STATS").parse("INFO|20211002-071947|hello").is_none());
        assert!(parser("OTHER").parse(STATS).is_none());
        assert!(parser("").parse(STATS).is_some());
    }
}
