//! Builders for the command lists the programs send.

use filters::{LineRegex, RegexFlag};
use mapr::{DEFAULT_LOG_FORMAT, Query};
use protocol::{Command, Options, ReadMode, Request, encode_envelope};

use crate::error::ClientError;

/// Enveloped read commands, one per comma-separated file pattern.
pub fn read_commands(mode: ReadMode, files: &str, regex: &LineRegex, options: &Options) -> Vec<String> {
    files
        .split(',')
        .map(str::trim)
        .filter(|glob| !glob.is_empty())
        .map(|glob| {
            let command = Command::new(
                options.clone(),
                Request::Read {
                    mode,
                    glob: glob.to_owned(),
                    regex: regex.serialize(),
                },
            );
            encode_envelope(&command.to_string())
        })
        .collect()
}

/// The `map` command followed by the reads feeding it.
///
/// Without an explicit regex, lines of the `default` log format are
/// pre-filtered on the server by their `MAPREDUCE:TABLE` marker.
///
/// # Errors
///
/// Fails when the table filter does not compile.
pub fn map_commands(
    query: &Query,
    mode: ReadMode,
    files: &str,
    regex: Option<&LineRegex>,
    options: &Options,
) -> Result<Vec<String>, ClientError> {
    let map = Command::new(
        options.clone(),
        Request::Map {
            query: query.raw().to_owned(),
        },
    );
    let mut commands = vec![encode_envelope(&map.to_string())];

    let filter = match regex {
        Some(regex) => regex.clone(),
        None => table_filter(query)?,
    };
    commands.extend(read_commands(mode, files, &filter, options));
    Ok(commands)
}

fn table_filter(query: &Query) -> Result<LineRegex, ClientError> {
    let default_format = query.log_format.is_empty() || query.log_format == DEFAULT_LOG_FORMAT;
    if !default_format || query.table.is_empty() || query.table == "*" {
        return Ok(LineRegex::noop());
    }
    let pattern = format!(r"(?i)\|MAPREDUCE:{}\|", regex::escape(&query.table));
    Ok(LineRegex::new(&pattern, RegexFlag::Default)?)
}

/// The single `health` command.
pub fn health_command() -> String {
    encode_envelope(&Command::new(Options::default(), Request::Health).to_string())
}

/// A `run` command for `command_line`.
pub fn run_command(command_line: &str, options: &Options) -> String {
    let command = Command::new(
        options.clone(),
        Request::Run {
            command: command_line.to_owned(),
        },
    );
    encode_envelope(&command.to_string())
}

#[cfg(test)]
mod tests {
    use protocol::Envelope;

    use super::*;

    fn decode(wire: &str) -> Command {
        let segment = wire.strip_suffix(';').unwrap();
        Envelope::parse(segment).unwrap().payload.unwrap().parse().unwrap()
    }

    #[test]
    fn one_read_per_pattern() {
        let regex: LineRegex = "regex:default ERROR".parse().unwrap();
        let options = Options {
            quiet: true,
            ..Options::default()
        };
        let commands = read_commands(ReadMode::Grep, "/var/log/a.log, /var/log/b*.log", &regex, &options);
        assert_eq!(commands.len(), 2);
        let second = decode(&commands[1]);
        assert!(second.options.quiet);
        assert_eq!(
            second.request,
            Request::Read {
                mode: ReadMode::Grep,
                glob: "/var/log/b*.log".into(),
                regex: "regex:default ERROR".into(),
            }
        );
    }

    #[test]
    fn map_prefilters_the_table() {
        let query = Query::parse("from STATS select count($line)").unwrap();
        let commands = map_commands(&query, ReadMode::Cat, "/log/x.log", None, &Options::default()).unwrap();
        assert_eq!(commands.len(), 2);
        assert!(matches!(decode(&commands[0]).request, Request::Map { ref query } if query.contains("STATS")));
        let Request::Read { regex, .. } = decode(&commands[1]).request else {
            panic!("expected a read command");
        };
        assert_eq!(regex, r"regex:default (?i)\|MAPREDUCE:STATS\|");
    }

    #[test]
    fn health_is_bare() {
        assert_eq!(decode(&health_command()).request, Request::Health);
    }
}
