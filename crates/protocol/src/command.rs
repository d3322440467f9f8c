//! Decoded client commands: `verb:opt=val:opt=val ARG …`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// How a read command consumes its files.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReadMode {
    /// Read whole files and return.
    Cat,
    /// Read whole files, emitting only matching lines.
    Grep,
    /// Seek to the end and follow appended lines.
    Tail,
}

impl ReadMode {
    /// Wire spelling of the verb.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cat => "cat",
            Self::Grep => "grep",
            Self::Tail => "tail",
        }
    }

    /// Tail readers follow the file and may drop lines under back-pressure.
    pub const fn is_tail(self) -> bool {
        matches!(self, Self::Tail)
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-command options, carried after the verb as `:key=value` pairs.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Options {
    /// Suppress info and warn server messages.
    pub quiet: bool,
    /// Send bare line content without the `REMOTE|…` prefix.
    pub spartan: bool,
    /// The session is wired in-process; server messages stay local.
    pub serverless: bool,
    /// Lines of leading context (`-B`).
    pub before: usize,
    /// Lines of trailing context (`-A`).
    pub after: usize,
    /// Stop after this many matches (`-m`), `0` disables.
    pub max_count: usize,
    /// Options this build does not know; preserved verbatim.
    pub extra: BTreeMap<String, String>,
}

impl Options {
    /// Whether any local grep context control is active.
    pub const fn has_context(&self) -> bool {
        self.before > 0 || self.after > 0 || self.max_count > 0
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ProtocolError> {
        let invalid = || ProtocolError::InvalidOption(format!("{key}={value}"));
        match key {
            "quiet" => self.quiet = parse_bool(value).ok_or_else(invalid)?,
            "spartan" => self.spartan = parse_bool(value).ok_or_else(invalid)?,
            "serverless" => self.serverless = parse_bool(value).ok_or_else(invalid)?,
            "before" => self.before = value.parse().map_err(|_| invalid())?,
            "after" => self.after = value.parse().map_err(|_| invalid())?,
            "max" => self.max_count = value.parse().map_err(|_| invalid())?,
            _ => {
                self.extra.insert(key.to_owned(), value.to_owned());
            }
        }
        Ok(())
    }

    fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if self.quiet {
            pairs.push(("quiet".to_owned(), "true".to_owned()));
        }
        if self.spartan {
            pairs.push(("spartan".to_owned(), "true".to_owned()));
        }
        if self.serverless {
            pairs.push(("serverless".to_owned(), "true".to_owned()));
        }
        if self.before > 0 {
            pairs.push(("before".to_owned(), self.before.to_string()));
        }
        if self.after > 0 {
            pairs.push(("after".to_owned(), self.after.to_string()));
        }
        if self.max_count > 0 {
            pairs.push(("max".to_owned(), self.max_count.to_string()));
        }
        pairs.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// The verb-specific part of a command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Request {
    /// `cat|grep|tail GLOB REGEX`, where `REGEX` is a serialised line regex.
    Read {
        /// Read mode selected by the verb.
        mode: ReadMode,
        /// File glob on the server.
        glob: String,
        /// Serialised regex, see the `filters` crate.
        regex: String,
    },
    /// `map QUERY`: install an aggregate fed by subsequent reads.
    Map {
        /// Raw map-reduce query text.
        query: String,
    },
    /// `health`: reply OK and close.
    Health,
    /// `run COMMAND…`: execute a program and stream its output.
    Run {
        /// Command line to execute.
        command: String,
    },
    /// `.ack close connection`.
    AckClose,
}

impl Request {
    /// Wire spelling of the verb.
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Read { mode, .. } => mode.as_str(),
            Self::Map { .. } => "map",
            Self::Health => "health",
            Self::Run { .. } => "run",
            Self::AckClose => crate::ACK_CLOSE_CONNECTION,
        }
    }
}

/// A fully decoded command: options plus request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Command {
    /// Options that ride along with the verb.
    pub options: Options,
    /// The verb and its arguments.
    pub request: Request,
}

impl Command {
    /// Assembles a command.
    pub const fn new(options: Options, request: Request) -> Self {
        Self { options, request }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(self.request, Request::AckClose) {
            return f.write_str(crate::ACK_CLOSE_CONNECTION);
        }
        f.write_str(self.request.verb())?;
        for (key, value) in self.options.pairs() {
            write!(f, ":{key}={value}")?;
        }
        match &self.request {
            Request::Read { glob, regex, .. } => write!(f, " {glob} {regex}"),
            Request::Map { query } => write!(f, " {query}"),
            Request::Run { command } => write!(f, " {command}"),
            Request::Health | Request::AckClose => Ok(()),
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim_start();
        if text.trim_end() == crate::ACK_CLOSE_CONNECTION {
            return Ok(Self::new(Options::default(), Request::AckClose));
        }

        let (head, rest) = text.split_once(' ').unwrap_or((text, ""));
        let mut parts = head.split(':');
        let verb = parts.next().unwrap_or_default();

        let mut options = Options::default();
        for pair in parts.filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ProtocolError::InvalidOption(pair.to_owned()))?;
            options.set(key, value)?;
        }

        let request = match verb {
            "cat" | "grep" | "tail" => {
                let mode = match verb {
                    "cat" => ReadMode::Cat,
                    "grep" => ReadMode::Grep,
                    _ => ReadMode::Tail,
                };
                let (glob, regex) = rest.split_once(' ').unwrap_or((rest, ""));
                if glob.is_empty() {
                    return Err(ProtocolError::MissingArgument {
                        verb: mode.as_str(),
                        what: "file glob",
                    });
                }
                Request::Read {
                    mode,
                    glob: glob.to_owned(),
                    regex: regex.to_owned(),
                }
            }
            "map" => {
                if rest.trim().is_empty() {
                    return Err(ProtocolError::MissingArgument {
                        verb: "map",
                        what: "query",
                    });
                }
                Request::Map {
                    query: rest.to_owned(),
                }
            }
            "health" => Request::Health,
            "run" => {
                if rest.trim().is_empty() {
                    return Err(ProtocolError::MissingArgument {
                        verb: "run",
                        what: "command line",
                    });
                }
                Request::Run {
                    command: rest.to_owned(),
                }
            }
            other => return Err(ProtocolError::UnknownVerb(other.to_owned())),
        };

        Ok(Self::new(options, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_read_command_with_options() {
        let command: Command = "tail:quiet=true:before=2:after=3:max=1 /var/log/*.log regex:invert foo bar"
            .parse()
            .unwrap();
        assert!(command.options.quiet);
        assert_eq!(command.options.before, 2);
        assert_eq!(command.options.after, 3);
        assert_eq!(command.options.max_count, 1);
        assert!(command.options.has_context());
        assert_eq!(
            command.request,
            Request::Read {
                mode: ReadMode::Tail,
                glob: "/var/log/*.log".to_owned(),
                regex: "regex:invert foo bar".to_owned(),
            }
        );
    }

    #[test]
    fn renders_and_reparses_map_command() {
        let command = Command::new(
            Options {
                spartan: true,
                ..Options::default()
            },
            Request::Map {
                query: "from STATS select count($line) group by $hostname".to_owned(),
            },
        );
        let text = command.to_string();
        assert_eq!(
            text,
            "map:spartan=true from STATS select count($line) group by $hostname"
        );
        assert_eq!(text.parse::<Command>().unwrap(), command);
    }

    #[test]
    fn unknown_options_are_preserved() {
        let command: Command = "health:color=never".parse().unwrap();
        assert_eq!(command.request, Request::Health);
        assert_eq!(command.options.extra.get("color").map(String::as_str), Some("never"));
        assert_eq!(command.to_string(), "health:color=never");
    }

    #[test]
    fn ack_close_round_trips() {
        let command: Command = ".ack close connection".parse().unwrap();
        assert_eq!(command.request, Request::AckClose);
        assert_eq!(command.to_string(), ".ack close connection");
    }

    #[test]
    fn rejects_unknown_verbs_and_bad_options() {
        assert!(matches!(
            "explode /etc/passwd".parse::<Command>(),
            Err(ProtocolError::UnknownVerb(verb)) if verb == "explode"
        ));
        assert!(matches!(
            "cat:quiet=maybe /tmp/x regex:noop ".parse::<Command>(),
            Err(ProtocolError::InvalidOption(_))
        ));
        assert!(matches!(
            "cat".parse::<Command>(),
            Err(ProtocolError::MissingArgument { .. })
        ));
        assert!(matches!(
            "map:quiet=true".parse::<Command>(),
            Err(ProtocolError::MissingArgument { verb: "map", .. })
        ));
    }
}
