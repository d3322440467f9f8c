//! Flag definitions and parsing for the six programs.
//!
//! DTail programs take single-dash long flags (`-servers a,b`). clap only
//! knows `--servers`, so [`normalize`] rewrites known single-dash long
//! flags before parsing; both spellings are accepted.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

/// One of the DTail executables.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Program {
    /// `dtail`: follow files.
    Tail,
    /// `dcat`: print files.
    Cat,
    /// `dgrep`: print matching lines.
    Grep,
    /// `dmap`: map-reduce over files.
    Map,
    /// `dtailhealth`: check one server.
    Health,
    /// `dserver`: the server.
    Server,
}

impl Program {
    /// Executable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tail => "dtail",
            Self::Cat => "dcat",
            Self::Grep => "dgrep",
            Self::Map => "dmap",
            Self::Health => "dtailhealth",
            Self::Server => "dserver",
        }
    }

    const fn about(self) -> &'static str {
        match self {
            Self::Tail => "Follow log files on many servers at once",
            Self::Cat => "Print log files from many servers",
            Self::Grep => "Print matching lines of log files from many servers",
            Self::Map => "Run a map-reduce query over log files on many servers",
            Self::Health => "Check that a DTail server answers",
            Self::Server => "Serve log files to DTail clients over SSH",
        }
    }

    const fn is_client(self) -> bool {
        matches!(self, Self::Tail | Self::Cat | Self::Grep | Self::Map)
    }
}

const LONG_FLAGS: &[&str] = &[
    "after",
    "before",
    "bindAddress",
    "cfg",
    "cpc",
    "discovery",
    "files",
    "grep",
    "help",
    "invert",
    "key",
    "logLevel",
    "max",
    "noColor",
    "port",
    "query",
    "quiet",
    "regex",
    "server",
    "servers",
    "shutdownAfter",
    "spartan",
    "trustAllHosts",
    "user",
    "version",
];

/// Rewrites `-name` and `-name=value` to their double-dash form when
/// `name` is a known long flag. Everything after `--` is left alone.
pub fn normalize<I, T>(arguments: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut out = Vec::new();
    let mut passthrough = false;
    for argument in arguments {
        let argument: OsString = argument.into();
        if passthrough {
            out.push(argument);
            continue;
        }
        if argument == OsStr::new("--") {
            passthrough = true;
            out.push(argument);
            continue;
        }
        let rewritten = argument.to_str().and_then(|text| {
            let rest = text.strip_prefix('-').filter(|rest| !rest.starts_with('-'))?;
            let name = rest.split_once('=').map_or(rest, |(name, _)| name);
            LONG_FLAGS.contains(&name).then(|| OsString::from(format!("-{text}")))
        });
        out.push(rewritten.unwrap_or(argument));
    }
    out
}

/// Flags of `dtail`, `dcat`, `dgrep` and `dmap`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClientArgs {
    /// `-servers`: inline list or server file.
    pub servers: String,
    /// `-discovery METHOD[:REGEX]`.
    pub discovery: String,
    /// `-files` plus positional paths, comma separated.
    pub files: String,
    /// `-regex` / `-grep`.
    pub regex: Option<String>,
    /// `-invert`.
    pub invert: bool,
    /// `-query`.
    pub query: Option<String>,
    /// `-cpc`: connections per CPU.
    pub connections_per_cpu: Option<usize>,
    /// `-port`.
    pub port: Option<u16>,
    /// `-user`.
    pub user: Option<String>,
    /// `-key`: private key file.
    pub key: Option<PathBuf>,
    /// `-trustAllHosts`.
    pub trust_all_hosts: bool,
    /// `-noColor`; output is never coloured, accepted for compatibility.
    pub no_color: bool,
    /// `-quiet`.
    pub quiet: bool,
    /// `-spartan`.
    pub spartan: bool,
    /// `-before` / `-B`.
    pub before: usize,
    /// `-after` / `-A`.
    pub after: usize,
    /// `-max` / `-m`.
    pub max_count: usize,
    /// `-cfg`.
    pub cfg: Option<PathBuf>,
    /// `-logLevel`.
    pub log_level: Option<String>,
}

/// Flags of `dtailhealth`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HealthArgs {
    /// `-server host[:port]`.
    pub server: Option<String>,
    /// `-cfg`.
    pub cfg: Option<PathBuf>,
    /// `-logLevel`.
    pub log_level: Option<String>,
}

/// Flags of `dserver`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerArgs {
    /// `-cfg`.
    pub cfg: Option<PathBuf>,
    /// `-logLevel`.
    pub log_level: Option<String>,
    /// `-port`.
    pub port: Option<u16>,
    /// `-bindAddress`.
    pub bind_address: Option<String>,
    /// `-shutdownAfter SECONDS`.
    pub shutdown_after: Option<u64>,
}

/// Result of parsing a command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Parsed {
    /// `-version` was given.
    Version,
    /// A client program run.
    Client(ClientArgs),
    /// A health check.
    Health(HealthArgs),
    /// A server run.
    Server(ServerArgs),
}

/// Parses `arguments` (program name first) for `program`.
///
/// # Errors
///
/// Returns clap's error for unknown flags and bad values, and for
/// `-help`, whose error carries the rendered help text.
pub fn parse_args<I, T>(program: Program, arguments: I) -> Result<Parsed, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let matches = clap_command(program).try_get_matches_from(normalize(arguments))?;
    if matches.get_flag("version") {
        return Ok(Parsed::Version);
    }
    let cfg = matches.get_one::<PathBuf>("cfg").cloned();
    let log_level = matches.get_one::<String>("logLevel").cloned();

    Ok(match program {
        Program::Health => Parsed::Health(HealthArgs {
            server: matches.get_one::<String>("server").cloned(),
            cfg,
            log_level,
        }),
        Program::Server => Parsed::Server(ServerArgs {
            cfg,
            log_level,
            port: matches.get_one::<u16>("port").copied(),
            bind_address: matches.get_one::<String>("bindAddress").cloned(),
            shutdown_after: matches.get_one::<u64>("shutdownAfter").copied(),
        }),
        _ => Parsed::Client(client_args(&matches, cfg, log_level)),
    })
}

fn client_args(matches: &ArgMatches, cfg: Option<PathBuf>, log_level: Option<String>) -> ClientArgs {
    let string = |id: &str| matches.get_one::<String>(id).cloned().unwrap_or_default();
    let count = |id: &str| matches.get_one::<usize>(id).copied().unwrap_or_default();

    let mut files: Vec<String> = matches
        .get_many::<String>("files")
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    files.extend(matches.get_many::<String>("paths").into_iter().flatten().cloned());

    ClientArgs {
        servers: string("servers"),
        discovery: string("discovery"),
        files: files.join(","),
        regex: matches.get_one::<String>("regex").cloned(),
        invert: matches.get_flag("invert"),
        query: matches.get_one::<String>("query").cloned(),
        connections_per_cpu: matches.get_one::<usize>("cpc").copied(),
        port: matches.get_one::<u16>("port").copied(),
        user: matches.get_one::<String>("user").cloned(),
        key: matches.get_one::<PathBuf>("key").cloned(),
        trust_all_hosts: matches.get_flag("trustAllHosts"),
        no_color: matches.get_flag("noColor"),
        quiet: matches.get_flag("quiet"),
        spartan: matches.get_flag("spartan"),
        before: count("before"),
        after: count("after"),
        max_count: count("max"),
        cfg,
        log_level,
    }
}

fn flag(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(id).help(help).action(ArgAction::SetTrue)
}

fn value(id: &'static str, name: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(id).value_name(name).help(help).action(ArgAction::Set)
}

/// The clap definition of `program`.
pub fn clap_command(program: Program) -> Command {
    let mut command = Command::new(program.name())
        .about(program.about())
        .disable_version_flag(true)
        .arg(flag("version", "Print the version and exit"))
        .arg(value("cfg", "PATH", "Configuration file, 'none' for built-in defaults").value_parser(value_parser!(PathBuf)))
        .arg(value("logLevel", "LEVEL", "error, warn, info, verbose, debug or trace"));

    if program.is_client() {
        command = command
            .arg(value("servers", "LIST", "Comma separated servers, or a file listing them"))
            .arg(value("discovery", "METHOD[:REGEX]", "Server discovery method and filter"))
            .arg(
                value("files", "GLOBS", "Comma separated file globs on the servers")
                    .action(ArgAction::Append),
            )
            .arg(value("regex", "REGEX", "Only lines matching REGEX").visible_alias("grep"))
            .arg(flag("invert", "Only lines not matching the regex"))
            .arg(value("query", "QUERY", "Map-reduce query"))
            .arg(value("cpc", "N", "Concurrent connections per CPU").value_parser(value_parser!(usize)))
            .arg(value("port", "PORT", "Default SSH port of the servers").value_parser(value_parser!(u16).range(1..)))
            .arg(value("user", "USER", "Remote user name"))
            .arg(value("key", "PATH", "SSH private key").value_parser(value_parser!(PathBuf)))
            .arg(flag("trustAllHosts", "Accept every server host key without asking"))
            .arg(flag("noColor", "Plain output"))
            .arg(flag("quiet", "Suppress informational server messages"))
            .arg(flag("spartan", "Print bare lines without host and file prefixes"))
            .arg(value("before", "N", "Lines of context before a match").short('B').value_parser(value_parser!(usize)))
            .arg(value("after", "N", "Lines of context after a match").short('A').value_parser(value_parser!(usize)))
            .arg(value("max", "N", "Stop after N matches per file").short('m').value_parser(value_parser!(usize)))
            .arg(
                Arg::new("paths")
                    .value_name("FILE")
                    .help("Files to read, same as -files")
                    .num_args(0..)
                    .action(ArgAction::Append),
            );
    }
    match program {
        Program::Health => command.arg(value("server", "HOST[:PORT]", "Server to check")),
        Program::Server => command
            .arg(value("port", "PORT", "SSH port to listen on").value_parser(value_parser!(u16).range(1..)))
            .arg(value("bindAddress", "ADDRESS", "Address to listen on"))
            .arg(value("shutdownAfter", "SECONDS", "Stop after this many seconds").value_parser(value_parser!(u64))),
        _ => command,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_dash_long_flags_are_rewritten() {
        let args = normalize(["dgrep", "-servers", "a,b", "-grep=x", "-B", "2", "--", "-files"]);
        let args: Vec<&str> = args.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(args, ["dgrep", "--servers", "a,b", "--grep=x", "-B", "2", "--", "-files"]);
    }

    #[test]
    fn grep_alias_and_positional_files() {
        let parsed = parse_args(
            Program::Grep,
            ["dgrep", "-spartan", "--grep", "20211002-071947", "-invert", "-files", "/a.log", "b.log"],
        )
        .unwrap();
        let Parsed::Client(args) = parsed else {
            panic!("expected client arguments");
        };
        assert!(args.spartan);
        assert!(args.invert);
        assert_eq!(args.regex.as_deref(), Some("20211002-071947"));
        assert_eq!(args.files, "/a.log,b.log");
    }

    #[test]
    fn health_takes_one_server() {
        let parsed = parse_args(Program::Health, ["dtailhealth", "--server", "example:1"]).unwrap();
        assert_eq!(
            parsed,
            Parsed::Health(HealthArgs {
                server: Some("example:1".into()),
                ..HealthArgs::default()
            })
        );
        assert!(parse_args(Program::Health, ["dtailhealth", "-files", "x"]).is_err());
    }

    #[test]
    fn version_short_circuits() {
        assert_eq!(parse_args(Program::Server, ["dserver", "-version"]).unwrap(), Parsed::Version);
    }

    #[test]
    fn zero_port_is_rejected() {
        assert!(parse_args(Program::Cat, ["dcat", "-port", "0"]).is_err());
    }
}
