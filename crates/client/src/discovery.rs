//! Turning `-servers` and `-discovery` into a list of endpoints.
//!
//! A discovery spec is `METHOD[:REGEX]`. `comma` splits the server
//! argument on commas, `file` reads one server per line, and any other
//! name is looked up in a [`DiscoveryRegistry`]. The optional regex keeps
//! only matching server names. Results are de-duplicated and may be
//! shuffled.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use rand::seq::SliceRandom;
use regex::Regex;

use crate::error::ClientError;

/// A server to connect to.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// SSH port.
    pub port: u16,
}

impl Endpoint {
    /// Parses `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Discovery`] for empty hosts and invalid ports.
    pub fn parse(raw: &str, default_port: u16) -> Result<Self, ClientError> {
        let raw = raw.trim();
        let invalid = || ClientError::Discovery(format!("invalid server '{raw}'"));
        let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(invalid()),
            }
        } else if raw.matches(':').count() == 1 {
            let (host, port) = raw.split_once(':').ok_or_else(invalid)?;
            (host, Some(port))
        } else {
            (raw, None)
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse::<u16>().ok().filter(|p| *p > 0).ok_or_else(invalid)?,
            None => default_port,
        };
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Where server names come from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DiscoveryMethod {
    /// Comma separated list.
    Comma,
    /// File with one server per line.
    File,
    /// A registered custom method.
    Custom(String),
}

impl FromStr for DiscoveryMethod {
    type Err = std::convert::Infallible;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(match name.to_ascii_lowercase().as_str() {
            "comma" => Self::Comma,
            "file" => Self::File,
            _ => Self::Custom(name.to_owned()),
        })
    }
}

/// A custom discovery method: gets the `-servers` argument, returns names.
pub type CustomDiscovery = Arc<dyn Fn(&str) -> Result<Vec<String>, ClientError> + Send + Sync>;

/// Custom discovery methods by name.
#[derive(Clone, Default)]
pub struct DiscoveryRegistry {
    methods: HashMap<String, CustomDiscovery>,
}

impl fmt::Debug for DiscoveryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.methods.keys()).finish()
    }
}

impl DiscoveryRegistry {
    /// A registry without custom methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `method` under `name` (case-insensitive).
    pub fn register(&mut self, name: &str, method: CustomDiscovery) {
        self.methods.insert(name.to_ascii_lowercase(), method);
    }

    fn get(&self, name: &str) -> Option<&CustomDiscovery> {
        self.methods.get(&name.to_ascii_lowercase())
    }
}

/// A parsed discovery request.
#[derive(Clone, Debug)]
pub struct Discovery {
    /// The `-servers` argument.
    pub servers: String,
    /// How to interpret it.
    pub method: DiscoveryMethod,
    /// Keeps only server names matching this.
    pub filter: Option<Regex>,
    /// Randomise the connection order.
    pub shuffle: bool,
    /// Port for names without one.
    pub default_port: u16,
}

impl Discovery {
    /// Builds a request from the `-servers` and `-discovery` flags. Without
    /// a method, an existing file name selects `file`, anything else `comma`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Discovery`] when the filter regex does not compile.
    pub fn from_flags(servers: &str, discovery: &str, default_port: u16) -> Result<Self, ClientError> {
        let (name, filter) = discovery.split_once(':').unwrap_or((discovery, ""));
        let method = if name.is_empty() {
            if !servers.is_empty() && Path::new(servers).is_file() {
                DiscoveryMethod::File
            } else {
                DiscoveryMethod::Comma
            }
        } else {
            match name.parse() {
                Ok(method) => method,
                Err(never) => match never {},
            }
        };
        let filter = if filter.is_empty() {
            None
        } else {
            Some(Regex::new(filter).map_err(|err| ClientError::Discovery(err.to_string()))?)
        };
        Ok(Self {
            servers: servers.to_owned(),
            method,
            filter,
            shuffle: false,
            default_port,
        })
    }

    /// Randomises the order of the resolved servers.
    #[must_use]
    pub fn shuffled(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Produces the endpoint list.
    ///
    /// # Errors
    ///
    /// Fails for unreadable server files, unknown custom methods and
    /// unparsable server names.
    pub fn resolve(&self, registry: &DiscoveryRegistry) -> Result<Vec<Endpoint>, ClientError> {
        let names = match &self.method {
            DiscoveryMethod::Comma => split_names(&self.servers),
            DiscoveryMethod::File => {
                let path = Path::new(&self.servers);
                let text = std::fs::read_to_string(path).map_err(|source| ClientError::ServerList {
                    path: path.to_path_buf(),
                    source,
                })?;
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.starts_with('#'))
                    .flat_map(split_names)
                    .collect()
            }
            DiscoveryMethod::Custom(name) => {
                let method = registry.get(name).ok_or_else(|| {
                    ClientError::Discovery(format!("unknown discovery method '{name}'"))
                })?;
                method(&self.servers)?
            }
        };

        let mut seen = HashSet::new();
        let mut endpoints = Vec::new();
        for name in names {
            if self.filter.as_ref().is_some_and(|filter| !filter.is_match(&name)) {
                continue;
            }
            let endpoint = Endpoint::parse(&name, self.default_port)?;
            if seen.insert(endpoint.clone()) {
                endpoints.push(endpoint);
            }
        }
        if self.shuffle {
            endpoints.shuffle(&mut rand::thread_rng());
        }
        Ok(endpoints)
    }
}

fn split_names(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\t'])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}
