//! crates/logging/src/tracing_bridge.rs
//! Renders tracing events in the DTail log layout and installs the subscriber.
//!
//! Every event becomes one line:
//!
//! ```text
//! INFO|20240131-235959|message|key=value|key=value
//! ```
//!
//! The layout matches what the `default` map-reduce log format expects, so
//! the server's own stats lines can be queried with `dmap`.

use std::fmt;
use std::io;

use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

use crate::{LogLevel, LoggingError};

/// Time layout used in every log line.
pub const TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// [`FormatEvent`] implementation producing `LEVEL|TIME|message|k=v` lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct DtailFormat {
    utc: bool,
}

impl DtailFormat {
    /// Formatter stamping local time.
    #[must_use]
    pub const fn new() -> Self {
        Self { utc: false }
    }

    /// Stamp UTC instead of local time.
    #[must_use]
    pub const fn utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }

    fn timestamp(self) -> String {
        if self.utc {
            chrono::Utc::now().format(TIME_FORMAT).to_string()
        } else {
            Local::now().format(TIME_FORMAT).to_string()
        }
    }
}

impl<S, N> FormatEvent<S, N> for DtailFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        write!(
            writer,
            "{}|{}|{}",
            event.metadata().level(),
            self.timestamp(),
            visitor.message
        )?;
        for (key, value) in &visitor.fields {
            write!(writer, "|{key}={value}")?;
        }
        writeln!(writer)
    }
}

/// Collects the `message` field and any structured fields of an event.
#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            value.clone_into(&mut self.message);
        } else {
            self.fields.push((field.name(), value.to_owned()));
        }
    }
}

/// Builds the filter for `level`, letting `RUST_LOG` take precedence.
pub fn env_filter(level: LogLevel) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    Ok(EnvFilter::try_new(level.directive())?)
}

/// Installs the global subscriber writing DTail lines to stderr.
///
/// Stdout is reserved for streamed log content.
pub fn init(level: LogLevel) -> Result<(), LoggingError> {
    init_with_writer(level, io::stderr)
}

/// Installs the global subscriber with a custom writer.
pub fn init_with_writer<W>(level: LogLevel, writer: W) -> Result<(), LoggingError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .event_format(DtailFormat::new())
        .with_env_filter(env_filter(level)?)
        .with_writer(writer)
        .try_init()
        .map_err(|err| LoggingError::Init(err.to_string()))
}
