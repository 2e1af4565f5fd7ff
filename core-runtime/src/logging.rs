//! # Logging
//!
//! One `tracing` subscriber setup shared by `thin-agent` and `streamer-server`.
//!
//! ## Overview
//!
//! - Output to stderr as pretty, JSON or compact lines ([`LogFormat`])
//! - Workspace crates log at the configured level; HTTP and SQL dependencies
//!   are held at `warn` unless a full filter is given (`RUST_LOG` syntax)
//! - Events can be mirrored into a host [`LoggerSink`], with values of
//!   sensitive-looking fields replaced by `[REDACTED]`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! let config = LoggingConfig::default()
//!     .with_verbosity(cli.verbose)
//!     .with_format(LogFormat::Json)
//!     .with_env_override();
//! init_logging(config)?;
//! ```

use crate::error::{Error, Result};

use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer,
};

/// Crates whose events follow the configured level.
const WORKSPACE_TARGETS: &[&str] = &[
    "radiotiker_workspace",
    "core_runtime",
    "core_sync",
    "core_library",
    "core_metadata",
    "bridge_desktop",
    "streamer_server",
    "thin_agent",
];

/// Dependencies capped at `warn` by the default filter.
const NOISY_TARGETS: &[&str] = &["h2", "hyper", "reqwest", "sqlx", "tower_http", "lofty"];

const SENSITIVE_FIELDS: &[&str] = &[
    "token",
    "password",
    "secret",
    "api_key",
    "authorization",
    "cookie",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for a terminal
    Pretty,
    /// One JSON object per line, for log shippers
    Json,
    /// One line per event
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Compact
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Config(format!(
                "unknown log format '{}', expected pretty, json or compact (LOG_FORMAT)",
                other
            ))),
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for workspace crates
    pub level: LogLevel,
    /// Complete filter directive; replaces the default per-crate one
    pub filter: Option<String>,
    pub sink: Option<Arc<dyn LoggerSink>>,
    /// Redact sensitive field values before they reach the sink
    pub redact: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            sink: None,
            redact: true,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("has_sink", &self.sink.is_some())
            .field("redact", &self.redact)
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Level for a repeated `-v` flag: none is info, one debug, more trace.
    pub fn with_verbosity(self, verbosity: u8) -> Self {
        self.with_level(match verbosity {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        })
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Use `RUST_LOG` as the full filter when it is set and non-empty.
    pub fn with_env_override(self) -> Self {
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(filter) if !filter.trim().is_empty() => self.with_filter(filter),
            _ => self,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn without_redaction(mut self) -> Self {
        self.redact = false;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let directives = self
            .filter
            .clone()
            .unwrap_or_else(|| default_filter(self.level));
        EnvFilter::try_new(&directives)
            .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
    }
}

/// Install the global subscriber. Only the first call in a process succeeds.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let sink_layer = config.sink.clone().map(|sink| SinkLayer {
        sink,
        redact: config.redact,
    });

    tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(fmt_layer(config.format))
        .with(sink_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn tracing_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

fn log_level(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        _ => LogLevel::Error,
    }
}

fn default_filter(level: LogLevel) -> String {
    let level = tracing_level(level).as_str().to_ascii_lowercase();
    let mut directives: Vec<String> = WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect();
    directives.extend(NOISY_TARGETS.iter().map(|target| format!("{}=warn", target)));
    directives.join(",")
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().flatten_event(true).with_span_list(false).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Copies events into a [`LoggerSink`].
struct SinkLayer {
    sink: Arc<dyn LoggerSink>,
    redact: bool,
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = log_level(metadata.level());
        if level < self.sink.min_level() {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields.message.take().unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        for (name, value) in fields.values {
            let value = if self.redact {
                redact_if_sensitive(&name, &value)
            } else {
                value
            };
            entry = entry.with_field(name, value);
        }
        if let Some(span) = ctx.lookup_current() {
            entry = entry.with_field("span", span.name());
        }

        deliver(Arc::clone(&self.sink), entry);
    }
}

/// Hand an entry to the sink without blocking a runtime thread.
fn deliver(sink: Arc<dyn LoggerSink>, entry: LogEntry) {
    let send = async move {
        if let Err(err) = sink.log(entry).await {
            eprintln!("log sink failed: {}", err);
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(send);
        }
        Err(_) => futures::executor::block_on(send),
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: HashMap<String, String>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{:?}", value));
    }
}

/// `[REDACTED]` when the field name looks like a credential, else `value`.
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    let name = field_name.to_ascii_lowercase();
    if SENSITIVE_FIELDS.iter().any(|sensitive| name.contains(sensitive)) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

/// Final path component; library roots usually sit under a home directory.
pub fn strip_path(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
