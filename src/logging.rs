//! Tracing setup.
//!
//! The library only emits `tracing` events; installing a subscriber is up to the binary.
//! [`init_from_config`] does that from the `[application]` section: a single `fmt` layer
//! on stderr in pretty, compact or JSON form, filtered by `RUST_LOG` when set and by the
//! configured level otherwise. Stdout is left to the report.
//!
//! # Example
//! ```no_run
//! use ivqc::{config::IvConfig, logging};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IvConfig::load()?;
//! logging::init_from_config(&config)?;
//! info!(serial = "20UPGS81100001", "Analysis started");
//! # Ok(())
//! # }
//! ```

use crate::config::IvConfig;
use crate::error::{AppResult, IvError};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// How events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Multi-line, colored; for interactive use
    #[default]
    Pretty,
    /// One line per event, no colors
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for OutputFormat {
    type Err = IvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            _ => Err(IvError::Settings(format!(
                "Unknown log format '{s}' (pretty, compact, json)"
            ))),
        }
    }
}

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Maximum level when `RUST_LOG` is not set
    pub level: Level,
    /// Rendering
    pub format: OutputFormat,
    /// Also log span open/close, useful to time a scan
    pub span_events: bool,
    /// Include source file and line
    pub source_location: bool,
    /// ANSI colors; only the pretty format uses them
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::default(),
            span_events: false,
            source_location: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Level and format from `[application]`.
    pub fn from_config(config: &IvConfig) -> AppResult<Self> {
        Ok(Self {
            level: parse_level(&config.application.log_level)?,
            format: config.application.log_format.parse()?,
            ..Default::default()
        })
    }

    /// Defaults at `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set the format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggle span open/close events.
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Toggle colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.ansi = enabled;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_ascii_lowercase()))
    }

    fn layer(&self) -> BoxedLayer {
        let spans = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(spans)
            .with_file(self.source_location)
            .with_line_number(self.source_location);

        match self.format {
            OutputFormat::Pretty => base.pretty().with_ansi(self.ansi).boxed(),
            OutputFormat::Compact => base.compact().with_ansi(false).boxed(),
            OutputFormat::Json => base.json().with_ansi(false).boxed(),
        }
    }
}

/// Install the global subscriber described by `[application]`.
pub fn init_from_config(config: &IvConfig) -> AppResult<()> {
    init(LoggingConfig::from_config(config)?)
}

/// Install the global subscriber.
///
/// A second call, or a call after a test harness installed its own subscriber, is a no-op.
pub fn init(config: LoggingConfig) -> AppResult<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }
    tracing_subscriber::registry()
        .with(config.layer().with_filter(config.filter()))
        .try_init()
        .map_err(|e| IvError::Settings(format!("Cannot install tracing subscriber: {e}")))
}

fn parse_level(level: &str) -> AppResult<Level> {
    Level::from_str(level.trim()).map_err(|_| {
        IvError::Settings(format!(
            "Unknown log level '{level}' (trace, debug, info, warn, error)"
        ))
    })
}
