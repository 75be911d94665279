//! Log subscriber setup shared by the emsmdb crates.
//!
//! The property model, the codec and the Rop dispatcher only emit
//! `tracing` events; an embedding process calls [`init_tracing`] once to
//! decide where they go.
//!
//! ```ignore
//! use emsmdb_core::tracing::{init_tracing, TracingConfig};
//!
//! // Level and format names as they appear in the provider config file.
//! init_tracing(TracingConfig::from_names("debug", "compact")?)?;
//! ```

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Crate targets enabled at the default level when `RUST_LOG` is unset.
const CRATE_TARGETS: [&str; 3] = ["emsmdb_core", "emsmdb_protocol", "emsmdb_server"];

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("unknown log format: {0}")]
    UnknownFormat(String),

    #[error("unknown log level: {0}")]
    UnknownLevel(String),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, human oriented.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for TracingOutputFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TracingError::UnknownFormat(other.to_string())),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub default_level: Level,
    pub output_format: TracingOutputFormat,
    /// Adds file and line to each event.
    pub include_location: bool,
    /// Logs span open and close, which brackets each dispatched Rop.
    pub include_span_events: bool,
    /// Explicit filter directive; takes precedence over `RUST_LOG`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Pretty,
            include_location: false,
            include_span_events: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Verbose single-line output for following Rop traffic by hand.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            output_format: TracingOutputFormat::Compact,
            include_location: true,
            include_span_events: true,
            env_filter: None,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Builds a config from level and format names (`"debug"`, `"json"`).
    pub fn from_names(level: &str, format: &str) -> Result<Self, TracingError> {
        let level = Level::from_str(level)
            .map_err(|_| TracingError::UnknownLevel(level.to_string()))?;
        Ok(Self::default()
            .with_level(level)
            .with_format(format.parse()?))
    }

    /// Default directive covering every emsmdb crate.
    fn default_directive(&self) -> String {
        CRATE_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, self.default_level))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.env_filter {
            Some(directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(self.default_directive()))?),
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.include_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_file(self.include_location)
            .with_line_number(self.include_location)
            .with_span_events(span_events);

        match self.output_format {
            TracingOutputFormat::Pretty => base.pretty().boxed(),
            TracingOutputFormat::Compact => base.compact().boxed(),
            TracingOutputFormat::Json => base.json().boxed(),
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the filter directive does
/// not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let subscriber = tracing_subscriber::registry()
        .with(config.layer())
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_names_parses_case_insensitively() {
        let config = TracingConfig::from_names("debug", "JSON").unwrap();
        assert_eq!(config.default_level, Level::DEBUG);
        assert_eq!(config.output_format, TracingOutputFormat::Json);
    }

    #[test]
    fn from_names_rejects_unknown_values() {
        assert!(matches!(
            TracingConfig::from_names("loud", "json"),
            Err(TracingError::UnknownLevel(_))
        ));
        assert!(matches!(
            TracingConfig::from_names("info", "xml"),
            Err(TracingError::UnknownFormat(_))
        ));
    }

    #[test]
    fn default_directive_names_every_crate() {
        let config = TracingConfig::default().with_level(Level::WARN);
        assert_eq!(
            config.default_directive(),
            "emsmdb_core=WARN,emsmdb_protocol=WARN,emsmdb_server=WARN"
        );
    }

    #[test]
    fn explicit_filter_wins() {
        let config = TracingConfig::debug().with_env_filter("emsmdb_server=trace");
        assert_eq!(config.env_filter.as_deref(), Some("emsmdb_server=trace"));
        assert!(config.filter().is_ok());
    }
}
