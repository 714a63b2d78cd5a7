//! Structured logging setup.
//!
//! docbatch logs batch dispatches and query priming at `debug`, cache hits
//! at `trace` and batch failures at `warn`. `RUST_LOG` overrides the
//! configured level. Applications normally go through
//! [`DocbatchConfig::init_logging`](crate::DocbatchConfig::init_logging).
//!
//! ```ignore
//! let config = DocbatchConfig::load("docbatch.yaml")?;
//! config.init_logging();
//! ```

use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    prelude::*,
    registry::LookupSpan,
    EnvFilter, Layer,
};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// How log events are rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// One JSON object per line instead of pretty text.
    pub json_format: bool,
    /// Level used when `RUST_LOG` is unset or unparsable.
    pub default_level: Level,
    /// Emit span enter and exit events.
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
            include_spans: false,
        }
    }
}

impl LoggingConfig {
    /// JSON output at `INFO`.
    pub fn json() -> Self {
        Self {
            json_format: true,
            ..Default::default()
        }
    }

    /// Pretty text output at `INFO`.
    pub fn text() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_level.to_string()))
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_spans {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        }
    }

    /// Builds the formatting layer for this configuration.
    pub fn output_layer<S>(&self) -> BoxedLayer<S>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let layer = fmt::layer()
            .with_target(true)
            .with_span_events(self.span_events());
        if self.json_format {
            layer
                .json()
                .with_current_span(true)
                .with_file(false)
                .with_line_number(false)
                .boxed()
        } else {
            layer.pretty().boxed()
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// Returns false if a global subscriber was already installed, in which case
/// the existing one stays in place.
pub fn init_logging(config: LoggingConfig) -> bool {
    let installed = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(config.output_layer())
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(
            json = config.json_format,
            level = %config.default_level,
            "logging initialized"
        );
    }
    installed
}

/// Subscriber that writes every event, at any level, as JSON to `writer`.
///
/// Meant for scoped use with `tracing::subscriber::with_default`.
pub fn json_capture_subscriber<W>(writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        )
}
