//! Console and rolling-file tracing setup for the logline store
//!
//! Every binary and test in the workspace installs its subscriber through
//! this crate so output format and filtering stay consistent.
//!
//! # Features
//!
//! - **Pretty or JSON console output**
//! - **File output**: JSON lines with daily/hourly rotation via tracing-appender
//! - **Filtering**: a default level plus per-target levels; `RUST_LOG` wins
//!   when set
//!
//! # Quick Start
//!
//! ```ignore
//! use logline_logging::{LogConfig, LogSubscriberBuilder};
//!
//! // Keep the guard alive so buffered file output is flushed on exit
//! let _guard = LogSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .try_init()?;
//! ```

pub mod config;
pub mod error;

pub use config::{ConsoleConfig, FileConfig, JsonConfig, LogConfig, RotationStrategy};
pub use error::{LoggingError, LoggingResult};
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};

use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type FilteredRegistry = Layered<EnvFilter, Registry>;

/// One output layer, boxed so console and file variants share a type
pub type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// The subscriber assembled by [`LogSubscriberBuilder::build`]
pub type LogSubscriber = Layered<Vec<BoxedLayer>, FilteredRegistry>;

/// Builder for configuring and installing the logline tracing subscriber
pub struct LogSubscriberBuilder {
    config: LogConfig,
    env_override: bool,
    test_writer: bool,
}

impl LogSubscriberBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
            env_override: true,
            test_writer: false,
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Set the level of one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.config.targets.insert(target.into(), level.into());
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Whether `RUST_LOG` replaces the configured levels (default: yes)
    pub fn with_env_override(mut self, enabled: bool) -> Self {
        self.env_override = enabled;
        self
    }

    /// Route console output through the test harness capture
    pub fn with_test_writer(mut self) -> Self {
        self.test_writer = true;
        self
    }

    /// The configuration that will be applied
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Build the subscriber without installing it
    ///
    /// The returned guard, present when file output is configured, flushes
    /// the file writer when dropped.
    pub fn build(self) -> LoggingResult<(LogSubscriber, Option<WorkerGuard>)> {
        let filter = self.filter()?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;
        if let Some(layer) = self.console_layer() {
            layers.push(layer);
        }
        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(self.json_layer().with_writer(writer).boxed());
            guard = Some(file_guard);
        }

        Ok((Registry::default().with(filter).with(layers), guard))
    }

    /// Build the subscriber and install it globally
    ///
    /// Keep the returned guard alive for the life of the program.
    pub fn try_init(self) -> LoggingResult<Option<WorkerGuard>> {
        let (subscriber, guard) = self.build()?;
        subscriber
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        Ok(guard)
    }

    fn filter(&self) -> LoggingResult<EnvFilter> {
        if self.env_override
            && let Ok(filter) = EnvFilter::try_from_default_env()
        {
            return Ok(filter);
        }
        let directives = self.config.directives();
        EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidFilter {
            directives,
            reason: e.to_string(),
        })
    }

    fn json_layer<S>(
        &self,
    ) -> tracing_subscriber::fmt::Layer<
        S,
        tracing_subscriber::fmt::format::JsonFields,
        tracing_subscriber::fmt::format::Format<tracing_subscriber::fmt::format::Json>,
    >
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let json = &self.config.json;
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(json.include_spans)
            .flatten_event(json.flatten_events)
            .with_file(json.include_location)
            .with_line_number(json.include_location)
    }

    fn console_layer(&self) -> Option<BoxedLayer> {
        let console = &self.config.console;
        if !console.enabled {
            return None;
        }
        let layer = match (console.pretty, self.test_writer) {
            (true, false) => tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
                .boxed(),
            (true, true) => tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
                .with_test_writer()
                .boxed(),
            (false, false) => self.json_layer().boxed(),
            (false, true) => self.json_layer().with_test_writer().boxed(),
        };
        Some(layer)
    }
}

impl Default for LogSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the writer for file output
///
/// `Never` rotation truncates a single `{prefix}.log`; the other strategies
/// append to `{prefix}.{date}` files.
pub fn file_writer(config: &FileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.directory).map_err(|source| LoggingError::CreateDirectory {
        path: config.directory.clone(),
        source,
    })?;

    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            let file = File::create(&path)
                .map_err(|source| LoggingError::CreateFile { path, source })?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the subscriber described by `config`
pub fn init(config: LogConfig) -> LoggingResult<Option<WorkerGuard>> {
    LogSubscriberBuilder::new().with_config(config).try_init()
}

/// Install a warn-level subscriber captured by the test harness
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_testing() {
    let _ = LogSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .with_test_writer()
        .try_init();
}
