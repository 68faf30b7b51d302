//! Logging infrastructure - structured tracing for the boundary
//!
//! Diagnostics go to stderr, the process error stream. Step tracing toggled by
//! `Bridge::set_debug` is emitted under the `prolog_bridge::trace` target so
//! it can be filtered on its own.

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Target used by debug step tracing
pub const TRACE_TARGET: &str = "prolog_bridge::trace";

/// Emit a step-trace event when the bridge debug flag is on
macro_rules! trace_step {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            ::tracing::debug!(target: $crate::logging::TRACE_TARGET, $($arg)+);
        }
    };
}
pub(crate) use trace_step;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path, in addition to stderr
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // PROLOG_BRIDGE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("PROLOG_BRIDGE_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::INFO);
        }

        if let Ok(path) = std::env::var("PROLOG_BRIDGE_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("PROLOG_BRIDGE_LOG_JSON").is_ok();
        config.show_spans = std::env::var("PROLOG_BRIDGE_LOG_SPANS").is_ok();

        config
    }

    /// Verbose config with step tracing visible
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            show_spans: true,
            ..Self::default()
        }
    }
}

pub fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration; later calls are ignored
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!(
                    "prolog_bridge={}",
                    config.level.as_str().to_lowercase()
                ))
            })
        };

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let stderr_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_span_events(span_events.clone())
                .with_filter(filter())
                .boxed()
        } else {
            fmt::layer()
                .with_writer(io::stderr)
                .with_span_events(span_events.clone())
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_filter(filter())
                .boxed()
        };

        let (file_layer, guard) = match config.log_path.as_deref().map(Path::new) {
            Some(path) => {
                let directory = path.parent().unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "prolog_bridge.log".to_string());
                let appender = tracing_appender::rolling::never(directory, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_span_events(span_events)
                    .with_filter(filter())
                    .boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        // A subscriber installed by the host application wins
        let _ = tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .try_init();
        guard
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.log_path.is_none());

        let debug_config = LogConfig::debug();
        assert_eq!(debug_config.level, Level::TRACE);
        assert!(debug_config.show_spans);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn test_init_idempotent() {
        init();
        init();
        assert!(is_initialized());
    }
}
