use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

/// Crates of this workspace that receive the configured log level.
///
/// All other crates are capped at `WARN` unless `RUST_LOG` says otherwise.
const CRATE_NAMES: &[&str] = &[
    "elbtail",
    "elbtail_config",
    "elbtail_event",
    "elbtail_log",
    "elbtail_parser",
    "elbtail_publisher",
    "elbtail_sampling",
    "elbtail_shaper",
    "elbtail_sink",
    "elbtail_statsd",
];

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO elbtail::setup: launching elbtail without config folder
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2020-12-04T12:10:32Z  INFO elbtail::setup: launching elbtail without config folder
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2020-12-04T12:11:08.729716Z","level":"INFO","target":"elbtail::setup","message":"launching elbtail without config folder"}
    /// ```
    Json,
}

/// The maximum level of log messages emitted by the crates of this workspace.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// The "error" level.
    Error,
    /// The "warn" level.
    Warn,
    /// The "info" level.
    Info,
    /// The "debug" level.
    Debug,
    /// The "trace" level.
    Trace,
    /// Disables all logging.
    Off,
}

impl Level {
    /// Returns the lowercase name of the level as used in filter directives.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
            Level::Off => "off",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for elbtail.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE` variable to `full`.
    pub enable_backtraces: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: LogFormat::Auto,
            enable_backtraces: false,
        }
    }
}

/// Builds the filter used when `RUST_LOG` is not set.
///
/// Third-party crates are limited to warnings, the crates of this workspace log at `level`.
fn default_filter(level: Level) -> EnvFilter {
    let mut directives = vec![LevelFilter::WARN.to_string()];
    for name in CRATE_NAMES {
        directives.push(format!("{name}={level}"));
    }

    EnvFilter::new(directives.join(","))
}

/// Initialize the logging system.
///
/// Logs are written to `stderr`. The `RUST_LOG` environment variable overrides the filter
/// derived from [`LogConfig::level`].
///
/// # Example
///
/// ```ignore
/// let log_config = elbtail_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// elbtail_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        // SAFETY: logging is initialized once at startup before any worker threads exist.
        unsafe { env::set_var("RUST_BACKTRACE", "full") };
    }

    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => default_filter(config.level),
    };

    let subscriber = tracing_fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let format = match (config.format, console::user_attended_stderr()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
            subscriber.compact().without_time().boxed()
        }
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            subscriber.with_ansi(false).boxed()
        }
        (LogFormat::Json, _) => subscriber
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(filter))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        let config: LogConfig = serde_yaml::from_str("level: off").unwrap();
        assert_eq!(config.level, Level::Off);
        assert_eq!(Level::Warn.to_string(), "warn");
        assert!(serde_yaml::from_str::<LogConfig>("level: verbose").is_err());
    }

    #[test]
    fn test_log_config_defaults() {
        let config: LogConfig = serde_yaml::from_str("format: json").unwrap();
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.enable_backtraces);
    }

    #[test]
    fn test_default_filter_mentions_workspace_crates() {
        let filter = default_filter(Level::Debug).to_string().to_lowercase();
        assert!(filter.contains("elbtail_publisher=debug"));
        assert!(filter.contains("elbtail_sink=debug"));
    }
}
