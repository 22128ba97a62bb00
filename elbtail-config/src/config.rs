use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use elbtail_log::LogConfig;
use elbtail_publisher::PublisherConfig;
use elbtail_sampling::AvgSampleRateConfig;
use elbtail_shaper::ShapingConfig;
use elbtail_sink::HoneycombConfig;
use serde::{Deserialize, Serialize};

/// Name of the configuration file within the config folder.
const CONFIG_FILE_NAME: &str = "config.yml";

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => write!(f, " (file {})", file_name.display()),
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    error: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            error: None,
        }
    }

    #[inline]
    fn wrap<E>(error: E, kind: ConfigErrorKind) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            error: Some(error.into()),
        }
    }

    #[inline]
    fn for_field<E>(error: E, field: &'static str) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self::wrap(error, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.error.as_ref().map(|error| error.as_ref() as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to save a file.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
    /// A value that is needed for the requested command is not set.
    #[error("missing config value")]
    MissingValue,
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The key that authorizes writes to the dataset.
    pub write_key: Option<String>,
    /// The dataset events are written to.
    pub dataset: Option<String>,
    /// Base URL of the events API.
    pub api_host: Option<String>,
    /// The goal sample rate of the adaptive sampler.
    pub sample_rate: Option<String>,
    /// Hostname and port of the statsd server.
    pub statsd: Option<String>,
}

/// Controls internal reporting to statsd.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Defaults to `"elbtail"`.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Tag name to report the hostname to for each metric. Defaults to not sending such a tag.
    hostname_tag: Option<String>,
    /// Emitted metrics will be buffered to optimize performance.
    ///
    /// Defaults to `true`.
    buffering: bool,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    ///
    /// For example, a value of `0.3` means that only 30% of the emitted metrics will be sent.
    /// Defaults to `1.0` (100%).
    sample_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "elbtail".to_owned(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
            buffering: true,
            sample_rate: 1.0,
        }
    }
}

/// Controls the adaptive sampler.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Sampling {
    /// The average sample rate to approach across all keys.
    goal_sample_rate: i64,
    /// Seconds between two recomputations of the per-key rates.
    clear_frequency_secs: u64,
    /// Seed for the keep or drop decisions. Random if not set.
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

impl Default for Sampling {
    fn default() -> Self {
        Sampling {
            goal_sample_rate: 10,
            clear_frequency_secs: 300,
            seed: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ConfigValues {
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    metrics: Metrics,
    #[serde(default)]
    honeycomb: HoneycombConfig,
    #[serde(default)]
    sampling: Sampling,
    #[serde(default)]
    publisher: PublisherConfig,
    #[serde(default)]
    shaping: ShapingConfig,
}

impl ConfigValues {
    fn path(base: &Path) -> PathBuf {
        base.join(CONFIG_FILE_NAME)
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }

    /// Writes the configuration to a file within the given directory location.
    fn save(&self, base: &Path) -> Result<(), ConfigError> {
        let path = Self::path(base);
        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true).create(true);

        // Remove all non-user permissions for the newly created file
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut f = options
            .open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&path))?;

        serde_yaml::to_writer(&mut f, self)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&path))?;
        f.write_all(b"\n").ok();

        Ok(())
    }
}

/// Config struct.
#[derive(Default)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = absolute(path.as_ref());

        Ok(Config {
            values: ConfigValues::load(&path)?,
            path,
        })
    }

    /// Creates a default config that belongs to the given config folder.
    ///
    /// Nothing is read from or written to the folder until [`save`](Self::save) is called.
    pub fn default_at<P: AsRef<Path>>(path: P) -> Config {
        Config {
            values: ConfigValues::default(),
            path: absolute(path.as_ref()),
        }
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let honeycomb = &mut self.values.honeycomb;

        if let Some(write_key) = overrides.write_key {
            honeycomb.write_key = write_key;
        }

        if let Some(dataset) = overrides.dataset {
            honeycomb.dataset = dataset;
        }

        if let Some(api_host) = overrides.api_host {
            url::Url::parse(&api_host).map_err(|err| ConfigError::for_field(err, "api_host"))?;
            honeycomb.api_host = api_host;
        }

        if let Some(sample_rate) = overrides.sample_rate {
            let sample_rate = sample_rate
                .parse::<i64>()
                .map_err(|err| ConfigError::for_field(err, "sample_rate"))?;
            if sample_rate < 1 {
                return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("sample_rate"));
            }
            self.values.sampling.goal_sample_rate = sample_rate;
        }

        if let Some(statsd) = overrides.statsd {
            self.values.metrics.statsd = Some(statsd);
        }

        Ok(self)
    }

    /// Checks if the config folder contains a config file.
    pub fn config_exists<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(ConfigValues::path(path.as_ref())).is_ok()
    }

    /// Writes the config file into the config folder.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.values.save(&self.path)
    }

    /// Checks that everything needed to publish events is configured.
    pub fn check_publish(&self) -> Result<(), ConfigError> {
        let honeycomb = &self.values.honeycomb;

        if honeycomb.write_key.is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::MissingValue).field("write_key"));
        }

        if honeycomb.dataset.is_empty() {
            return Err(ConfigError::new(ConfigErrorKind::MissingValue).field("dataset"));
        }

        if self.values.sampling.goal_sample_rate < 1 {
            return Err(
                ConfigError::new(ConfigErrorKind::InvalidValue).field("sampling.goal_sample_rate")
            );
        }

        Ok(())
    }

    /// Returns the path of the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the socket addresses for statsd.
    ///
    /// If stats is disabled, this returns `None`.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Returns the prefix that should be added to all metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for statsd metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the name of the hostname tag that should be attached to each outgoing metric.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Returns true if metrics should be buffered.
    pub fn metrics_buffering(&self) -> bool {
        self.values.metrics.buffering
    }

    /// Returns the global sample rate for all metrics.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }

    /// Returns the configuration of the event sink.
    pub fn honeycomb(&self) -> &HoneycombConfig {
        &self.values.honeycomb
    }

    /// Returns the configuration of the adaptive sampler.
    pub fn sampler_config(&self) -> AvgSampleRateConfig {
        AvgSampleRateConfig {
            goal_sample_rate: self.values.sampling.goal_sample_rate,
            clear_frequency: Duration::from_secs(self.values.sampling.clear_frequency_secs),
        }
    }

    /// Returns the seed for sampling decisions, if one is configured.
    pub fn sampling_seed(&self) -> Option<u64> {
        self.values.sampling.seed
    }

    /// Returns the parallelism and buffering of the pipeline.
    pub fn publisher(&self) -> &PublisherConfig {
        &self.values.publisher
    }

    /// Returns how request lines are decomposed.
    pub fn shaping(&self) -> &ShapingConfig {
        &self.values.shaping
    }
}

fn absolute(path: &Path) -> PathBuf {
    env::current_dir()
        .map(|x| x.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use elbtail_log::Level;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_missing_sections_use_defaults() {
        let yaml = r###"
honeycomb:
    write_key: secret
    dataset: elb-logs
sampling:
    goal_sample_rate: 20
"###;

        let values: ConfigValues = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(values.honeycomb.write_key, "secret");
        assert_eq!(values.honeycomb.max_batch_size, 500);
        assert_eq!(values.sampling.goal_sample_rate, 20);
        assert_eq!(values.sampling.clear_frequency_secs, 300);
        assert_eq!(values.metrics.prefix, "elbtail");
        assert_eq!(values.shaping.request_field, "request");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = Config::default_at(dir.path());
        config
            .apply_override(OverridableConfig {
                write_key: Some("secret".to_owned()),
                dataset: Some("elb-logs".to_owned()),
                sample_rate: Some("25".to_owned()),
                ..Default::default()
            })
            .unwrap();
        config.save().unwrap();

        assert!(Config::config_exists(dir.path()));

        let loaded = Config::from_path(dir.path()).unwrap();
        assert_eq!(loaded.honeycomb().write_key, "secret");
        assert_eq!(loaded.honeycomb().dataset, "elb-logs");
        assert_eq!(loaded.sampler_config().goal_sample_rate, 25);
        assert_eq!(loaded.to_yaml_string().unwrap(), config.to_yaml_string().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        Config::default_at(dir.path()).save().unwrap();

        let metadata = fs::metadata(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = Config::from_path(dir.path()).unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert!(error.source().is_some());
        assert!(error.to_string().starts_with("could not open config file (file "));
    }

    #[test]
    fn test_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "sampling: [1, 2").unwrap();

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
    }

    #[test]
    fn test_from_json_value() {
        let config = Config::from_json_value(serde_json::json!({
            "logging": {"level": "debug"},
            "metrics": {"statsd": "127.0.0.1:8125", "default_tags": {"env": "prod"}},
            "publisher": {"num_parsers": 3, "channel_capacity": 16},
            "shaping": {"url_patterns": ["/users/:id"]},
        }))
        .unwrap();

        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(config.statsd_addr(), Some("127.0.0.1:8125"));
        assert_eq!(config.metrics_default_tags()["env"], "prod");
        assert_eq!(config.publisher().num_parsers, 3);
        assert_eq!(config.shaping().url_patterns, ["/users/:id"]);
    }

    #[test]
    fn test_from_json_value_invalid() {
        let error = Config::from_json_value(serde_json::json!({"sampling": "often"})).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadJson);
    }

    #[test]
    fn test_override_invalid_sample_rate() {
        let mut config = Config::default();

        for value in ["often", "0", "-4"] {
            let error = config
                .apply_override(OverridableConfig {
                    sample_rate: Some(value.to_owned()),
                    ..Default::default()
                })
                .unwrap_err();

            assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
            assert_eq!(error.to_string(), "invalid config value (field sample_rate)");
        }

        assert_eq!(config.sampler_config().goal_sample_rate, 10);
    }

    #[test]
    fn test_override_api_host_and_statsd() {
        let mut config = Config::default();

        let error = config
            .apply_override(OverridableConfig {
                api_host: Some("not a url".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(error.to_string(), "invalid config value (field api_host)");

        config
            .apply_override(OverridableConfig {
                api_host: Some("http://localhost:8080/".to_owned()),
                statsd: Some("127.0.0.1:8125".to_owned()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(config.honeycomb().api_host, "http://localhost:8080/");
        assert_eq!(config.statsd_addr(), Some("127.0.0.1:8125"));
    }

    #[test]
    fn test_check_publish() {
        let mut config = Config::default();

        let error = config.check_publish().unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::MissingValue);
        assert_eq!(error.to_string(), "missing config value (field write_key)");

        config
            .apply_override(OverridableConfig {
                write_key: Some("secret".to_owned()),
                ..Default::default()
            })
            .unwrap();
        let error = config.check_publish().unwrap_err();
        assert_eq!(error.to_string(), "missing config value (field dataset)");

        config
            .apply_override(OverridableConfig {
                dataset: Some("elb-logs".to_owned()),
                ..Default::default()
            })
            .unwrap();
        assert!(config.check_publish().is_ok());
    }

    #[test]
    fn test_check_publish_goal_sample_rate_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
honeycomb:
  write_key: secret
  dataset: elb-logs
sampling:
  goal_sample_rate: 0
"#;
        fs::write(dir.path().join(CONFIG_FILE_NAME), yaml).unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        let error = config.check_publish().unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(
            error.to_string(),
            "invalid config value (field sampling.goal_sample_rate)"
        );
    }
}
