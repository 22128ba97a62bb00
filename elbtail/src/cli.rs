use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use elbtail_config::{Config, OverridableConfig};
use elbtail_publisher::{PublishSummary, Publisher};
use elbtail_sampling::AvgSampleRate;
use elbtail_sink::{EventSink, global};

use crate::cliapp::make_app;
use crate::setup;

/// Config folder used when `--config` is not passed.
const DEFAULT_CONFIG_PATH: &str = ".elbtail";

/// Input name that stands for stdin.
const STDIN: &str = "-";

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();

    let config_path = matches
        .get_one::<PathBuf>("config")
        .map_or(Path::new(DEFAULT_CONFIG_PATH), PathBuf::as_path);

    let config = if Config::config_exists(config_path) {
        Config::from_path(config_path)?
    } else {
        Config::default()
    };

    elbtail_log::init(config.logging());

    match matches.subcommand() {
        Some(("publish", matches)) => publish(config, matches),
        Some(("config", matches)) => manage_config(config_path, &config, matches),
        _ => unreachable!(),
    }
}

/// Extract config arguments from a parsed command line arguments object.
///
/// Environment variables are resolved by the argument definitions.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    let value = |name: &str| matches.get_one::<String>(name).cloned();

    OverridableConfig {
        write_key: value("write_key"),
        dataset: value("dataset"),
        api_host: value("api_host"),
        sample_rate: value("sample_rate"),
        statsd: value("statsd"),
    }
}

pub fn manage_config(config_path: &Path, config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("init", _)) => init_config(config_path),
        Some(("show", matches)) => show_config(config, matches),
        _ => unreachable!(),
    }
}

pub fn init_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let config_path = config_path.as_ref();

    if Config::config_exists(config_path) {
        bail!(
            "there is already a config in {}, remove it to start over",
            config_path.display()
        );
    }

    fs::create_dir_all(config_path).with_context(|| {
        format!("failed to create config folder {}", config_path.display())
    })?;

    let config = Config::default_at(config_path);
    config.save()?;

    elbtail_log::info!("wrote config to {}", config.path().display());
    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn show_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.get_one::<String>("format").map(String::as_str) {
        Some("debug") => println!("{config:#?}"),
        _ => println!("{}", config.to_yaml_string()?),
    }

    Ok(())
}

pub fn publish(mut config: Config, matches: &ArgMatches) -> Result<()> {
    config.apply_override(extract_config_args(matches))?;

    setup::check_config(&config)?;
    setup::dump_spawn_infos(&config);
    setup::init_metrics(&config)?;

    let inputs: Vec<&OsStr> = match matches.get_many::<OsString>("files") {
        Some(files) => files.map(OsString::as_os_str).collect(),
        None => vec![OsStr::new(STDIN)],
    };

    let sink = global::ensure_initialized(config.honeycomb())
        .context("failed to initialize event sink")?;

    let result = publish_inputs(&config, sink, &inputs);
    global::close();
    result
}

/// Publishes all inputs concurrently and waits for them to finish.
fn publish_inputs(config: &Config, sink: Arc<dyn EventSink>, inputs: &[&OsStr]) -> Result<()> {
    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .iter()
            .map(|&input| {
                let sink = Arc::clone(&sink);
                scope.spawn(move || publish_input(config, sink, input))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    });

    let mut failed = 0;
    for (input, result) in inputs.iter().zip(results) {
        match result {
            Ok(summary) => elbtail_log::info!(
                input = %Path::new(input).display(),
                lines = summary.lines,
                kept = summary.kept,
                dropped = summary.dropped,
                unparsed = summary.unparsed(),
                failed = summary.failed,
                "published input"
            ),
            Err(error) => {
                failed += 1;
                elbtail_log::error!(
                    input = %Path::new(input).display(),
                    error = &*error as &dyn std::error::Error,
                    "failed to publish input"
                );
            }
        }
    }

    if failed > 0 {
        bail!("failed to publish {failed} of {} inputs", inputs.len());
    }

    Ok(())
}

fn publish_input(
    config: &Config,
    sink: Arc<dyn EventSink>,
    input: &OsStr,
) -> Result<PublishSummary> {
    let reader: Box<dyn Read> = if input == STDIN {
        Box::new(io::stdin().lock())
    } else {
        let file = fs::File::open(input)
            .with_context(|| format!("failed to open {}", Path::new(input).display()))?;
        Box::new(file)
    };

    let sampler = AvgSampleRate::new(config.sampler_config());
    let publisher = Publisher::new(
        config.publisher().clone(),
        config.shaping(),
        Box::new(sampler),
        sink,
    )?
    .with_seed(config.sampling_seed());

    Ok(publisher.publish(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_config_args() {
        let matches = make_app()
            .try_get_matches_from([
                "elbtail",
                "publish",
                "--write-key",
                "secret",
                "--dataset",
                "elb-logs",
                "--sample-rate",
                "20",
            ])
            .unwrap();
        let (_, publish) = matches.subcommand().unwrap();

        let overrides = extract_config_args(publish);
        assert_eq!(overrides.write_key.as_deref(), Some("secret"));
        assert_eq!(overrides.dataset.as_deref(), Some("elb-logs"));
        assert_eq!(overrides.sample_rate.as_deref(), Some("20"));
    }

    #[test]
    fn test_init_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config");

        init_config(&path).unwrap();
        assert!(Config::config_exists(&path));
        assert!(init_config(&path).is_err());
    }

    #[test]
    fn test_publish_missing_file() {
        let config = Config::default();
        let sink: Arc<dyn EventSink> = Arc::new(NullSink);

        let error = publish_input(&config, sink, OsStr::new("/does/not/exist.log")).unwrap_err();
        assert_eq!(error.to_string(), "failed to open /does/not/exist.log");
    }

    struct NullSink;

    impl EventSink for NullSink {
        fn send_presampled(
            &self,
            _event: elbtail_sink::SinkEvent,
        ) -> Result<(), elbtail_sink::SendError> {
            Ok(())
        }

        fn close(&self) {}
    }
}
