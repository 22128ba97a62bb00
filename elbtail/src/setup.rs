use anyhow::{Context, Result};
use elbtail_config::Config;
use elbtail_statsd::MetricsClientConfig;

/// Validates the config before anything is published.
pub fn check_config(config: &Config) -> Result<()> {
    config
        .check_publish()
        .context("set the write key and dataset in the config file or on the command line")?;

    if config.publisher().num_parsers == 0 {
        elbtail_log::warn!("num_parsers is 0, using a single parser thread");
    }

    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        elbtail_log::info!("launching elbtail without config folder");
    } else {
        elbtail_log::info!(
            "launching elbtail from config folder {}",
            config.path().display()
        );
    }

    let honeycomb = config.honeycomb();
    let sampler = config.sampler_config();
    elbtail_log::info!("  api host: {}", honeycomb.api_host);
    elbtail_log::info!("  dataset: {}", honeycomb.dataset);
    elbtail_log::info!("  goal sample rate: {}", sampler.goal_sample_rate);
    elbtail_log::info!("  parser threads: {}", config.publisher().num_parsers);
    elbtail_log::info!("  log level: {}", config.logging().level);
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok())
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }

    elbtail_statsd::init(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host,
        default_tags,
        default_sample_rate: config.metrics_sample_rate().into(),
        buffering: config.metrics_buffering(),
    })
    .with_context(|| format!("failed to initialize metrics for {host}"))?;

    Ok(())
}
