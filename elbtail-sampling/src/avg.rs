use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use elbtail_statsd::metric;
use parking_lot::Mutex;

use crate::statsd::{SamplingCounters, SamplingGauges};
use crate::{Sampler, SamplerError};

/// Configuration of [`AvgSampleRate`].
#[derive(Clone, Debug)]
pub struct AvgSampleRateConfig {
    /// The average sample rate to approach across all keys.
    pub goal_sample_rate: i64,
    /// Length of the interval after which rates are recomputed from the observed counts.
    pub clear_frequency: Duration,
}

impl Default for AvgSampleRateConfig {
    fn default() -> Self {
        Self {
            goal_sample_rate: 10,
            clear_frequency: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Default)]
struct Counts {
    /// Occurrences per key in the current interval.
    current: HashMap<String, u64>,
    /// Rates computed at the end of the last non-empty interval.
    saved: HashMap<String, i64>,
    /// Whether rates were computed at least once.
    have_data: bool,
}

#[derive(Debug)]
struct Shared {
    goal_sample_rate: i64,
    counts: Mutex<Counts>,
}

impl Shared {
    fn update(&self) {
        let current = std::mem::take(&mut self.counts.lock().current);

        if current.is_empty() {
            self.counts.lock().saved.clear();
            metric!(counter(SamplingCounters::RatesCleared) += 1);
            return;
        }

        metric!(gauge(SamplingGauges::ActiveKeys) = current.len() as u64);
        let saved = compute_rates(&current, self.goal_sample_rate);

        let mut counts = self.counts.lock();
        counts.saved = saved;
        counts.have_data = true;
        metric!(counter(SamplingCounters::RatesComputed) += 1);
    }
}

#[derive(Debug)]
enum Ticker {
    Idle,
    Running {
        shutdown: flume::Sender<()>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// A sampler that approaches an average sample rate across all keys.
///
/// Keys are counted as they are queried. Every `clear_frequency` a background thread turns the
/// counts of the passed interval into per-key rates. Each key receives a share of the events
/// the goal rate allows that grows with the logarithm of its count, so rare keys are sampled
/// less aggressively than frequent ones. Budget that rare keys do not use is handed on to the
/// remaining keys.
///
/// Until the first interval with traffic has passed, every key is sampled at the goal rate.
/// Keys that did not occur in the last interval get a rate of `1`.
#[derive(Debug)]
pub struct AvgSampleRate {
    clear_frequency: Duration,
    shared: Arc<Shared>,
    ticker: Mutex<Ticker>,
}

impl AvgSampleRate {
    /// Creates a sampler from its configuration.
    ///
    /// The configuration is validated when the sampler is started.
    pub fn new(config: AvgSampleRateConfig) -> Self {
        Self {
            clear_frequency: config.clear_frequency,
            shared: Arc::new(Shared {
                goal_sample_rate: config.goal_sample_rate,
                counts: Mutex::new(Counts::default()),
            }),
            ticker: Mutex::new(Ticker::Idle),
        }
    }

    /// Recomputes rates from the counts of the current interval immediately.
    ///
    /// The background thread does this every `clear_frequency`.
    pub fn update(&self) {
        self.shared.update();
    }

    /// Stops the background thread and waits for it to exit.
    ///
    /// Rates computed so far stay in effect. The sampler cannot be started again.
    pub fn stop(&self) {
        let ticker = std::mem::replace(&mut *self.ticker.lock(), Ticker::Stopped);
        if let Ticker::Running { shutdown, handle } = ticker {
            drop(shutdown);
            if handle.join().is_err() {
                elbtail_log::error!("sampler thread panicked");
            }
        }
    }
}

impl Sampler for AvgSampleRate {
    fn start(&self) -> Result<(), SamplerError> {
        let mut ticker = self.ticker.lock();
        if !matches!(*ticker, Ticker::Idle) {
            return Err(SamplerError::AlreadyStarted);
        }

        if self.shared.goal_sample_rate < 1 {
            return Err(SamplerError::InvalidGoalRate(self.shared.goal_sample_rate));
        }

        if self.clear_frequency.is_zero() {
            return Err(SamplerError::InvalidClearFrequency);
        }

        let (shutdown, shutdown_rx) = flume::bounded::<()>(0);
        let shared = Arc::clone(&self.shared);
        let clear_frequency = self.clear_frequency;

        let handle = thread::Builder::new()
            .name("elbtail-sampler-ticker".to_owned())
            .spawn(move || {
                while let Err(flume::RecvTimeoutError::Timeout) =
                    shutdown_rx.recv_timeout(clear_frequency)
                {
                    shared.update();
                }
                elbtail_log::debug!("sampler thread stopped");
            })
            .map_err(SamplerError::Spawn)?;

        *ticker = Ticker::Running { shutdown, handle };
        Ok(())
    }

    fn sample_rate(&self, key: &str) -> i64 {
        let mut counts = self.shared.counts.lock();

        match counts.current.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                counts.current.insert(key.to_owned(), 1);
            }
        }

        if !counts.have_data {
            return self.shared.goal_sample_rate;
        }

        counts.saved.get(key).copied().unwrap_or(1)
    }
}

impl Drop for AvgSampleRate {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Computes per-key sample rates from the counts of one interval.
///
/// `counts` must not be empty.
fn compute_rates(counts: &HashMap<String, u64>, goal_sample_rate: i64) -> HashMap<String, i64> {
    let total: f64 = counts.values().map(|&count| count as f64).sum();
    let goal_count = total / goal_sample_rate as f64;
    let log_sum: f64 = counts.values().map(|&count| (count as f64).log10()).sum();
    let goal_ratio = goal_count / log_sum;

    let mut keys: Vec<&String> = counts.keys().collect();
    keys.sort();

    let mut rates = HashMap::with_capacity(keys.len());
    let mut extra = 0.0;
    let num_keys = keys.len();

    for (i, key) in keys.into_iter().enumerate() {
        let count = counts[key] as f64;

        // Each key takes its share of the leftover budget in turn.
        let mut goal_for_key = f64::max(1.0, count.log10() * goal_ratio);
        let share = extra / (num_keys - i) as f64;
        goal_for_key += share;
        extra -= share;

        if goal_for_key.is_nan() {
            rates.insert(key.clone(), 1);
            continue;
        }

        if count <= goal_for_key {
            rates.insert(key.clone(), 1);
            extra += goal_for_key - count;
        } else {
            let rate = (count / goal_for_key).ceil();
            let rate = if rate.is_finite() && rate >= 1.0 {
                rate as i64
            } else {
                1
            };
            rates.insert(key.clone(), rate);
            extra += goal_for_key - count / rate as f64;
        }
    }

    rates
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs
            .iter()
            .map(|(key, count)| ((*key).to_owned(), *count))
            .collect()
    }

    #[test]
    fn test_compute_rates_skewed() {
        let rates = compute_rates(&counts(&[("a", 1000), ("b", 10)]), 10);
        let expected = HashMap::from([("a".to_owned(), 14), ("b".to_owned(), 1)]);
        assert_eq!(rates, expected);
    }

    #[test]
    fn test_compute_rates_leftover_is_handed_out_once() {
        let mut input: Vec<(String, u64)> = (0..10).map(|i| (format!("a{i}"), 2)).collect();
        input.extend((0..3).map(|i| (format!("z{i}"), 10_000)));
        let counts: HashMap<String, u64> = input.into_iter().collect();

        let rates = compute_rates(&counts, 10);

        let large: Vec<i64> = ["z0", "z1", "z2"].iter().map(|key| rates[*key]).collect();
        assert_eq!(large, [11, 10, 10]);
        assert!((0..10).all(|i| rates[&format!("a{i}")] == 1));

        let total: u64 = counts.values().sum();
        let expected_kept: f64 = counts
            .iter()
            .map(|(key, &count)| count as f64 / rates[key] as f64)
            .sum();
        assert!(expected_kept <= total as f64 / 10.0, "expected {expected_kept} kept");
    }

    #[test]
    fn test_compute_rates_single_event() {
        let rates = compute_rates(&counts(&[("only", 1)]), 10);
        assert_eq!(rates.get("only"), Some(&1));
    }

    #[test]
    fn test_compute_rates_all_ones() {
        let rates = compute_rates(&counts(&[("a", 1), ("b", 1), ("c", 1)]), 10);
        assert!(rates.values().all(|&rate| rate == 1));
    }

    #[test]
    fn test_goal_rate_before_first_update() {
        let sampler = AvgSampleRate::new(AvgSampleRateConfig::default());
        assert_eq!(sampler.sample_rate("a"), 10);
        assert_eq!(sampler.sample_rate("b"), 10);
    }

    #[test]
    fn test_rates_after_update() {
        let sampler = AvgSampleRate::new(AvgSampleRateConfig::default());
        for _ in 0..1000 {
            sampler.sample_rate("a");
        }
        for _ in 0..10 {
            sampler.sample_rate("b");
        }

        sampler.update();
        assert_eq!(sampler.sample_rate("a"), 14);
        assert_eq!(sampler.sample_rate("b"), 1);
        assert_eq!(sampler.sample_rate("unknown"), 1);
    }

    #[test]
    fn test_empty_interval_clears_rates() {
        let sampler = AvgSampleRate::new(AvgSampleRateConfig::default());
        for _ in 0..1000 {
            sampler.sample_rate("a");
        }
        sampler.sample_rate("b");
        sampler.update();
        assert_eq!(sampler.shared.counts.lock().saved.len(), 2);

        sampler.update();
        assert!(sampler.shared.counts.lock().saved.is_empty());
        assert_eq!(sampler.sample_rate("a"), 1);
    }

    #[test]
    fn test_start_twice_fails() {
        let sampler = AvgSampleRate::new(AvgSampleRateConfig::default());
        sampler.start().unwrap();
        assert!(matches!(sampler.start(), Err(SamplerError::AlreadyStarted)));
        sampler.stop();
        assert!(matches!(sampler.start(), Err(SamplerError::AlreadyStarted)));
    }

    #[test]
    fn test_invalid_config() {
        let sampler = AvgSampleRate::new(AvgSampleRateConfig {
            goal_sample_rate: 0,
            ..Default::default()
        });
        assert!(matches!(sampler.start(), Err(SamplerError::InvalidGoalRate(0))));

        let sampler = AvgSampleRate::new(AvgSampleRateConfig {
            clear_frequency: Duration::ZERO,
            ..Default::default()
        });
        assert!(matches!(
            sampler.start(),
            Err(SamplerError::InvalidClearFrequency)
        ));
    }

    #[test]
    fn test_ticker_updates_rates() {
        elbtail_log::init_test!();

        let sampler = AvgSampleRate::new(AvgSampleRateConfig {
            goal_sample_rate: 10,
            clear_frequency: Duration::from_millis(20),
        });
        sampler.start().unwrap();

        // Keys never seen before get the goal rate until the first update, then `1`.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut probe = 0;
        while sampler.sample_rate(&format!("probe-{probe}")) == 10 {
            assert!(std::time::Instant::now() < deadline, "rates never updated");
            probe += 1;
            thread::sleep(Duration::from_millis(5));
        }
        sampler.stop();
    }
}
