use std::io::Read;
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};

use elbtail_parser::ParserPool;
use elbtail_sampling::{Dice, Sampler};
use elbtail_shaper::{RequestShaper, ShapingConfig};
use elbtail_sink::EventSink;
use elbtail_statsd::metric;
use serde::{Deserialize, Serialize};

use crate::statsd::PublisherTimers;
use crate::{
    DEFAULT_MAX_LINE_LENGTH, LineScanner, PublishError, PublishStage, PublishStats, SamplingStage,
    SamplingStats,
};

/// Controls the parallelism and buffering of the pipeline.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PublisherConfig {
    /// Number of parser threads.
    pub num_parsers: usize,
    /// Capacity of each channel between two stages.
    pub channel_capacity: usize,
    /// Longest accepted input line in bytes. Longer lines are skipped.
    pub max_line_length: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            num_parsers: cpus,
            channel_capacity: cpus,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Totals of one [`Publisher::publish`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Non-empty lines read from the input.
    pub lines: u64,
    /// Events kept by the sampler.
    pub kept: u64,
    /// Events dropped by the sampler.
    pub dropped: u64,
    /// Kept events the sink accepted.
    pub sent: u64,
    /// Kept events the sink refused.
    pub failed: u64,
}

impl PublishSummary {
    /// Returns the number of lines that did not produce an event.
    pub fn unparsed(&self) -> u64 {
        self.lines.saturating_sub(self.kept + self.dropped)
    }
}

/// Publishes access logs to a sink.
///
/// Every call to [`publish`](Self::publish) runs a pipeline of concurrent stages connected by
/// bounded channels:
///
/// ```text
/// input -> scanner -> [lines] -> parsers -> [events] -> sampler -> [sampled] -> publisher -> sink
/// ```
///
/// The scanner runs on the calling thread. Parsing runs on `num_parsers` threads, sampling and
/// publishing on one thread each. Events are not ordered across parser threads.
pub struct Publisher {
    config: PublisherConfig,
    parsers: ParserPool,
    shaper: RequestShaper,
    sampler: Box<dyn Sampler>,
    sink: Arc<dyn EventSink>,
    seed: Option<u64>,
}

impl Publisher {
    /// Creates a publisher and starts its sampler.
    ///
    /// A sampler that fails to start is logged and used regardless.
    pub fn new(
        config: PublisherConfig,
        shaping: &ShapingConfig,
        sampler: Box<dyn Sampler>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, PublishError> {
        let shaper = RequestShaper::new(shaping)?;

        if let Err(error) = sampler.start() {
            elbtail_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to start sampler"
            );
        }

        Ok(Self {
            parsers: ParserPool::new(config.num_parsers),
            config,
            shaper,
            sampler,
            sink,
            seed: None,
        })
    }

    /// Makes sampling decisions reproducible by seeding the random number generator.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Publishes all lines of the input.
    ///
    /// Blocks until the input is exhausted and every event has passed through all stages. A read
    /// error stops the scan, but events already read are still published before the error is
    /// returned. Events that cannot be parsed, shaped or sent are logged and skipped.
    pub fn publish<R: Read>(&self, input: R) -> Result<PublishSummary, PublishError> {
        let summary = metric!(timer(PublisherTimers::Publish), {
            thread::scope(|scope| self.run(scope, input))
        })?;

        elbtail_log::debug!(
            lines = summary.lines,
            kept = summary.kept,
            dropped = summary.dropped,
            sent = summary.sent,
            failed = summary.failed,
            "finished publishing input"
        );

        Ok(summary)
    }

    fn run<'scope, 'env, R: Read>(
        &'env self,
        scope: &'scope thread::Scope<'scope, 'env>,
        input: R,
    ) -> Result<PublishSummary, PublishError> {
        let capacity = self.config.channel_capacity.max(1);
        let (line_tx, line_rx) = flume::bounded(capacity);
        let (event_tx, event_rx) = flume::bounded(capacity);
        let (sampled_tx, sampled_rx) = flume::bounded(capacity);

        let dice = match self.seed {
            Some(seed) => Dice::seeded(seed),
            None => Dice::new(),
        };

        let parsers = thread::Builder::new()
            .name("elbtail-parsers".to_owned())
            .spawn_scoped(scope, move || self.parsers.run(line_rx, event_tx))
            .map_err(PublishError::Spawn)?;

        let sampler = thread::Builder::new()
            .name("elbtail-sampler".to_owned())
            .spawn_scoped(scope, move || {
                SamplingStage::new(&*self.sampler, dice).run(event_rx, sampled_tx)
            })
            .map_err(PublishError::Spawn)?;

        let publisher = thread::Builder::new()
            .name("elbtail-publisher".to_owned())
            .spawn_scoped(scope, move || {
                PublishStage::new(&self.shaper, &*self.sink).run(sampled_rx)
            })
            .map_err(PublishError::Spawn)?;

        let scanned = LineScanner::new(input, self.config.max_line_length).forward(&line_tx);

        // Closing the line channel lets every stage drain and exit in turn.
        drop(line_tx);
        let parsed = join(parsers);
        let SamplingStats { kept, dropped } = join(sampler);
        let PublishStats { sent, failed } = join(publisher);

        parsed.map_err(PublishError::Spawn)?;
        let lines = scanned?;

        Ok(PublishSummary {
            lines,
            kept,
            dropped,
            sent,
            failed,
        })
    }
}

fn join<T>(handle: ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}
