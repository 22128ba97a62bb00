use elbtail_event::Event;
use elbtail_sampling::{Dice, Sampler, sample_key};
use elbtail_statsd::metric;

use crate::statsd::PublisherCounters;

/// Counts of the decisions taken by a [`SamplingStage`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplingStats {
    /// Events forwarded to the next stage.
    pub kept: u64,
    /// Events discarded.
    pub dropped: u64,
}

/// Keeps or drops events according to the rates of a [`Sampler`].
pub struct SamplingStage<'a> {
    sampler: &'a dyn Sampler,
    dice: Dice,
}

impl<'a> SamplingStage<'a> {
    /// Creates a stage that queries `sampler` and decides with `dice`.
    pub fn new(sampler: &'a dyn Sampler, dice: Dice) -> Self {
        Self { sampler, dice }
    }

    /// Samples events until the input channel is closed and drained.
    ///
    /// Kept events carry their sample rate and are sent to `sampled`.
    pub fn run(
        mut self,
        events: flume::Receiver<Event>,
        sampled: flume::Sender<Event>,
    ) -> SamplingStats {
        let mut stats = SamplingStats::default();

        for event in events.iter() {
            let Some(event) = self.sample(event) else {
                stats.dropped += 1;
                continue;
            };

            if sampled.send(event).is_err() {
                elbtail_log::error!("publish stage stopped, discarding sampled events");
                break;
            }
            stats.kept += 1;
        }

        stats
    }

    /// Returns the event annotated with its rate if it is kept.
    fn sample(&mut self, mut event: Event) -> Option<Event> {
        let key = sample_key(&event);
        let rate = self.rate(&key);

        if !self.dice.keep(rate) {
            metric!(counter(PublisherCounters::SampleDecision) += 1, decision = "drop");
            return None;
        }

        metric!(counter(PublisherCounters::SampleDecision) += 1, decision = "keep");
        event.sample_rate = rate;
        Some(event)
    }

    /// Queries the sampler, substituting `1` for rates below `1`.
    fn rate(&self, key: &str) -> u64 {
        let rate = self.sampler.sample_rate(key);
        if rate > 0 {
            return rate as u64;
        }

        metric!(counter(PublisherCounters::SamplerViolation) += 1);
        elbtail_log::error!(key, rate, "sampler returned a rate below 1, using 1 instead");
        1
    }
}
