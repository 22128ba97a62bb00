use elbtail_statsd::{CounterMetric, GaugeMetric, TimerMetric};

pub enum SinkCounters {
    /// Number of events the backend accepted.
    EventsAccepted,
    /// Number of events the backend rejected individually.
    EventsRejected,
    /// Number of events dropped because the pending queue was full.
    QueueOverflow,
    /// Number of batches that could not be delivered at all.
    ///
    /// This metric is tagged with:
    ///  - `reason`: Either `"serialize"`, `"request"` or `"status"`.
    BatchFailed,
}

impl CounterMetric for SinkCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::EventsAccepted => "sink.events.accepted",
            Self::EventsRejected => "sink.events.rejected",
            Self::QueueOverflow => "sink.queue_overflow",
            Self::BatchFailed => "sink.batch.failed",
        }
    }
}

pub enum SinkGauges {
    /// Number of events in the last batch sent.
    BatchSize,
}

impl GaugeMetric for SinkGauges {
    fn name(&self) -> &'static str {
        match self {
            Self::BatchSize => "sink.batch.size",
        }
    }
}

pub enum SinkTimers {
    /// Time it takes to post one batch, including the response.
    BatchDuration,
}

impl TimerMetric for SinkTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::BatchDuration => "sink.batch.duration",
        }
    }
}
