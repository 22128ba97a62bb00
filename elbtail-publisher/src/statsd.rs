use elbtail_statsd::{CounterMetric, TimerMetric};

pub enum PublisherCounters {
    /// Number of non-empty lines read from the input.
    LinesScanned,
    /// Number of empty lines skipped.
    LinesSkipped,
    /// Number of lines skipped for exceeding the maximum line length.
    LinesTooLong,
    /// Number of sampling decisions.
    ///
    /// This metric is tagged with:
    ///  - `decision`: Either `"keep"` or `"drop"`.
    SampleDecision,
    /// Number of times the sampler returned a rate below `1`.
    SamplerViolation,
    /// Number of events whose request line could not be shaped.
    ShapeFailed,
    /// Number of events with fields the sink did not accept.
    FieldRejected,
    /// Number of events the sink did not accept for delivery.
    ///
    /// This metric is tagged with:
    ///  - `reason`: Either `"overflow"` or `"closed"`.
    SendFailed,
}

impl CounterMetric for PublisherCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::LinesScanned => "publisher.lines.scanned",
            Self::LinesSkipped => "publisher.lines.skipped",
            Self::LinesTooLong => "publisher.lines.too_long",
            Self::SampleDecision => "publisher.sampling.decision",
            Self::SamplerViolation => "publisher.sampling.violation",
            Self::ShapeFailed => "publisher.shape.failed",
            Self::FieldRejected => "publisher.fields.rejected",
            Self::SendFailed => "publisher.send.failed",
        }
    }
}

pub enum PublisherTimers {
    /// Total time to publish one input, from the first read until the pipeline has drained.
    Publish,
}

impl TimerMetric for PublisherTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::Publish => "publisher.publish.duration",
        }
    }
}
