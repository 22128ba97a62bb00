use elbtail_statsd::CounterMetric;

/// Counter metrics for the parser workers.
pub enum ParserCounters {
    /// Number of lines turned into events.
    LinesParsed,
    /// Number of lines that did not match the access log grammar and were dropped.
    ParseFailed,
    /// Number of events whose timestamp was missing or invalid and was replaced by the current
    /// time.
    TimestampFallback,
}

impl CounterMetric for ParserCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::LinesParsed => "parser.lines_parsed",
            Self::ParseFailed => "parser.failed",
            Self::TimestampFallback => "parser.timestamp_fallback",
        }
    }
}
