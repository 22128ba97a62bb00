use elbtail_statsd::{CounterMetric, GaugeMetric};

pub enum SamplingCounters {
    /// Number of times the per-key rates were recomputed.
    RatesComputed,
    /// Number of intervals without any traffic, which reset all rates.
    RatesCleared,
}

impl CounterMetric for SamplingCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::RatesComputed => "sampling.rates_computed",
            Self::RatesCleared => "sampling.rates_cleared",
        }
    }
}

pub enum SamplingGauges {
    /// Number of distinct sampling keys seen in the last interval.
    ActiveKeys,
}

impl GaugeMetric for SamplingGauges {
    fn name(&self) -> &'static str {
        match self {
            Self::ActiveKeys => "sampling.active_keys",
        }
    }
}
