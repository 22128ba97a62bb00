use elbtail_event::Event;
use elbtail_shaper::RequestShaper;
use elbtail_sink::{EventDisplay, EventSink, SendError};
use elbtail_statsd::metric;

use crate::statsd::PublisherCounters;

/// Counts of the deliveries attempted by a [`PublishStage`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishStats {
    /// Events the sink accepted.
    pub sent: u64,
    /// Events the sink refused.
    pub failed: u64,
}

/// Shapes sampled events and hands them to the sink.
pub struct PublishStage<'a> {
    shaper: &'a RequestShaper,
    sink: &'a dyn EventSink,
}

impl<'a> PublishStage<'a> {
    /// Creates a stage shaping with `shaper` and sending to `sink`.
    pub fn new(shaper: &'a RequestShaper, sink: &'a dyn EventSink) -> Self {
        Self { shaper, sink }
    }

    /// Publishes events until the input channel is closed and drained.
    ///
    /// Every event is either accepted by the sink or logged as failed.
    pub fn run(&self, sampled: flume::Receiver<Event>) -> PublishStats {
        let mut stats = PublishStats::default();

        for event in sampled.iter() {
            match self.publish(event) {
                Ok(()) => stats.sent += 1,
                Err(_) => stats.failed += 1,
            }
        }

        stats
    }

    fn publish(&self, mut event: Event) -> Result<(), SendError> {
        if let Err(error) = self.shaper.shape(&mut event) {
            metric!(counter(PublisherCounters::ShapeFailed) += 1);
            elbtail_log::warn!(
                error = &error as &dyn std::error::Error,
                request = ?event.get(self.shaper.field()),
                "failed to shape request"
            );
        }

        let mut sink_event = self.sink.new_event();
        sink_event.timestamp = event.timestamp;
        sink_event.sample_rate = event.sample_rate;

        if let Err(error) = sink_event.add(event.data) {
            metric!(counter(PublisherCounters::FieldRejected) += 1);
            elbtail_log::warn!(
                error = &error as &dyn std::error::Error,
                event = %EventDisplay(&sink_event),
                "failed to add fields to event"
            );
        }

        self.sink.send_presampled(sink_event).inspect_err(|error| {
            let reason = match error {
                SendError::QueueOverflow(_) => "overflow",
                SendError::Closed(_) => "closed",
            };
            metric!(counter(PublisherCounters::SendFailed) += 1, reason = reason);
            elbtail_log::error!(
                error = error as &dyn std::error::Error,
                event = %EventDisplay(error.event()),
                "failed to send event"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use elbtail_event::Value;
    use elbtail_shaper::ShapingConfig;
    use elbtail_test::CapturingSink;
    use similar_asserts::assert_eq;

    use super::*;

    fn shaper() -> RequestShaper {
        RequestShaper::new(&ShapingConfig::default()).unwrap()
    }

    #[test]
    fn test_publish_keeps_timestamp_and_rate() {
        let sink = CapturingSink::new();
        let shaper = shaper();
        let stage = PublishStage::new(&shaper, &sink);

        let timestamp = Utc.with_ymd_and_hms(2015, 5, 13, 23, 39, 43).unwrap();
        let mut event = Event::new(timestamp);
        event.sample_rate = 7;
        event.insert("request", "GET /a/b?x=1 HTTP/1.1");
        stage.publish(event).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, timestamp);
        assert_eq!(events[0].sample_rate, 7);
        assert_eq!(
            events[0].data.get("request_path"),
            Some(&Value::from("/a/b"))
        );
    }

    #[test]
    fn test_shape_failure_still_sends() {
        elbtail_test::setup();

        let sink = CapturingSink::new();
        let shaper = shaper();
        let stage = PublishStage::new(&shaper, &sink);

        let mut event = Event::new(DateTime::UNIX_EPOCH);
        event.insert("request", "- - - ");
        let captures = elbtail_statsd::with_capturing_test_client(|| {
            stage.publish(event).unwrap();
        });
        assert_eq!(captures, ["publisher.shape.failed:1|c"]);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.len(), 1);
    }

    #[test]
    fn test_invalid_fields_are_dropped_but_event_sent() {
        let sink = CapturingSink::new();
        let shaper = shaper();
        let stage = PublishStage::new(&shaper, &sink);

        let mut event = Event::new(DateTime::UNIX_EPOCH);
        event.insert("latency", f64::INFINITY);
        event.insert("elb", "my-elb");
        stage.publish(event).unwrap();

        let events = sink.events();
        assert_eq!(events[0].data.get("latency"), None);
        assert_eq!(events[0].data.get("elb"), Some(&Value::from("my-elb")));
    }

    #[test]
    fn test_run_counts_failures() {
        elbtail_test::setup();

        let sink = CapturingSink::rejecting_every(3);
        let shaper = shaper();
        let (tx, rx) = flume::unbounded();
        for _ in 0..9 {
            tx.send(Event::new(DateTime::UNIX_EPOCH)).unwrap();
        }
        drop(tx);

        let stats = PublishStage::new(&shaper, &sink).run(rx);
        assert_eq!(stats, PublishStats { sent: 6, failed: 3 });
        assert_eq!(sink.rejected(), 3);
    }
}
