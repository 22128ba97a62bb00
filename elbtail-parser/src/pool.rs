use std::io;
use std::thread;

use elbtail_event::Event;
use elbtail_statsd::metric;

use crate::ElbParser;
use crate::statsd::ParserCounters;

/// A fixed number of parser threads between a line channel and an event channel.
#[derive(Clone, Debug)]
pub struct ParserPool {
    parser: ElbParser,
    num_parsers: usize,
}

impl ParserPool {
    /// Creates a pool running `num_parsers` parser threads.
    ///
    /// At least one parser thread is always started.
    pub fn new(num_parsers: usize) -> Self {
        Self {
            parser: ElbParser::new(),
            num_parsers: num_parsers.max(1),
        }
    }

    /// Returns the number of parser threads this pool runs.
    pub fn num_parsers(&self) -> usize {
        self.num_parsers
    }

    /// Parses lines until the line channel is closed and drained.
    ///
    /// Blocks until every parser thread has exited. The event channel is closed from this side
    /// once this function returns. Lines that cannot be parsed are logged and dropped.
    ///
    /// If not all threads can be spawned, the threads that were started still drain the line
    /// channel before the spawn error is returned.
    pub fn run(
        &self,
        lines: flume::Receiver<String>,
        events: flume::Sender<Event>,
    ) -> io::Result<()> {
        thread::scope(|scope| {
            for id in 0..self.num_parsers {
                let lines = lines.clone();
                let events = events.clone();
                thread::Builder::new()
                    .name(format!("elbtail-parser-{id}"))
                    .spawn_scoped(scope, move || self.work(lines, events))?;
            }

            drop(events);
            Ok(())
        })
    }

    fn work(&self, lines: flume::Receiver<String>, events: flume::Sender<Event>) {
        for line in lines.iter() {
            match self.parser.parse_line(&line) {
                Ok(event) => {
                    metric!(counter(ParserCounters::LinesParsed) += 1);
                    if events.send(event).is_err() {
                        elbtail_log::debug!("event channel closed, stopping parser");
                        break;
                    }
                }
                Err(error) => {
                    metric!(counter(ParserCounters::ParseFailed) += 1);
                    elbtail_log::debug!(
                        error = &error as &dyn std::error::Error,
                        line = %line,
                        "failed to parse line"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn line(elb: &str) -> String {
        format!(
            r#"2015-05-13T23:39:43.945958Z {elb} 1.2.3.4:5 10.0.0.1:80 0.1 0.2 0.3 200 200 0 29 "GET http://x/ HTTP/1.1" "curl" - -"#
        )
    }

    #[test]
    fn test_pool_parses_all_lines() {
        elbtail_log::init_test!();

        let (line_tx, line_rx) = flume::bounded(4);
        let (event_tx, event_rx) = flume::unbounded();
        let pool = ParserPool::new(3);

        thread::scope(|scope| {
            let runner = scope.spawn(|| pool.run(line_rx, event_tx));

            for i in 0..50 {
                line_tx.send(line(&format!("elb-{i}"))).unwrap();
            }
            line_tx.send("garbage".to_owned()).unwrap();
            drop(line_tx);

            runner.join().unwrap().unwrap();
        });

        let names: BTreeSet<_> = event_rx
            .drain()
            .map(|event| event.get("elb").unwrap().to_string())
            .collect();
        let expected: BTreeSet<_> = (0..50).map(|i| format!("elb-{i}")).collect();
        assert_eq!(names, expected);
        assert!(event_rx.is_disconnected());
    }

    #[test]
    fn test_zero_parsers_starts_one() {
        assert_eq!(ParserPool::new(0).num_parsers(), 1);
    }

    #[test]
    fn test_parse_failures_are_counted() {
        let captures = elbtail_statsd::with_capturing_test_client(|| {
            let (line_tx, line_rx) = flume::unbounded();
            let (event_tx, _event_rx) = flume::unbounded();
            line_tx.send("not a log line".to_owned()).unwrap();
            drop(line_tx);
            ParserPool::new(1).work(line_rx, event_tx);
        });
        assert_eq!(captures, ["parser.failed:1|c"]);
    }
}
