//! Helpers for testing the pipeline.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output is
//!    captured by the test runner. All logs emitted with [`elbtail_log`] will show up for test
//!    failures or when run with `--nocapture`.
//!  - Use [`CapturingSink`] and [`FixedSampler`] in place of the production collaborators.
//!
//! # Example
//!
//! ```no_run
//! #[test]
//! fn my_test() {
//!     elbtail_test::setup();
//!
//!     elbtail_log::debug!("hello, world!");
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use elbtail_sampling::{Sampler, SamplerError};
use elbtail_sink::{EventSink, SendError, SinkEvent};
use parking_lot::Mutex;

/// Setup the test environment.
///
///  - Initializes logs: The logger captures logs from all crates of the workspace and mutes all
///    other logs.
pub fn setup() {
    elbtail_log::__init_test("elbtail");
}

/// Builds an access log line with the given load balancer name, status codes and request.
///
/// Status codes are rendered as given, so `"-"` produces a missing value.
pub fn elb_line(elb: &str, elb_status: &str, backend_status: &str, request: &str) -> String {
    format!(
        r#"2015-05-13T23:39:43.945958Z {elb} 192.168.131.39:2817 10.0.0.1:80 0.000073 0.001048 0.000057 {elb_status} {backend_status} 0 29 "{request}" "curl/7.38.0" - -"#
    )
}

/// A sink that records all events in memory.
#[derive(Debug, Default)]
pub struct CapturingSink {
    events: Mutex<Vec<SinkEvent>>,
    reject_every: Option<usize>,
    attempts: AtomicUsize,
    rejected: AtomicUsize,
    closes: AtomicUsize,
    closed: AtomicBool,
}

impl CapturingSink {
    /// Creates a sink that accepts every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that rejects every `n`-th event with a queue overflow.
    pub fn rejecting_every(n: usize) -> Self {
        Self {
            reject_every: Some(n.max(1)),
            ..Self::default()
        }
    }

    /// Returns a copy of all accepted events.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    /// Returns the number of events that were rejected.
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Returns the number of events submitted, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Returns how often [`EventSink::close`] was called.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl EventSink for CapturingSink {
    fn send_presampled(&self, event: SinkEvent) -> Result<(), SendError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if self.closed.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(SendError::Closed(Box::new(event)));
        }

        if self.reject_every.is_some_and(|n| attempt % n == 0) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(SendError::QueueOverflow(Box::new(event)));
        }

        self.events.lock().push(event);
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A sampler that returns the same rate for every key.
#[derive(Debug, Default)]
pub struct FixedSampler {
    rate: i64,
    fail_start: bool,
    keys: Mutex<Vec<String>>,
    starts: AtomicUsize,
}

impl FixedSampler {
    /// Creates a sampler that always returns `rate`.
    ///
    /// Any value is allowed, including zero and negative rates.
    pub fn new(rate: i64) -> Self {
        Self {
            rate,
            ..Self::default()
        }
    }

    /// Creates a sampler whose [`Sampler::start`] always fails.
    pub fn failing_start(rate: i64) -> Self {
        Self {
            rate,
            fail_start: true,
            ..Self::default()
        }
    }

    /// Returns all keys the sampler was queried with, in query order.
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().clone()
    }

    /// Returns how often [`Sampler::start`] was called.
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl Sampler for FixedSampler {
    fn start(&self) -> Result<(), SamplerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(SamplerError::AlreadyStarted);
        }
        Ok(())
    }

    fn sample_rate(&self, key: &str) -> i64 {
        self.keys.lock().push(key.to_owned());
        self.rate
    }
}
