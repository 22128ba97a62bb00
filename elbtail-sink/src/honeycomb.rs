use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use elbtail_statsd::metric;
use parking_lot::{Mutex, RwLock};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::statsd::{SinkCounters, SinkGauges, SinkTimers};
use crate::{EventDisplay, EventSink, SendError, SinkEvent};

/// Header carrying the write key.
const WRITE_KEY_HEADER: &str = "X-Honeycomb-Team";

/// Controls the delivery of events to Honeycomb.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HoneycombConfig {
    /// Base URL of the API.
    pub api_host: String,
    /// The key that authorizes writes to the dataset.
    pub write_key: String,
    /// The dataset events are written to.
    pub dataset: String,
    /// Maximum number of events in one batch.
    pub max_batch_size: usize,
    /// Maximum time in milliseconds events wait before their batch is sent.
    pub send_frequency_ms: u64,
    /// Number of events that can wait for delivery before new events are dropped.
    pub pending_capacity: usize,
    /// Wait for room in the pending queue instead of dropping events.
    pub block_on_send: bool,
    /// Timeout in seconds for one batch request.
    pub timeout_secs: u64,
}

impl HoneycombConfig {
    /// Returns the maximum time events wait before their batch is sent.
    pub fn send_frequency(&self) -> Duration {
        Duration::from_millis(self.send_frequency_ms)
    }

    /// Returns the timeout for one batch request.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the URL batches are posted to.
    pub fn batch_url(&self) -> Result<Url, SinkError> {
        let mut url = Url::parse(&self.api_host)
            .map_err(|_| SinkError::InvalidApiHost(self.api_host.clone()))?;

        url.path_segments_mut()
            .map_err(|_| SinkError::InvalidApiHost(self.api_host.clone()))?
            .pop_if_empty()
            .extend(["1", "batch", &self.dataset]);

        Ok(url)
    }
}

impl Default for HoneycombConfig {
    fn default() -> Self {
        Self {
            api_host: "https://api.honeycomb.io/".to_owned(),
            write_key: String::new(),
            dataset: String::new(),
            max_batch_size: 500,
            send_frequency_ms: 100,
            pending_capacity: 10_000,
            block_on_send: false,
            timeout_secs: 10,
        }
    }
}

/// An error returned when the sink cannot be created.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// No write key is configured.
    #[error("missing write key")]
    MissingWriteKey,
    /// No dataset is configured.
    #[error("missing dataset")]
    MissingDataset,
    /// The API host is not a valid base URL.
    #[error("invalid api host {0:?}")]
    InvalidApiHost(String),
    /// The HTTP client could not be created.
    #[error("failed to create http client")]
    Client(#[source] reqwest::Error),
    /// The transmission thread could not be spawned.
    #[error("failed to spawn transmission thread")]
    Spawn(#[source] io::Error),
}

/// Per-event result of a batch request.
#[derive(Debug, Deserialize)]
struct BatchResponse {
    status: u16,
    #[serde(default)]
    error: Option<String>,
}

/// Posts batches of events from a background thread.
struct Transmission {
    client: Client,
    url: Url,
    write_key: String,
    max_batch_size: usize,
    send_frequency: Duration,
}

impl Transmission {
    fn run(self, events: flume::Receiver<SinkEvent>) {
        let mut batch = Vec::with_capacity(self.max_batch_size);
        let mut deadline = Instant::now() + self.send_frequency;

        loop {
            match events.recv_deadline(deadline) {
                Ok(event) => {
                    batch.push(event);
                    if batch.len() >= self.max_batch_size {
                        self.flush(&mut batch);
                        deadline = Instant::now() + self.send_frequency;
                    }
                }
                Err(flume::RecvTimeoutError::Timeout) => {
                    self.flush(&mut batch);
                    deadline = Instant::now() + self.send_frequency;
                }
                Err(flume::RecvTimeoutError::Disconnected) => {
                    self.flush(&mut batch);
                    break;
                }
            }
        }

        elbtail_log::debug!("transmission thread stopped");
    }

    fn flush(&self, batch: &mut Vec<SinkEvent>) {
        if batch.is_empty() {
            return;
        }

        metric!(gauge(SinkGauges::BatchSize) = batch.len() as u64);
        metric!(timer(SinkTimers::BatchDuration), {
            self.send_batch(batch);
        });
        batch.clear();
    }

    fn send_batch(&self, batch: &[SinkEvent]) {
        let body = match serde_json::to_vec(batch) {
            Ok(body) => body,
            Err(error) => {
                metric!(counter(SinkCounters::BatchFailed) += 1, reason = "serialize");
                elbtail_log::error!(
                    error = &error as &dyn std::error::Error,
                    events = batch.len(),
                    "failed to serialize batch"
                );
                return;
            }
        };

        let response = self
            .client
            .post(self.url.clone())
            .header(WRITE_KEY_HEADER, &self.write_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send();

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                metric!(counter(SinkCounters::BatchFailed) += 1, reason = "request");
                elbtail_log::error!(
                    error = &error as &dyn std::error::Error,
                    events = batch.len(),
                    "failed to send batch"
                );
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            metric!(counter(SinkCounters::BatchFailed) += 1, reason = "status");
            elbtail_log::error!(
                status = status.as_u16(),
                events = batch.len(),
                "backend rejected batch"
            );
            return;
        }

        let results: Vec<BatchResponse> = match response.json() {
            Ok(results) => results,
            Err(error) => {
                elbtail_log::warn!(
                    error = &error as &dyn std::error::Error,
                    "failed to read batch response"
                );
                return;
            }
        };

        let mut accepted: i64 = 0;
        for (event, result) in batch.iter().zip(results) {
            if (200..300).contains(&result.status) {
                accepted += 1;
                continue;
            }

            metric!(counter(SinkCounters::EventsRejected) += 1);
            elbtail_log::warn!(
                status = result.status,
                error = result.error.as_deref().unwrap_or_default(),
                event = %EventDisplay(event),
                "backend rejected event"
            );
        }
        metric!(counter(SinkCounters::EventsAccepted) += accepted);
    }
}

/// Puts an event into the pending queue.
fn enqueue(
    sender: &flume::Sender<SinkEvent>,
    event: SinkEvent,
    block: bool,
) -> Result<(), SendError> {
    if block {
        return sender
            .send(event)
            .map_err(|error| SendError::Closed(Box::new(error.into_inner())));
    }

    sender.try_send(event).map_err(|error| match error {
        flume::TrySendError::Full(event) => {
            metric!(counter(SinkCounters::QueueOverflow) += 1);
            SendError::QueueOverflow(Box::new(event))
        }
        flume::TrySendError::Disconnected(event) => SendError::Closed(Box::new(event)),
    })
}

/// Sends events to the Honeycomb batch API.
///
/// Events are put into a bounded pending queue. A background thread takes them from the queue
/// and posts them in batches of up to `max_batch_size` events, or whatever has accumulated after
/// `send_frequency`. Failures are logged, events are never retried.
pub struct HoneycombSink {
    sender: RwLock<Option<flume::Sender<SinkEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    block_on_send: bool,
}

impl HoneycombSink {
    /// Creates the sink and starts its transmission thread.
    pub fn new(config: &HoneycombConfig) -> Result<Self, SinkError> {
        if config.write_key.is_empty() {
            return Err(SinkError::MissingWriteKey);
        }

        if config.dataset.is_empty() {
            return Err(SinkError::MissingDataset);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(SinkError::Client)?;

        let transmission = Transmission {
            client,
            url: config.batch_url()?,
            write_key: config.write_key.clone(),
            max_batch_size: config.max_batch_size.max(1),
            send_frequency: config.send_frequency(),
        };

        let (sender, receiver) = flume::bounded(config.pending_capacity.max(1));
        let worker = thread::Builder::new()
            .name("elbtail-transmission".to_owned())
            .spawn(move || transmission.run(receiver))
            .map_err(SinkError::Spawn)?;

        elbtail_log::info!(
            dataset = %config.dataset,
            api_host = %config.api_host,
            "sending events to honeycomb"
        );

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            block_on_send: config.block_on_send,
        })
    }
}

impl EventSink for HoneycombSink {
    fn send_presampled(&self, event: SinkEvent) -> Result<(), SendError> {
        match self.sender.read().as_ref() {
            Some(sender) => enqueue(sender, event, self.block_on_send),
            None => Err(SendError::Closed(Box::new(event))),
        }
    }

    fn close(&self) {
        // Dropping the sender lets the transmission thread drain the queue and exit.
        drop(self.sender.write().take());

        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        if worker.join().is_err() {
            elbtail_log::error!("transmission thread panicked");
        }
    }
}

impl Drop for HoneycombSink {
    fn drop(&mut self) {
        self.close();
    }
}
