//! Delivery of events to the telemetry backend.
//!
//! The [`EventSink`] trait is the boundary the pipeline sends through. [`HoneycombSink`] is the
//! production implementation: it queues events, groups them into batches and posts the batches
//! from a background thread. There is one sink per process, managed through the [`global`]
//! module.

#![warn(missing_docs)]

mod event;
pub mod global;
mod honeycomb;
mod statsd;

pub use self::event::*;
pub use self::honeycomb::*;

/// Receives presampled events.
///
/// Implementations are shared by all pipelines of the process and must be safe to use from
/// multiple threads at once.
pub trait EventSink: Send + Sync {
    /// Creates an empty event stamped with the current time and a sample rate of `1`.
    fn new_event(&self) -> SinkEvent {
        SinkEvent::new()
    }

    /// Submits an event that has already been sampled at its `sample_rate`.
    ///
    /// Delivery is best effort. An `Ok` result only means that the event was accepted for
    /// delivery.
    fn send_presampled(&self, event: SinkEvent) -> Result<(), SendError>;

    /// Flushes all accepted events and shuts the sink down.
    ///
    /// Blocks until the flush has completed. Calling this more than once has no effect.
    fn close(&self);
}
