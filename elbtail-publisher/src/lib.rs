//! The access log pipeline.
//!
//! A [`Publisher`] reads access log text, parses every line into an event, samples events with
//! an adaptive sampler, decomposes the request line of kept events and hands them to a sink. All
//! stages run concurrently and are connected by bounded channels, so a slow stage throttles the
//! stages before it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use elbtail_publisher::{Publisher, PublisherConfig};
//! use elbtail_sampling::{AvgSampleRate, AvgSampleRateConfig};
//! use elbtail_shaper::ShapingConfig;
//! use elbtail_sink::{HoneycombConfig, global};
//!
//! let sink = global::ensure_initialized(&HoneycombConfig {
//!     write_key: "secret".to_owned(),
//!     dataset: "elb-logs".to_owned(),
//!     ..Default::default()
//! })?;
//!
//! let publisher = Publisher::new(
//!     PublisherConfig::default(),
//!     &ShapingConfig::default(),
//!     Box::new(AvgSampleRate::new(AvgSampleRateConfig::default())),
//!     sink,
//! )?;
//!
//! publisher.publish(std::io::stdin().lock())?;
//! global::close();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

mod pipeline;
mod publish;
mod sampling;
mod scanner;
mod statsd;

pub use self::pipeline::*;
pub use self::publish::*;
pub use self::sampling::*;
pub use self::scanner::*;

use std::io;

use elbtail_shaper::ShapeError;

/// An error that ends a publish operation.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Reading the input failed.
    #[error("failed to read input")]
    Read(#[source] io::Error),
    /// A pipeline thread could not be spawned.
    #[error("failed to spawn pipeline thread")]
    Spawn(#[source] io::Error),
    /// All parser threads stopped before the input was consumed.
    #[error("pipeline stopped before the input was consumed")]
    PipelineClosed,
    /// The shaping configuration is invalid.
    #[error("invalid shaping configuration")]
    Shaper(#[from] ShapeError),
}
