//! Sampling for elbtail.
//!
//! Every event is assigned a sampling key by [`sample_key`]. A [`Sampler`] maps keys to sample
//! rates: a rate of `N` means one in `N` events with that key is kept. The production sampler is
//! [`AvgSampleRate`], which adapts the rates to the traffic seen in the previous interval so that
//! the overall rate approaches a goal while rare keys are kept more often than frequent ones.
//!
//! The keep or drop decision itself is made with a [`Dice`].

#![warn(missing_docs)]

mod avg;
mod dice;
mod key;
mod statsd;

pub use self::avg::*;
pub use self::dice::*;
pub use self::key::*;

/// An error returned when a sampler cannot be started.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// The sampler was started before.
    #[error("sampler was already started")]
    AlreadyStarted,
    /// The goal sample rate is below `1`.
    #[error("goal sample rate must be at least 1, got {0}")]
    InvalidGoalRate(i64),
    /// The interval between two rate computations is zero.
    #[error("clear frequency must be greater than zero")]
    InvalidClearFrequency,
    /// The background thread could not be spawned.
    #[error("failed to spawn sampler thread")]
    Spawn(#[source] std::io::Error),
}

/// Assigns sample rates to sampling keys.
///
/// Implementations are shared between threads and must track their own state internally.
pub trait Sampler: Send + Sync {
    /// Starts background work of the sampler.
    ///
    /// Must be called once before the sampler is queried. Failing to start leaves the sampler
    /// usable with whatever rates it returns without background updates.
    fn start(&self) -> Result<(), SamplerError>;

    /// Returns the sample rate for the given key and records that the key was seen.
    ///
    /// Well behaved samplers return rates of `1` or more. Callers must not trust that.
    fn sample_rate(&self, key: &str) -> i64;
}

impl<S: Sampler + ?Sized> Sampler for std::sync::Arc<S> {
    fn start(&self) -> Result<(), SamplerError> {
        (**self).start()
    }

    fn sample_rate(&self, key: &str) -> i64 {
        (**self).sample_rate(key)
    }
}
