use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Random keep or drop decisions for sample rates.
#[derive(Clone, Debug)]
pub struct Dice {
    generator: Pcg32,
}

impl Dice {
    /// Creates dice seeded from the thread-local random number generator.
    pub fn new() -> Self {
        Self {
            generator: Pcg32::from_rng(&mut rand::rng()),
        }
    }

    /// Creates dice with a fixed seed, producing the same decisions on every run.
    pub fn seeded(seed: u64) -> Self {
        Self {
            generator: Pcg32::seed_from_u64(seed),
        }
    }

    /// Returns `true` if an event sampled at `rate` should be kept.
    ///
    /// Draws a uniform integer in `[0, rate)` and keeps on zero. Rates below `2` always keep.
    pub fn keep(&mut self, rate: u64) -> bool {
        if rate <= 1 {
            return true;
        }

        self.generator.random_range(0..rate) == 0
    }
}

impl Default for Dice {
    fn default() -> Self {
        Self::new()
    }
}
