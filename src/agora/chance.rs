//! Injectable randomness for the orchestrator's probabilistic decisions.
//!
//! Speak/stay-silent selection, response-style tiers, bubble splitting and
//! pacing jitter all draw through [`Chance`] instead of a global RNG, so
//! tests can pin a seed and assert exact branch selection where statistical
//! bounds would otherwise be the only option.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A uniform random source. `roll` returns a draw in `[0, 1)`.
pub trait Chance: Send + Sync {
    fn roll(&mut self) -> f64;

    /// Uniform draw in `[lo, hi)`.
    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.roll() * (hi - lo)
    }
}

/// Deterministic [`Chance`] backed by a seeded [`StdRng`].
pub struct SeededChance {
    rng: StdRng,
}

impl SeededChance {
    pub fn new(seed: u64) -> Self {
        SeededChance {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Chance for SeededChance {
    fn roll(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Non-deterministic [`Chance`] backed by the thread-local RNG. The default
/// outside of tests.
pub struct ThreadChance;

impl Chance for ThreadChance {
    fn roll(&mut self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_chance_is_reproducible() {
        let mut a = SeededChance::new(7);
        let mut b = SeededChance::new(7);
        for _ in 0..32 {
            assert_eq!(a.roll().to_bits(), b.roll().to_bits());
        }
    }

    #[test]
    fn rolls_stay_in_unit_interval() {
        let mut chance = SeededChance::new(99);
        for _ in 0..1000 {
            let r = chance.roll();
            assert!((0.0..1.0).contains(&r));
        }
    }

    #[test]
    fn range_respects_bounds() {
        let mut chance = SeededChance::new(3);
        for _ in 0..1000 {
            let r = chance.range(2.0, 6.0);
            assert!((2.0..6.0).contains(&r));
        }
    }
}
