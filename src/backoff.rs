//! Randomness used by the stations, and the exponential backoff window.
//!
//! Every random decision in a run goes through a [`RandomSource`], so a run is
//! fully determined by its configuration and the source it was given.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use static_assertions::const_assert;
use std::collections::VecDeque;

/// A frame is given up once this many collisions have been counted for it.
pub const MAX_BACKOFF_ATTEMPTS: u32 = 16;
/// The backoff window stops growing at `2^MAX_BACKOFF_EXPONENT` frame times.
pub const MAX_BACKOFF_EXPONENT: u32 = 10;

const_assert!(MAX_BACKOFF_EXPONENT < MAX_BACKOFF_ATTEMPTS);
const_assert!(MAX_BACKOFF_EXPONENT < 32);

pub trait RandomSource {
    /// Uniform draw from `0..=window`.
    fn backoff_slots(&mut self, window: u64) -> u64;

    /// True with the given probability.
    fn chance(&mut self, probability: f64) -> bool;
}

impl<R: RandomSource + ?Sized> RandomSource for Box<R> {
    fn backoff_slots(&mut self, window: u64) -> u64 {
        (**self).backoff_slots(window)
    }

    fn chance(&mut self, probability: f64) -> bool {
        (**self).chance(probability)
    }
}

/// Number of frame times a station may wait after its `iteration`-th collision.
pub fn backoff_window(iteration: u32) -> u64 {
    1u64 << iteration.min(MAX_BACKOFF_EXPONENT)
}

/// Draw a backoff delay in ticks, in `[0, window * frame_duration]`.
pub fn backoff_delay<R: RandomSource + ?Sized>(iteration: u32, frame_duration: u32, source: &mut R) -> u64 {
    let window = backoff_window(iteration);
    let slots = source.backoff_slots(window).min(window);
    slots * u64::from(frame_duration)
}

/// `ChaCha8` backed source, reproducible from a single seed.
#[derive(Debug, Clone)]
pub struct SeededSource {
    rng: ChaCha8Rng,
    seed: u64,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomSource for SeededSource {
    fn backoff_slots(&mut self, window: u64) -> u64 {
        self.rng.gen_range(0..=window)
    }

    fn chance(&mut self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        self.rng.gen_bool(probability.min(1.0))
    }
}

/// Source that replays a fixed script of backoff draws.
///
/// Once the script runs out every draw returns `fallback`. Draws are clamped
/// to the requested window. `chance` always answers `originate`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    backoff: VecDeque<u64>,
    fallback: u64,
    originate: bool,
}

impl ScriptedSource {
    pub fn new(backoff: impl IntoIterator<Item = u64>, fallback: u64) -> Self {
        Self {
            backoff: backoff.into_iter().collect(),
            fallback,
            originate: false,
        }
    }

    /// Every backoff draw returns `slots`.
    pub fn constant(slots: u64) -> Self {
        Self::new(core::iter::empty(), slots)
    }

    #[must_use]
    pub fn with_origination(mut self, originate: bool) -> Self {
        self.originate = originate;
        self
    }
}

impl RandomSource for ScriptedSource {
    fn backoff_slots(&mut self, window: u64) -> u64 {
        self.backoff.pop_front().unwrap_or(self.fallback).min(window)
    }

    fn chance(&mut self, _probability: f64) -> bool {
        self.originate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_grows_then_clamps() {
        assert_eq!(backoff_window(0), 1);
        assert_eq!(backoff_window(1), 2);
        assert_eq!(backoff_window(5), 32);
        assert_eq!(backoff_window(10), 1024);
        assert_eq!(backoff_window(11), 1024);
        assert_eq!(backoff_window(16), 1024);
    }

    #[test]
    fn test_delay_stays_inside_window() {
        let mut source = SeededSource::new(7);
        for iteration in 0..=16 {
            let upper = backoff_window(iteration) * 160;
            for _ in 0..200 {
                let delay = backoff_delay(iteration, 160, &mut source);
                assert!(delay <= upper, "delay {} above {}", delay, upper);
                assert_eq!(delay % 160, 0);
            }
        }
    }

    #[test]
    fn test_delay_covers_both_ends() {
        let mut source = SeededSource::new(11);
        let draws: Vec<u64> = (0..500).map(|_| backoff_delay(1, 10, &mut source)).collect();
        assert!(draws.contains(&0));
        assert!(draws.contains(&20));
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let mut first = SeededSource::new(42);
        let mut second = SeededSource::new(42);
        for window in [1, 2, 4, 1024] {
            assert_eq!(first.backoff_slots(window), second.backoff_slots(window));
        }
        assert_eq!(first.chance(0.4), second.chance(0.4));
        assert_eq!(first.seed(), 42);
    }

    #[test]
    fn test_chance_edges() {
        let mut source = SeededSource::new(3);
        assert!(!source.chance(0.0));
        assert!(source.chance(1.0));
    }

    #[test]
    fn test_scripted_source_replays_then_falls_back() {
        let mut source = ScriptedSource::new([3, 1], 0);
        assert_eq!(source.backoff_slots(4), 3);
        assert_eq!(source.backoff_slots(4), 1);
        assert_eq!(source.backoff_slots(4), 0);

        let mut clamped = ScriptedSource::constant(99);
        assert_eq!(clamped.backoff_slots(8), 8);
        assert!(!clamped.chance(1.0));
        assert!(clamped.with_origination(true).chance(0.0));
    }
}
