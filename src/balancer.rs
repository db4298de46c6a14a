//! Lane selection for dispatch.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Which lane gets the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Rotate through lanes regardless of load.
    RoundRobin,
    /// Prefer a lane with no calls in flight; fall back to rotation when
    /// every lane is busy.
    FirstIdle,
    /// Uniform random lane.
    Random,
    /// Prefer an idle lane; pick at random when every lane is busy.
    FirstIdleOrRandom,
}

pub struct Balancer {
    strategy: Strategy,
    cursor: usize,
    rng: SmallRng,
}

impl Balancer {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            cursor: 0,
            rng: SmallRng::from_entropy(),
        }
    }

    #[inline]
    fn rotate(&mut self, lanes: usize) -> usize {
        let at = self.cursor % lanes;
        self.cursor = (self.cursor + 1) % lanes;
        at
    }

    /// Pick a lane. `idle[i]` is true when lane `i` has nothing in flight.
    pub fn pick(&mut self, idle: &[bool]) -> usize {
        let lanes = idle.len();
        debug_assert!(lanes > 0);
        match self.strategy {
            Strategy::RoundRobin => self.rotate(lanes),
            Strategy::FirstIdle => match idle.iter().position(|&b| b) {
                Some(at) => at,
                None => self.rotate(lanes),
            },
            Strategy::Random => self.rng.gen_range(0..lanes),
            Strategy::FirstIdleOrRandom => match idle.iter().position(|&b| b) {
                Some(at) => at,
                None => self.rng.gen_range(0..lanes),
            },
        }
    }
}
