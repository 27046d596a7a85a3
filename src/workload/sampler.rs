use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of account indices for a single worker.
pub trait IndexSampler {
    /// Returns an index in `0..bound`. `bound` is never zero.
    fn next_index(&mut self, bound: usize) -> usize;
}

/// Uniform sampling with replacement.
pub struct UniformSampler {
    rng: StdRng,
}

impl UniformSampler {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl IndexSampler for UniformSampler {
    fn next_index(&mut self, bound: usize) -> usize {
        self.rng.gen_range(0..bound)
    }
}

impl<F: FnMut(usize) -> usize> IndexSampler for F {
    fn next_index(&mut self, bound: usize) -> usize {
        self(bound)
    }
}
