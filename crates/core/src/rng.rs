use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

#[derive(Debug, Clone)]
pub struct RngState {
    seed: u64,
    rng: StdRng,
}

impl RngState {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded from OS entropy; the seed is kept so a session can be replayed.
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::thread_rng().next_u64())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform index in `[0, len)`; `None` for an empty range.
    pub fn index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.rng.gen_range(0..len))
    }

    pub fn lowercase_letter(&mut self) -> char {
        let offset = self.rng.gen_range(0..26u8);
        char::from(b'a' + offset)
    }
}
