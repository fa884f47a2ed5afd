use rand::{Rng as _, RngCore, SeedableRng, rngs::StdRng};
use serde::Serialize;

/// Seedable random number generator.
///
/// Wraps StdRng so that verification runs can be replayed from the logged seed.
#[derive(Debug, Serialize)]
pub struct Rng {
    seed: u64,
    #[serde(skip_serializing)]
    rng: StdRng,
}

impl Rng {
    /// Creates a new RNG from a seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The seed this generator was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draws two distinct indices from `0..len`.
    ///
    /// Returns `None` if `len < 2`.
    pub fn distinct_pair(&mut self, len: usize) -> Option<(usize, usize)> {
        if len < 2 {
            return None;
        }
        let a = self.rng.random_range(0..len);
        // draw from the remaining len - 1 slots and skip over `a`
        let mut b = self.rng.random_range(0..len - 1);
        if b >= a {
            b += 1;
        }
        Some((a, b))
    }
}

impl RngCore for Rng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }
}

impl Clone for Rng {
    fn clone(&self) -> Self {
        Self::from_seed(self.seed)
    }
}

#[cfg(test)]
mod tests {
    use crate::util::Rng;
    use rand::RngCore;

    #[test]
    fn test_rng_clone() {
        let mut rng = Rng::from_seed(0x42);
        let a = rng.next_u64();
        let mut cloned_rng = rng.clone();
        let b = cloned_rng.next_u64();
        assert_eq!(a, b, "Cloned Rng should start with the same seed");
    }

    #[test]
    fn test_distinct_pair() {
        let mut rng = Rng::from_seed(7);
        assert_eq!(rng.distinct_pair(0), None);
        assert_eq!(rng.distinct_pair(1), None);
        for _ in 0..1000 {
            let (a, b) = rng.distinct_pair(3).unwrap();
            assert_ne!(a, b);
            assert!(a < 3 && b < 3);
        }
    }
}
