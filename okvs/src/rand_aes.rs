//! AES-based random number generator.

use crate::{Aes128, Block};
use rand::{CryptoRng, Error, Rng, RngCore, SeedableRng};
use rand_core::block::{BlockRng64, BlockRngCore};

/// Implementation of a random number generator based on keyed AES in counter
/// mode, with the counter starting at zero.
#[derive(Clone)]
pub struct AesRng(BlockRng64<AesRngCore>);

impl RngCore for AesRng {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }
    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }
    #[inline]
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }
    #[inline]
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.0.try_fill_bytes(dest)
    }
}

impl SeedableRng for AesRng {
    type Seed = <AesRngCore as SeedableRng>::Seed;

    #[inline]
    fn from_seed(seed: Self::Seed) -> Self {
        AesRng(BlockRng64::<AesRngCore>::from_seed(seed))
    }
    #[inline]
    fn from_rng<R: RngCore>(rng: R) -> Result<Self, Error> {
        BlockRng64::<AesRngCore>::from_rng(rng).map(AesRng)
    }
}

impl CryptoRng for AesRng {}

impl AesRng {
    /// Create a new random number generator using a random seed from
    /// `rand::random`.
    #[inline]
    pub fn new() -> Self {
        let seed = rand::random::<Block>();
        AesRng::from_seed(seed)
    }

    /// Create a new RNG using a random seed from this one.
    #[inline]
    pub fn fork(&mut self) -> Self {
        let seed = self.gen::<Block>();
        AesRng::from_seed(seed)
    }
}

impl Default for AesRng {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// The core of `AesRng`, used with `BlockRng64`.
#[derive(Clone)]
pub struct AesRngCore {
    aes: Aes128,
    // A u64 counter never wraps in practice; 2^64 blocks is 256 exabytes.
    counter: u64,
}

impl BlockRngCore for AesRngCore {
    type Item = u64;
    type Results = [u64; 16];

    // Compute `E(counter)` eight blocks at a time.
    #[inline]
    fn generate(&mut self, results: &mut Self::Results) {
        let mut inputs = [Block::ZERO; 8];
        for b in inputs.iter_mut() {
            *b = Block::from(self.counter);
            self.counter += 1;
        }
        let mut outputs = [Block::ZERO; 8];
        self.aes.encrypt_blocks(&inputs, &mut outputs);
        for (i, b) in outputs.iter().enumerate() {
            results[2 * i] = b.get_u64(0);
            results[2 * i + 1] = b.get_u64(1);
        }
    }
}

impl SeedableRng for AesRngCore {
    type Seed = Block;

    #[inline]
    fn from_seed(seed: Self::Seed) -> Self {
        AesRngCore {
            aes: Aes128::new(seed),
            counter: 0,
        }
    }
}

impl CryptoRng for AesRngCore {}

impl From<AesRngCore> for AesRng {
    #[inline]
    fn from(core: AesRngCore) -> Self {
        AesRng(BlockRng64::new(core))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_generate() {
        let mut rng = AesRng::new();
        let a = rng.gen::<[Block; 8]>();
        let b = rng.gen::<[Block; 8]>();
        assert_ne!(a, b);
    }

    #[test]
    fn test_deterministic_from_seed() {
        let seed = Block::from(0x1234_5678u64);
        let mut r0 = AesRng::from_seed(seed);
        let mut r1 = AesRng::from_seed(seed);
        assert_eq!(r0.gen::<[Block; 4]>(), r1.gen::<[Block; 4]>());
    }

    #[test]
    fn test_fork_diverges() {
        let mut rng = AesRng::from_seed(Block::from(9u64));
        let mut a = rng.fork();
        let mut b = rng.fork();
        assert_ne!(a.gen::<Block>(), b.gen::<Block>());
    }
}
