//! The value algebra the solver is generic over.

use crate::Block;
use rand_core::RngCore;

/// Values an oblivious key-value store can hold.
///
/// The algebra is an XOR-like abelian group plus, for 128-bit blocks, a
/// multiply-accumulate over GF(2^128). `gf128_mul_add` is only required by
/// `DenseType::GF128`; value types without it (such as `u64`) must be used
/// with `DenseType::Binary`, and calling the field operation on them is a
/// caller contract violation that panics.
pub trait Value: Copy + PartialEq + Send + Sync + 'static {
    /// The additive identity.
    fn zero() -> Self;
    /// `self ^= rhs`.
    fn add_assign(&mut self, rhs: &Self);
    /// Overwrite `self` with uniformly random data.
    fn randomize<R: RngCore + ?Sized>(&mut self, rng: &mut R);
    /// `self ^= rhs * m` over GF(2^128).
    fn gf128_mul_add(&mut self, rhs: &Self, m: Block) {
        let _ = (rhs, m);
        panic!("this value type does not support the GF128 dense mode");
    }
}

impl Value for Block {
    #[inline]
    fn zero() -> Self {
        Block::ZERO
    }
    #[inline]
    fn add_assign(&mut self, rhs: &Self) {
        *self ^= *rhs;
    }
    #[inline]
    fn randomize<R: RngCore + ?Sized>(&mut self, rng: &mut R) {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        *self = Block::from(bytes);
    }
    #[inline]
    fn gf128_mul_add(&mut self, rhs: &Self, m: Block) {
        *self ^= rhs.gf128_mul(m);
    }
}

impl Value for u64 {
    #[inline]
    fn zero() -> Self {
        0
    }
    #[inline]
    fn add_assign(&mut self, rhs: &Self) {
        *self ^= *rhs;
    }
    #[inline]
    fn randomize<R: RngCore + ?Sized>(&mut self, rng: &mut R) {
        *self = rng.next_u64();
    }
}

// Fixed-width tuples of values, the "matrix" layout where each item carries
// N words. The field operation applies component-wise, so `[Block; N]`
// supports both dense modes.
impl<V: Value, const N: usize> Value for [V; N] {
    #[inline]
    fn zero() -> Self {
        [V::zero(); N]
    }
    #[inline]
    fn add_assign(&mut self, rhs: &Self) {
        for (a, b) in self.iter_mut().zip(rhs.iter()) {
            a.add_assign(b);
        }
    }
    #[inline]
    fn randomize<R: RngCore + ?Sized>(&mut self, rng: &mut R) {
        for a in self.iter_mut() {
            a.randomize(rng);
        }
    }
    #[inline]
    fn gf128_mul_add(&mut self, rhs: &Self, m: Block) {
        for (a, b) in self.iter_mut().zip(rhs.iter()) {
            a.gf128_mul_add(b, m);
        }
    }
}
