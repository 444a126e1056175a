//! Defines a 128-bit block and its GF(2^128) arithmetic.

use bytemuck::{Pod, Zeroable};
use rand::{
    distributions::{Distribution, Standard},
    Rng,
};
use std::{
    fmt,
    ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Not, Shl, Shr},
};

/// A 128-bit block.
///
/// Blocks are the item type fed to the hasher, the dense half of every row,
/// and (in `DenseType::GF128` mode) the value type itself. Field arithmetic
/// is over GF(2^128) with the modulus `x^128 + x^7 + x^2 + x + 1`, bit `i`
/// of the `u128` being the coefficient of `x^i`.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Block(
    /// The underlying 128-bit word, little endian, bit `i` being the
    /// coefficient of `x^i`.
    pub u128,
);

impl Block {
    /// The all-zeros block.
    pub const ZERO: Block = Block(0);
    /// The multiplicative identity of GF(2^128).
    pub const ONE: Block = Block(1);
    /// The all-ones block.
    pub const ONES: Block = Block(u128::MAX);

    /// Return the least significant bit.
    #[inline]
    pub fn lsb(&self) -> bool {
        self.0 & 1 == 1
    }

    /// Return the `i`th 64-bit word (little endian, `i < 2`).
    #[inline]
    pub fn get_u64(&self, i: usize) -> u64 {
        debug_assert!(i < 2);
        (self.0 >> (64 * i)) as u64
    }

    /// Return the `i`th 32-bit word (little endian, `i < 4`).
    #[inline]
    pub fn get_u32(&self, i: usize) -> u32 {
        debug_assert!(i < 4);
        (self.0 >> (32 * i)) as u32
    }

    /// Carry-less multiply in GF(2^128), reduced modulo
    /// `x^128 + x^7 + x^2 + x + 1`.
    #[inline]
    pub fn gf128_mul(&self, rhs: Block) -> Block {
        let a0 = self.0 as u64;
        let a1 = (self.0 >> 64) as u64;
        let b0 = rhs.0 as u64;
        let b1 = (rhs.0 >> 64) as u64;
        // Karatsuba over the 64-bit halves.
        let lo = bmul64(a0, b0);
        let hi = bmul64(a1, b1);
        let mid = bmul64(a0 ^ a1, b0 ^ b1) ^ lo ^ hi;
        let lower = lo ^ (mid << 64);
        let upper = hi ^ (mid >> 64);
        Block(gf128_reduce(lower, upper))
    }

    /// The multiplicative inverse; `Block::ZERO` has none and maps to itself.
    ///
    /// Computes `self^(2^128 - 2)` with an addition chain over the exponent's
    /// binary expansion.
    pub fn gf128_inverse(&self) -> Block {
        let mut a = *self;
        let mut result = Block::ZERO;
        for i in 0..7 {
            // b = a^(2^(2^i)), so a * b covers twice as many exponent bits.
            let mut b = a;
            for _ in 0..(1 << i) {
                b = b.gf128_mul(b);
            }
            a = a.gf128_mul(b);
            result = if i == 0 { b } else { result.gf128_mul(b) };
        }
        result
    }
}

/// Carry-less 32x32 -> 64 bit multiply.
///
/// Spreads each operand over four interleaved bit-classes so that plain
/// integer multiplies cannot carry between polynomial coefficients: a
/// product column sums at most 8 one-bit terms, which fits in the 4-bit
/// hole below the next kept bit.
#[inline]
fn bmul32(a: u32, b: u32) -> u64 {
    const MA: u64 = 0x1111_1111;
    const M0: u64 = 0x1111_1111_1111_1111;
    const M1: u64 = M0 << 1;
    const M2: u64 = M0 << 2;
    const M3: u64 = M0 << 3;
    let x0 = a as u64 & MA;
    let x1 = a as u64 & (MA << 1);
    let x2 = a as u64 & (MA << 2);
    let x3 = a as u64 & (MA << 3);
    let y0 = b as u64 & MA;
    let y1 = b as u64 & (MA << 1);
    let y2 = b as u64 & (MA << 2);
    let y3 = b as u64 & (MA << 3);
    let z0 = (x0.wrapping_mul(y0) ^ x1.wrapping_mul(y3) ^ x2.wrapping_mul(y2) ^ x3.wrapping_mul(y1))
        & M0;
    let z1 = (x0.wrapping_mul(y1) ^ x1.wrapping_mul(y0) ^ x2.wrapping_mul(y3) ^ x3.wrapping_mul(y2))
        & M1;
    let z2 = (x0.wrapping_mul(y2) ^ x1.wrapping_mul(y1) ^ x2.wrapping_mul(y0) ^ x3.wrapping_mul(y3))
        & M2;
    let z3 = (x0.wrapping_mul(y3) ^ x1.wrapping_mul(y2) ^ x2.wrapping_mul(y1) ^ x3.wrapping_mul(y0))
        & M3;
    z0 | z1 | z2 | z3
}

/// Carry-less 64x64 -> 128 bit multiply, schoolbook over 32-bit halves.
#[inline]
fn bmul64(a: u64, b: u64) -> u128 {
    let a0 = a as u32;
    let a1 = (a >> 32) as u32;
    let b0 = b as u32;
    let b1 = (b >> 32) as u32;
    let lo = bmul32(a0, b0) as u128;
    let mid = (bmul32(a0, b1) ^ bmul32(a1, b0)) as u128;
    let hi = bmul32(a1, b1) as u128;
    lo ^ (mid << 32) ^ (hi << 64)
}

/// Reduce a 256-bit carry-less product modulo `x^128 + x^7 + x^2 + x + 1`.
#[inline]
fn gf128_reduce(lo: u128, hi: u128) -> u128 {
    // hi * x^128 = hi * (x^7 + x^2 + x + 1); the bits pushed past x^127 by
    // that multiply are folded once more (they fit in seven bits, so a
    // second fold cannot overflow).
    let b = hi ^ (hi << 1) ^ (hi << 2) ^ (hi << 7);
    let c = (hi >> 127) ^ (hi >> 126) ^ (hi >> 121);
    let d = c ^ (c << 1) ^ (c << 2) ^ (c << 7);
    lo ^ b ^ d
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in self.0.to_le_bytes().iter() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl AsRef<[u8]> for Block {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl AsMut<[u8]> for Block {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        bytemuck::bytes_of_mut(self)
    }
}

impl From<Block> for u128 {
    #[inline]
    fn from(b: Block) -> u128 {
        b.0
    }
}

impl From<u128> for Block {
    #[inline]
    fn from(x: u128) -> Self {
        Block(x)
    }
}

impl From<u64> for Block {
    #[inline]
    fn from(x: u64) -> Self {
        Block(x as u128)
    }
}

impl From<[u8; 16]> for Block {
    #[inline]
    fn from(bytes: [u8; 16]) -> Self {
        Block(u128::from_le_bytes(bytes))
    }
}

impl From<Block> for [u8; 16] {
    #[inline]
    fn from(b: Block) -> [u8; 16] {
        b.0.to_le_bytes()
    }
}

impl BitXor for Block {
    type Output = Block;
    #[inline]
    fn bitxor(self, rhs: Self) -> Self {
        Block(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for Block {
    #[inline]
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl BitAnd for Block {
    type Output = Block;
    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Block(self.0 & rhs.0)
    }
}

impl BitAndAssign for Block {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl BitOr for Block {
    type Output = Block;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Block(self.0 | rhs.0)
    }
}

impl BitOrAssign for Block {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Not for Block {
    type Output = Block;
    #[inline]
    fn not(self) -> Self {
        Block(!self.0)
    }
}

impl Shl<usize> for Block {
    type Output = Block;
    #[inline]
    fn shl(self, n: usize) -> Self {
        Block(self.0 << n)
    }
}

impl Shr<usize> for Block {
    type Output = Block;
    #[inline]
    fn shr(self, n: usize) -> Self {
        Block(self.0 >> n)
    }
}

impl Distribution<Block> for Standard {
    #[inline]
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Block {
        Block(rng.gen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AesRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_xor() {
        let mut rng = AesRng::new();
        let x = rng.gen::<Block>();
        let y = rng.gen::<Block>();
        let z = x ^ y;
        assert_eq!(z ^ y, x);
        assert_eq!(z ^ x, y);
        assert_eq!(x ^ Block::ZERO, x);
    }

    #[test]
    fn test_gf128_mul_identities() {
        let mut rng = AesRng::new();
        for _ in 0..128 {
            let a = rng.gen::<Block>();
            assert_eq!(a.gf128_mul(Block::ONE), a);
            assert_eq!(a.gf128_mul(Block::ZERO), Block::ZERO);
        }
    }

    #[test]
    fn test_gf128_mul_reduction() {
        // x^127 * x = x^128 = x^7 + x^2 + x + 1.
        let a = Block(1u128 << 127);
        let b = Block(2);
        assert_eq!(a.gf128_mul(b), Block(0x87));
    }

    /// Bit-by-bit shift-and-reduce multiply, the definition of the field.
    fn gf128_mul_ref(a: Block, b: Block) -> Block {
        let mut acc = 0u128;
        let mut a = a.0;
        let mut b = b.0;
        while b != 0 {
            if b & 1 == 1 {
                acc ^= a;
            }
            b >>= 1;
            let carry = a >> 127;
            a <<= 1;
            if carry == 1 {
                a ^= 0x87;
            }
        }
        Block(acc)
    }

    #[test]
    fn test_gf128_mul_matches_reference() {
        // Dense operands drive every product column to its maximum count.
        assert_eq!(
            Block::ONES.gf128_mul(Block::ONES),
            gf128_mul_ref(Block::ONES, Block::ONES)
        );
        let mut rng = AesRng::from_seed(Block::from(17u64));
        for _ in 0..1000 {
            let a = rng.gen::<Block>();
            let b = rng.gen::<Block>();
            assert_eq!(a.gf128_mul(b), gf128_mul_ref(a, b), "a={:?} b={:?}", a, b);
        }
    }

    #[test]
    fn test_gf128_mul_commutes_distributes() {
        let mut rng = AesRng::new();
        for _ in 0..128 {
            let a = rng.gen::<Block>();
            let b = rng.gen::<Block>();
            let c = rng.gen::<Block>();
            assert_eq!(a.gf128_mul(b), b.gf128_mul(a));
            assert_eq!(
                a.gf128_mul(b).gf128_mul(c),
                a.gf128_mul(b.gf128_mul(c))
            );
            assert_eq!(
                (a ^ b).gf128_mul(c),
                a.gf128_mul(c) ^ b.gf128_mul(c)
            );
        }
    }

    #[test]
    fn test_gf128_inverse() {
        let mut rng = AesRng::new();
        for _ in 0..32 {
            let a = rng.gen::<Block>();
            if a == Block::ZERO {
                continue;
            }
            assert_eq!(a.gf128_mul(a.gf128_inverse()), Block::ONE);
        }
    }
}
