//! Keyed row hashing: items to sparse column indices and dense words.

use crate::{Aes128, Block};
use std::marker::PhantomData;

/// Index types a `Paxos` instance can be instantiated at.
///
/// Sparse columns are stored as this type, so the sparse size must fit below
/// `NULL` (the all-ones sentinel).
pub trait PaxosIdx:
    Copy + Clone + Ord + Eq + std::fmt::Debug + std::hash::Hash + Send + Sync + 'static
{
    /// Sentinel value, the maximum of the type.
    const NULL: Self;
    /// Width in bits.
    const BITS: u32;
    /// Narrowing conversion; the caller guarantees `v` fits.
    fn from_u64(v: u64) -> Self;
    /// Widening conversion.
    fn as_u64(self) -> u64;
    /// Widening conversion to `usize`.
    #[inline]
    fn as_usize(self) -> usize {
        self.as_u64() as usize
    }
}

macro_rules! impl_paxos_idx {
    ($($t:ty),*) => {
        $(impl PaxosIdx for $t {
            const NULL: Self = <$t>::MAX;
            const BITS: u32 = <$t>::BITS;
            #[inline]
            fn from_u64(v: u64) -> Self {
                debug_assert!(v <= <$t>::MAX as u64);
                v as $t
            }
            #[inline]
            fn as_u64(self) -> u64 {
                self as u64
            }
        })*
    };
}
impl_paxos_idx!(u8, u16, u32, u64);

/// Batch width used throughout hashing and decoding.
pub const PAXOS_BATCH: usize = 32;

/// The keyed hasher mapping an item to its row: `weight` distinct sparse
/// column indices plus a 128-bit dense word.
#[derive(Clone)]
pub struct PaxosHash<I> {
    aes: Aes128,
    weight: usize,
    sparse_size: u64,
    _marker: PhantomData<I>,
}

impl<I: PaxosIdx> PaxosHash<I> {
    /// Create a hasher keyed by `seed` for the given weight and sparse size.
    pub fn new(seed: Block, weight: usize, sparse_size: u64) -> Self {
        PaxosHash {
            aes: Aes128::new(seed),
            weight,
            sparse_size,
            _marker: PhantomData,
        }
    }

    /// Hash one item to its dense word, `π(x) ⊕ x`.
    #[inline]
    pub fn hash_block(&self, x: Block) -> Block {
        self.aes.cr_hash(x)
    }

    /// Hash a batch of items to their dense words.
    #[inline]
    pub fn hash_blocks(&self, inputs: &[Block], outputs: &mut [Block]) {
        self.aes.cr_hash_blocks(inputs, outputs);
    }

    /// Expand a dense word into `weight` distinct sparse column indices.
    ///
    /// For weight three, three overlapping 64-bit little-endian words of the
    /// hash are reduced modulo `m`, `m-1`, `m-2` and promoted past earlier
    /// picks so the indices are distinct (but unsorted). For other weights
    /// the hash is repeatedly squared in GF(2^128); each step reduces the
    /// low word modulo `m-j` and inserts into the sorted prefix, promoting
    /// past collisions.
    pub fn build_row(&self, hash: Block, row: &mut [I]) {
        let m = self.sparse_size;
        debug_assert_eq!(row.len(), self.weight);
        if self.weight == 3 {
            // Three overlapping 64-bit words at byte offsets 0, 4, 8.
            let rr0 = hash.0 as u64;
            let rr1 = (hash.0 >> 32) as u64;
            let rr2 = (hash.0 >> 64) as u64;
            let r0 = rr0 % m;
            let mut r1 = rr1 % (m - 1);
            let mut r2 = rr2 % (m - 2);
            let min = r0.min(r1);
            let mut max = r0.max(r1);
            if max == r1 {
                r1 += 1;
                max += 1;
            }
            if r2 >= min {
                r2 += 1;
            }
            if r2 >= max {
                r2 += 1;
            }
            row[0] = I::from_u64(r0);
            row[1] = I::from_u64(r1);
            row[2] = I::from_u64(r2);
        } else {
            let mut hh = hash;
            for j in 0..self.weight {
                let modulus = m - j as u64;
                hh = hh.gf128_mul(hh);
                let mut col = hh.get_u64(0) % modulus;
                // Insert into the sorted prefix row[..j], promoting past
                // every earlier pick that is <= col.
                let mut k = 0;
                while k < j && row[k].as_u64() <= col {
                    col += 1;
                    k += 1;
                }
                let mut t = j;
                while t > k {
                    row[t] = row[t - 1];
                    t -= 1;
                }
                row[k] = I::from_u64(col);
            }
        }
    }

    /// Expand a batch of dense words into rows; `rows` holds
    /// `hashes.len() * weight` indices.
    pub fn build_row32(&self, hashes: &[Block], rows: &mut [I]) {
        debug_assert_eq!(rows.len(), hashes.len() * self.weight);
        for (h, row) in hashes.iter().zip(rows.chunks_exact_mut(self.weight)) {
            self.build_row(*h, row);
        }
    }

    /// Hash one item and expand its row; returns the dense word.
    #[inline]
    pub fn hash_build_row1(&self, input: Block, row: &mut [I]) -> Block {
        let h = self.hash_block(input);
        self.build_row(h, row);
        h
    }

    /// Hash a batch of items and expand their rows.
    pub fn hash_build_row32(&self, inputs: &[Block], rows: &mut [I], dense: &mut [Block]) {
        debug_assert_eq!(inputs.len(), dense.len());
        self.hash_blocks(inputs, dense);
        self.build_row32(dense, rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AesRng;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};

    fn distinct<I: PaxosIdx>(row: &[I]) -> bool {
        for i in 0..row.len() {
            for j in i + 1..row.len() {
                if row[i] == row[j] {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn test_rows_distinct_and_in_range() {
        let mut rng = AesRng::from_seed(Block::from(3u64));
        for &w in &[2usize, 3, 4, 5] {
            let m = 1000u64;
            let hasher = PaxosHash::<u16>::new(Block::from(99u64), w, m);
            let mut row = vec![0u16; w];
            for _ in 0..1000 {
                let h = hasher.hash_build_row1(rng.gen(), &mut row);
                assert_ne!(h, Block::ZERO);
                assert!(distinct(&row));
                assert!(row.iter().all(|&c| (c as u64) < m));
                if w != 3 {
                    // Non-weight-3 rows come out sorted.
                    assert!(row.windows(2).all(|p| p[0] < p[1]));
                }
            }
        }
    }

    #[test]
    fn test_batch_matches_scalar() {
        let hasher = PaxosHash::<u32>::new(Block::from(5u64), 3, 1 << 20);
        let mut rng = AesRng::from_seed(Block::from(4u64));
        let inputs: Vec<Block> = (0..PAXOS_BATCH).map(|_| rng.gen()).collect();
        let mut rows = vec![0u32; PAXOS_BATCH * 3];
        let mut dense = vec![Block::ZERO; PAXOS_BATCH];
        hasher.hash_build_row32(&inputs, &mut rows, &mut dense);
        let mut row = [0u32; 3];
        for (i, x) in inputs.iter().enumerate() {
            let h = hasher.hash_build_row1(*x, &mut row);
            assert_eq!(h, dense[i]);
            assert_eq!(&rows[i * 3..i * 3 + 3], &row);
        }
    }

    proptest! {
        #[test]
        fn prop_rows_distinct(seed in any::<u64>(), item in any::<u128>(), w in 2usize..6) {
            let m = 4096u64;
            let hasher = PaxosHash::<u16>::new(Block::from(seed), w, m);
            let mut row = vec![0u16; w];
            hasher.hash_build_row1(Block::from(item), &mut row);
            prop_assert!(distinct(&row));
            prop_assert!(row.iter().all(|&c| (c as u64) < m));
        }

        #[test]
        fn prop_deterministic(seed in any::<u64>(), item in any::<u128>()) {
            let hasher = PaxosHash::<u32>::new(Block::from(seed), 3, 1 << 16);
            let mut a = [0u32; 3];
            let mut b = [0u32; 3];
            let ha = hasher.hash_build_row1(Block::from(item), &mut a);
            let hb = hasher.hash_build_row1(Block::from(item), &mut b);
            prop_assert_eq!(ha, hb);
            prop_assert_eq!(a, b);
        }
    }
}
