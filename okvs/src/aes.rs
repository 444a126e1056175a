//! Keyed AES-128 and the fixed-key block hash built on it.

use crate::Block;
use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};

/// AES-128, encryption only.
#[derive(Clone)]
pub struct Aes128 {
    cipher: aes::Aes128,
}

impl Aes128 {
    /// How many blocks the batched entry points process at once.
    pub const BATCH: usize = 8;

    /// Create a new cipher from `key`.
    #[inline]
    pub fn new(key: Block) -> Self {
        let key: [u8; 16] = key.into();
        Aes128 {
            cipher: aes::Aes128::new(GenericArray::from_slice(&key)),
        }
    }

    /// Encrypt a single block.
    #[inline]
    pub fn encrypt(&self, m: Block) -> Block {
        let mut block = GenericArray::from(<[u8; 16]>::from(m));
        self.cipher.encrypt_block(&mut block);
        Block::from(<[u8; 16]>::from(block))
    }

    /// Encrypt `inputs` into `outputs` (equal lengths), batching internally.
    pub fn encrypt_blocks(&self, inputs: &[Block], outputs: &mut [Block]) {
        debug_assert_eq!(inputs.len(), outputs.len());
        let mut buf = [GenericArray::from([0u8; 16]); Self::BATCH];
        let mut i = 0;
        while i + Self::BATCH <= inputs.len() {
            for (b, x) in buf.iter_mut().zip(inputs[i..i + Self::BATCH].iter()) {
                *b = GenericArray::from(<[u8; 16]>::from(*x));
            }
            self.cipher.encrypt_blocks(&mut buf);
            for (y, b) in outputs[i..i + Self::BATCH].iter_mut().zip(buf.iter()) {
                *y = Block::from(<[u8; 16]>::from(*b));
            }
            i += Self::BATCH;
        }
        for (y, x) in outputs[i..].iter_mut().zip(inputs[i..].iter()) {
            *y = self.encrypt(*x);
        }
    }

    /// The correlation-robust hash `π(x) ⊕ x`.
    #[inline]
    pub fn cr_hash(&self, x: Block) -> Block {
        self.encrypt(x) ^ x
    }

    /// `π(x) ⊕ x` over a batch.
    pub fn cr_hash_blocks(&self, inputs: &[Block], outputs: &mut [Block]) {
        self.encrypt_blocks(inputs, outputs);
        for (y, x) in outputs.iter_mut().zip(inputs.iter()) {
            *y ^= *x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_128() {
        // FIPS-197 appendix C.1 vector.
        let key = Block::from([
            0x2B, 0x7E, 0x15, 0x16, 0x28, 0xAE, 0xD2, 0xA6, 0xAB, 0xF7, 0x15, 0x88, 0x09, 0xCF,
            0x4F, 0x3C,
        ]);
        let pt = Block::from([
            0x6B, 0xC1, 0xBE, 0xE2, 0x2E, 0x40, 0x9F, 0x96, 0xE9, 0x3D, 0x7E, 0x11, 0x73, 0x93,
            0x17, 0x2A,
        ]);
        let ct = Block::from([
            0x3A, 0xD7, 0x7B, 0xB4, 0x0D, 0x7A, 0x36, 0x60, 0xA8, 0x9E, 0xCA, 0xF3, 0x24, 0x66,
            0xEF, 0x97,
        ]);
        let cipher = Aes128::new(key);
        assert_eq!(cipher.encrypt(pt), ct);
    }

    #[test]
    fn test_batch_matches_scalar() {
        let cipher = Aes128::new(Block::from(0x42u64));
        let inputs: Vec<Block> = (0..37u64).map(Block::from).collect();
        let mut batched = vec![Block::ZERO; inputs.len()];
        cipher.encrypt_blocks(&inputs, &mut batched);
        for (x, y) in inputs.iter().zip(batched.iter()) {
            assert_eq!(cipher.encrypt(*x), *y);
        }
    }

    #[test]
    fn test_cr_hash() {
        let cipher = Aes128::new(Block::from(7u64));
        let x = Block::from(0xDEADBEEFu64);
        assert_eq!(cipher.cr_hash(x), cipher.encrypt(x) ^ x);
        let inputs = vec![x; 5];
        let mut out = vec![Block::ZERO; 5];
        cipher.cr_hash_blocks(&inputs, &mut out);
        assert!(out.iter().all(|y| *y == cipher.cr_hash(x)));
    }
}
