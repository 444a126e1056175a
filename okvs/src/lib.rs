//! Oblivious key-value stores.
//!
//! An oblivious key-value store encodes a set of key-value pairs into a
//! vector `P` such that `decode(key, P)` recovers each stored value, while
//! `P` itself leaks nothing about the keys beyond an upper bound on their
//! count. [`Paxos`] is the core solver; [`Baxos`] hashes large sets into
//! bins and solves each bin independently, trading a small size overhead
//! for linear-time, parallel solving.
//!
//! ```
//! use okvs::{AesRng, Baxos, Block, DenseType};
//! use rand::{Rng, SeedableRng};
//!
//! let mut rng = AesRng::from_seed(Block::from(0u64));
//! let keys: Vec<Block> = (0..1000).map(|_| rng.gen()).collect();
//! let values: Vec<Block> = (0..1000).map(|_| rng.gen()).collect();
//!
//! let baxos = Baxos::new(1000, 256, 3, 40, DenseType::GF128, rng.gen()).unwrap();
//! let mut p = vec![Block::ZERO; baxos.size()];
//! baxos.solve(&keys, &values, &mut p, None, 2).unwrap();
//!
//! let mut decoded = vec![Block::ZERO; 1000];
//! baxos.decode(&keys, &mut decoded, &p, 2).unwrap();
//! assert_eq!(decoded, values);
//! ```

#![deny(missing_docs)]

mod aes;
mod bins;
mod block;
mod errors;
mod hash;
mod matrix;
mod params;
mod paxos;
mod rand_aes;
mod value;
mod weight;

pub use crate::{
    aes::Aes128,
    bins::{get_bin_size, Baxos},
    block::Block,
    errors::Error,
    hash::{PaxosHash, PaxosIdx, PAXOS_BATCH},
    params::{DenseType, PaxosParam},
    paxos::Paxos,
    rand_aes::AesRng,
    value::Value,
};
