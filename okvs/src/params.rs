//! Solver parameters derived from empirical failure-rate regressions.

use crate::errors::Error;

/// How the dense columns of each row are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenseType {
    /// Dense columns are individual bits of a 64-bit word; the gap system is
    /// solved over GF(2).
    Binary,
    /// Dense columns are successive GF(2^128) powers of a 128-bit word; the
    /// gap system is solved over the field.
    GF128,
}

/// Sizing parameters for a single `Paxos` instance.
///
/// The formulas are regressions fit against observed failure rates; for a
/// given statistical security parameter `ssp` they choose the sparse
/// expansion and the number of dense columns so that encoding fails with
/// probability at most `2^-ssp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaxosParam {
    /// Length of the sparse part of the output vector.
    pub sparse_size: u64,
    /// Number of dense columns: `g` plus `ssp` extra in `Binary` mode, at
    /// least one in `GF128` mode.
    pub dense_size: u64,
    /// Number of sparse positions each row touches.
    pub weight: usize,
    /// Statistical security parameter (bits).
    pub ssp: usize,
    /// Expected gap bound `g`.
    pub g: u64,
    /// Dense column interpretation.
    pub dt: DenseType,
}

impl PaxosParam {
    /// Compute parameters for `num_items` items at the given hash `weight`.
    ///
    /// Fails for weights below two and for item counts where the regression
    /// degenerates (weight two needs roughly `num_items >= 64`).
    pub fn new(num_items: usize, weight: usize, ssp: usize, dt: DenseType) -> Result<Self, Error> {
        if weight < 2 {
            return Err(Error::InvalidWeight(weight));
        }
        let invalid = Error::InvalidParameters { num_items, weight };
        if num_items == 0 {
            return Err(invalid);
        }
        let log_n = (num_items as f64).log2();
        let (sparse_size, g);
        if weight == 2 {
            let a = 7.529;
            let b = 0.61;
            let c = 2.556;
            let lambda_vs_gap = a / (log_n - c) + b;
            if !lambda_vs_gap.is_finite() || lambda_vs_gap <= 0.0 {
                return Err(invalid);
            }
            g = (ssp as f64 / lambda_vs_gap + 1.9).ceil() as u64;
            sparse_size = 2 * num_items as u64;
        } else {
            // Expansion factors fit per weight; lambda-vs-e fit across
            // weights and sizes.
            let ee = match weight {
                3 => 1.223,
                4 => 1.293,
                w => 0.1485 * w as f64 + 0.6845,
            };
            let log_w = (weight as f64).log2();
            let log_lambda_vs_e = 0.555 * log_n + 0.093 * log_w.powi(3) - 1.01 * log_w.powi(2)
                + 2.925 * log_w
                - 0.133;
            let lambda_vs_e = log_lambda_vs_e.exp2();
            let b = -9.2 - lambda_vs_e * ee;
            let e = (ssp as f64 - b) / lambda_vs_e;
            let log_ne = (e * num_items as f64).log2();
            if !e.is_finite() || e <= 1.0 || log_ne <= 0.0 {
                return Err(invalid);
            }
            g = (ssp as f64 / ((weight - 2) as f64 * log_ne)).floor() as u64;
            sparse_size = (num_items as f64 * e).ceil() as u64;
        }
        // Large inputs can drive the gap bound to zero; decoding always
        // reads at least one dense column, so GF128 mode keeps one.
        let dense_size = match dt {
            DenseType::Binary => g + ssp as u64,
            DenseType::GF128 => g.max(1),
        };
        if dense_size == 0 || sparse_size + dense_size < num_items as u64 {
            return Err(invalid);
        }
        // Binary mode packs the dense columns into a single 64-bit word.
        if dt == DenseType::Binary && dense_size > 64 {
            return Err(invalid);
        }
        Ok(PaxosParam {
            sparse_size,
            dense_size,
            weight,
            ssp,
            g,
            dt,
        })
    }

    /// Total output vector length, sparse plus dense.
    #[inline]
    pub fn size(&self) -> usize {
        (self.sparse_size + self.dense_size) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        let p = PaxosParam::new(1024, 3, 40, DenseType::GF128).unwrap();
        assert_eq!((p.sparse_size, p.dense_size, p.g), (1466, 3, 3));
        let p = PaxosParam::new(1024, 3, 40, DenseType::Binary).unwrap();
        assert_eq!((p.sparse_size, p.dense_size, p.g), (1466, 43, 3));
        let p = PaxosParam::new(1 << 16, 3, 40, DenseType::GF128).unwrap();
        assert_eq!((p.sparse_size, p.dense_size), (81506, 2));
        let p = PaxosParam::new(100, 4, 40, DenseType::GF128).unwrap();
        assert_eq!((p.sparse_size, p.dense_size), (201, 2));
        let p = PaxosParam::new(1024, 2, 40, DenseType::GF128).unwrap();
        assert_eq!((p.sparse_size, p.dense_size), (2048, 27));
        let p = PaxosParam::new(10000, 3, 40, DenseType::GF128).unwrap();
        assert_eq!((p.sparse_size, p.dense_size), (12818, 2));
    }

    #[test]
    fn test_zero_gap_keeps_one_dense_column() {
        // High weights at large sizes drive the gap bound to zero; the
        // dense part must not vanish with it.
        let p = PaxosParam::new(33333, 5, 40, DenseType::GF128).unwrap();
        assert_eq!((p.g, p.dense_size), (0, 1));
        let p = PaxosParam::new(10000, 5, 40, DenseType::GF128).unwrap();
        assert_eq!((p.g, p.dense_size), (0, 1));
    }

    #[test]
    fn test_determinism() {
        let a = PaxosParam::new(5000, 3, 40, DenseType::GF128).unwrap();
        let b = PaxosParam::new(5000, 3, 40, DenseType::GF128).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            PaxosParam::new(100, 1, 40, DenseType::GF128),
            Err(Error::InvalidWeight(1))
        ));
        assert!(PaxosParam::new(0, 3, 40, DenseType::GF128).is_err());
        // Weight-two regression degenerates for tiny inputs.
        assert!(PaxosParam::new(4, 2, 40, DenseType::GF128).is_err());
    }

    #[test]
    fn test_size() {
        for n in [1usize, 10, 100, 1000, 33333] {
            for w in [3usize, 4, 5] {
                let p = PaxosParam::new(n, w, 40, DenseType::GF128).unwrap();
                assert!(p.size() as u64 >= n as u64);
                assert!(p.sparse_size >= n as u64);
            }
        }
    }
}
