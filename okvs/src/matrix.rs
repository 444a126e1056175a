//! Small dense matrices for the gap-row linear systems.

use crate::Block;

/// A row-major matrix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Matrix<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> T {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: T) {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c] = v;
    }

    #[inline]
    pub fn row_mut(&mut self, r: usize) -> &mut [T] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }
}

impl Matrix<Block> {
    /// Gauss-Jordan inverse over GF(2^128); `None` if singular.
    pub fn gf128_inverse(&self) -> Option<Matrix<Block>> {
        assert_eq!(self.rows, self.cols);
        let n = self.rows;
        let mut mtx = self.clone();
        let mut inv = Matrix::new(n, n);
        for i in 0..n {
            inv.set(i, i, Block::ONE);
        }
        for i in 0..n {
            if mtx.get(i, i) == Block::ZERO {
                let pivot = (i + 1..n).find(|&j| mtx.get(j, i) != Block::ZERO)?;
                for c in 0..n {
                    let t = mtx.get(i, c);
                    mtx.set(i, c, mtx.get(pivot, c));
                    mtx.set(pivot, c, t);
                    let t = inv.get(i, c);
                    inv.set(i, c, inv.get(pivot, c));
                    inv.set(pivot, c, t);
                }
            }
            let inv_piv = mtx.get(i, i).gf128_inverse();
            for c in 0..n {
                mtx.set(i, c, mtx.get(i, c).gf128_mul(inv_piv));
                inv.set(i, c, inv.get(i, c).gf128_mul(inv_piv));
            }
            for r in 0..n {
                if r == i {
                    continue;
                }
                let factor = mtx.get(r, i);
                if factor == Block::ZERO {
                    continue;
                }
                for c in 0..n {
                    let v = mtx.get(r, c) ^ mtx.get(i, c).gf128_mul(factor);
                    mtx.set(r, c, v);
                    let v = inv.get(r, c) ^ inv.get(i, c).gf128_mul(factor);
                    inv.set(r, c, v);
                }
            }
        }
        Some(inv)
    }

    #[cfg(test)]
    pub fn gf128_mul(&self, rhs: &Matrix<Block>) -> Matrix<Block> {
        assert_eq!(self.cols, rhs.rows);
        let mut out = Matrix::new(self.rows, rhs.cols);
        for r in 0..self.rows {
            for c in 0..rhs.cols {
                let mut acc = Block::ZERO;
                for k in 0..self.cols {
                    acc ^= self.get(r, k).gf128_mul(rhs.get(k, c));
                }
                out.set(r, c, acc);
            }
        }
        out
    }
}

/// A bit-packed matrix over GF(2), one `u64` word per 64 columns.
#[derive(Clone, Debug)]
pub(crate) struct DenseMtx {
    rows: usize,
    cols: usize,
    words: usize,
    data: Vec<u64>,
}

impl DenseMtx {
    pub fn new(rows: usize, cols: usize) -> Self {
        let words = (cols + 63) / 64;
        DenseMtx {
            rows,
            cols,
            words,
            data: vec![0; rows * words],
        }
    }

    #[inline]
    pub fn bit(&self, r: usize, c: usize) -> bool {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.words + c / 64] >> (c % 64) & 1 == 1
    }

    #[inline]
    pub fn set_bit(&mut self, r: usize, c: usize, b: bool) {
        debug_assert!(r < self.rows && c < self.cols);
        let w = &mut self.data[r * self.words + c / 64];
        *w = (*w & !(1 << (c % 64))) | ((b as u64) << (c % 64));
    }

    fn xor_rows(&mut self, dst: usize, src: usize) {
        let (a, b) = if dst < src {
            let (lo, hi) = self.data.split_at_mut(src * self.words);
            (
                &mut lo[dst * self.words..(dst + 1) * self.words],
                &hi[..self.words],
            )
        } else {
            let (lo, hi) = self.data.split_at_mut(dst * self.words);
            (
                &mut hi[..self.words],
                &lo[src * self.words..(src + 1) * self.words],
            )
        };
        for (x, y) in a.iter_mut().zip(b.iter()) {
            *x ^= *y;
        }
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for w in 0..self.words {
            self.data.swap(a * self.words + w, b * self.words + w);
        }
    }

    /// Gauss-Jordan inverse over GF(2); `None` if singular.
    pub fn invert(&self) -> Option<DenseMtx> {
        assert_eq!(self.rows, self.cols);
        let n = self.rows;
        let mut mtx = self.clone();
        let mut inv = DenseMtx::new(n, n);
        for i in 0..n {
            inv.set_bit(i, i, true);
        }
        for i in 0..n {
            if !mtx.bit(i, i) {
                let pivot = (i + 1..n).find(|&j| mtx.bit(j, i))?;
                mtx.swap_rows(i, pivot);
                inv.swap_rows(i, pivot);
            }
            for r in 0..n {
                if r != i && mtx.bit(r, i) {
                    mtx.xor_rows(r, i);
                    inv.xor_rows(r, i);
                }
            }
        }
        Some(inv)
    }
}

/// `n` choose `k`, saturating at `u64::MAX`.
pub(crate) fn choose(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
        if acc > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    acc as u64
}

/// The `index`th k-subset of `{0, .., n-1}` in lexicographic order.
pub(crate) fn ith_combination(index: u64, n: u64, k: u64) -> Vec<u64> {
    debug_assert!(index < choose(n, k));
    let mut out = Vec::with_capacity(k as usize);
    let mut r = index;
    let mut next = 0u64;
    for i in 0..k {
        let mut c = next;
        loop {
            let with_c = choose(n - 1 - c, k - 1 - i);
            if r < with_c {
                break;
            }
            r -= with_c;
            c += 1;
        }
        out.push(c);
        next = c + 1;
    }
    out
}
