//! The core solver: triangulation, gap solving and back-substitution.

use crate::{
    errors::Error,
    hash::{PaxosHash, PaxosIdx, PAXOS_BATCH},
    matrix::{choose, ith_combination, DenseMtx, Matrix},
    params::{DenseType, PaxosParam},
    value::Value,
    weight::WeightData,
    AesRng, Block,
};
use rand::Rng;
use std::collections::BTreeSet;

/// An oblivious key-value store over a fixed item set.
///
/// Solving proceeds in two halves: `set_input` hashes the items into a
/// sparse binary system, and `encode` solves that system for an output
/// vector `P` such that decoding any input item recovers its value:
///
/// ```text
/// decode(x, P) = sum_{c in row(x)} P[c]  +  dense(x) . P[sparse..]
/// ```
///
/// The type parameter picks the width of the sparse column indices; the
/// sparse size must fit below `I::NULL`.
pub struct Paxos<I: PaxosIdx> {
    num_items: usize,
    seed: Block,
    params: PaxosParam,
    hasher: PaxosHash<I>,
    /// Dense word per row.
    dense: Vec<Block>,
    /// Sparse columns per row, `num_items * weight` entries.
    rows: Vec<I>,
    /// Arena of row indices grouped by column; `col_starts` delimits the
    /// per-column runs.
    col_backing: Vec<I>,
    col_starts: Vec<usize>,
    weight_sets: WeightData<I>,
    /// When set, `decode` adds into the output slice instead of assigning.
    pub add_to_decode: bool,
}

/// The sparse representation of `F C^-1`: for each gap row, the main rows
/// whose sum cancels its sparse part.
struct FcInv {
    mtx: Vec<Vec<usize>>,
}

impl<I: PaxosIdx> Paxos<I> {
    /// Create a solver for `num_items` items with explicit parameters.
    pub fn new(num_items: usize, params: PaxosParam, seed: Block) -> Result<Self, Error> {
        if params.sparse_size >= I::NULL.as_u64() {
            return Err(Error::IndexTypeTooSmall {
                sparse_size: params.sparse_size,
                index_bits: I::BITS,
            });
        }
        if params.sparse_size + params.dense_size < num_items as u64 {
            return Err(Error::InvalidParameters {
                num_items,
                weight: params.weight,
            });
        }
        let hasher = PaxosHash::new(seed, params.weight, params.sparse_size);
        Ok(Paxos {
            num_items,
            seed,
            params,
            hasher,
            dense: Vec::new(),
            rows: Vec::new(),
            col_backing: Vec::new(),
            col_starts: Vec::new(),
            weight_sets: WeightData::new(),
            add_to_decode: false,
        })
    }

    /// Create a solver, deriving parameters from `weight` and `ssp`.
    pub fn with_params(
        num_items: usize,
        weight: usize,
        ssp: usize,
        dt: DenseType,
        seed: Block,
    ) -> Result<Self, Error> {
        let params = PaxosParam::new(num_items, weight, ssp, dt)?;
        Paxos::new(num_items, params, seed)
    }

    /// The parameters in use.
    #[inline]
    pub fn params(&self) -> &PaxosParam {
        &self.params
    }

    /// The seed the hasher is keyed with.
    #[inline]
    pub fn seed(&self) -> Block {
        self.seed
    }

    /// Number of items this instance was sized for.
    #[inline]
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Total output vector length.
    #[inline]
    pub fn size(&self) -> usize {
        self.params.size()
    }

    #[inline]
    pub(crate) fn hasher(&self) -> &PaxosHash<I> {
        &self.hasher
    }

    #[inline]
    fn sparse_size(&self) -> usize {
        self.params.sparse_size as usize
    }

    #[inline]
    fn dense_size(&self) -> usize {
        self.params.dense_size as usize
    }

    /// Hash the input items and build the sparse system.
    ///
    /// Items must be distinct; debug builds scan for exact duplicates here,
    /// and triangulation later reports hash-level duplicates either way.
    pub fn set_input(&mut self, inputs: &[Block]) -> Result<(), Error> {
        if inputs.len() != self.num_items {
            return Err(Error::InvalidInputLength {
                expected: self.num_items,
                found: inputs.len(),
            });
        }
        if cfg!(debug_assertions) {
            let mut seen = std::collections::HashSet::with_capacity(inputs.len());
            for x in inputs {
                if !seen.insert(*x) {
                    return Err(Error::DuplicateItems);
                }
            }
        }
        self.allocate();
        let w = self.params.weight;
        let mut col_weights = vec![0u64; self.sparse_size()];
        let main = inputs.len() / PAXOS_BATCH * PAXOS_BATCH;
        let mut i = 0;
        while i < main {
            self.hasher.hash_build_row32(
                &inputs[i..i + PAXOS_BATCH],
                &mut self.rows[i * w..(i + PAXOS_BATCH) * w],
                &mut self.dense[i..i + PAXOS_BATCH],
            );
            for c in &self.rows[i * w..(i + PAXOS_BATCH) * w] {
                col_weights[c.as_usize()] += 1;
            }
            i += PAXOS_BATCH;
        }
        for i in main..inputs.len() {
            self.dense[i] = self
                .hasher
                .hash_build_row1(inputs[i], &mut self.rows[i * w..(i + 1) * w]);
            for c in &self.rows[i * w..(i + 1) * w] {
                col_weights[c.as_usize()] += 1;
            }
        }
        self.finish_input(&col_weights);
        Ok(())
    }

    /// Build the sparse system from pre-hashed dense words. Used when the
    /// items were already hashed, e.g. once per item across many bins.
    pub fn set_input_hashed(&mut self, hashes: &[Block]) -> Result<(), Error> {
        if hashes.len() != self.num_items {
            return Err(Error::InvalidInputLength {
                expected: self.num_items,
                found: hashes.len(),
            });
        }
        self.allocate();
        let w = self.params.weight;
        self.dense.copy_from_slice(hashes);
        let mut col_weights = vec![0u64; self.sparse_size()];
        let main = hashes.len() / PAXOS_BATCH * PAXOS_BATCH;
        let mut i = 0;
        while i < main {
            self.hasher.build_row32(
                &hashes[i..i + PAXOS_BATCH],
                &mut self.rows[i * w..(i + PAXOS_BATCH) * w],
            );
            i += PAXOS_BATCH;
        }
        for i in main..hashes.len() {
            self.hasher
                .build_row(hashes[i], &mut self.rows[i * w..(i + 1) * w]);
        }
        for c in &self.rows {
            col_weights[c.as_usize()] += 1;
        }
        self.finish_input(&col_weights);
        Ok(())
    }

    fn allocate(&mut self) {
        let w = self.params.weight;
        self.rows.clear();
        self.rows.resize(self.num_items * w, I::from_u64(0));
        self.dense.clear();
        self.dense.resize(self.num_items, Block::ZERO);
        self.col_backing.clear();
        self.col_backing.resize(self.num_items * w, I::from_u64(0));
        self.col_starts.clear();
        self.col_starts.resize(self.sparse_size() + 1, 0);
    }

    fn finish_input(&mut self, col_weights: &[u64]) {
        self.rebuild_columns(col_weights);
        let cw: Vec<I> = col_weights.iter().map(|&x| I::from_u64(x)).collect();
        self.weight_sets.init(&cw);
    }

    /// Group row indices by column into the arena.
    fn rebuild_columns(&mut self, col_weights: &[u64]) {
        let w = self.params.weight;
        self.col_starts[0] = 0;
        for (c, &cw) in col_weights.iter().enumerate() {
            self.col_starts[c + 1] = self.col_starts[c] + cw as usize;
        }
        let mut cursor = self.col_starts[..self.sparse_size()].to_vec();
        for r in 0..self.num_items {
            for j in 0..w {
                let c = self.rows[r * w + j].as_usize();
                self.col_backing[cursor[c]] = I::from_u64(r as u64);
                cursor[c] += 1;
            }
        }
    }

    /// Peel the system into a lower-triangular main part plus gap rows.
    ///
    /// Repeatedly pops the minimum-weight column; its first unvisited row
    /// becomes the next diagonal (main) entry, any further unvisited rows
    /// become gap rows paired with the current last main row. Visiting a row
    /// decrements every other live column it touches.
    fn triangulate(&mut self) -> Result<(Vec<I>, Vec<I>, Vec<[I; 2]>), Error> {
        if self.weight_sets.num_sets() <= 1 {
            // The sets were consumed by an earlier encode; rebuild them
            // from the column runs.
            let cw: Vec<I> = (0..self.sparse_size())
                .map(|c| I::from_u64((self.col_starts[c + 1] - self.col_starts[c]) as u64))
                .collect();
            self.weight_sets.init(&cw);
        }

        let w = self.params.weight;
        let mut main_rows = Vec::with_capacity(self.num_items);
        let mut main_cols = Vec::with_capacity(self.num_items);
        let mut gap_rows: Vec<[I; 2]> = Vec::new();
        let mut row_set = vec![false; self.num_items];
        let mut last_main = I::NULL;

        while self.weight_sets.num_sets() > 1 {
            let col_idx = self.weight_sets.min_weight_node();
            self.weight_sets.pop(col_idx);
            self.weight_sets.clear_weight(col_idx);

            let mut first = true;
            for t in self.col_starts[col_idx]..self.col_starts[col_idx + 1] {
                let row_idx = self.col_backing[t].as_usize();
                if row_set[row_idx] {
                    continue;
                }
                row_set[row_idx] = true;

                // Decrement the other live columns of this row.
                for j in 0..w {
                    let col2 = self.rows[row_idx * w + j].as_usize();
                    if self.weight_sets.weight_of(col2).as_u64() > 0 {
                        self.weight_sets.decrement(col2);
                    }
                }

                if first {
                    main_cols.push(I::from_u64(col_idx as u64));
                    last_main = I::from_u64(row_idx as u64);
                    main_rows.push(last_main);
                    first = false;
                } else {
                    if self.dense[last_main.as_usize()] == self.dense[row_idx] {
                        return Err(Error::DuplicateItems);
                    }
                    gap_rows.push([I::from_u64(row_idx as u64), last_main]);
                }
            }
            // The popped column's weight counts exactly its unvisited rows.
            if first {
                return Err(Error::TriangulationFailed);
            }
        }
        Ok((main_rows, main_cols, gap_rows))
    }

    /// Solve for `output` so that every item decodes to its value.
    ///
    /// With a `prng`, the free positions (never-used sparse columns and the
    /// non-pivot dense columns) are filled uniformly at random, making the
    /// output vector itself uniform; otherwise they stay zero.
    pub fn encode<V: Value>(
        &mut self,
        values: &[V],
        output: &mut [V],
        mut prng: Option<&mut AesRng>,
    ) -> Result<(), Error> {
        if values.len() != self.num_items {
            return Err(Error::InvalidInputLength {
                expected: self.num_items,
                found: values.len(),
            });
        }
        if output.len() != self.size() {
            return Err(Error::InvalidOutputLength {
                expected: self.size(),
                found: output.len(),
            });
        }
        debug_assert_eq!(self.rows.len(), self.num_items * self.params.weight);

        let (main_rows, main_cols, gap_rows) = self.triangulate()?;

        for v in output.iter_mut() {
            *v = V::zero();
        }

        if let Some(rng) = prng.as_deref_mut() {
            // Sparse columns no row ended up owning.
            for c in self.weight_sets.set_iter(0) {
                output[c].randomize(rng);
            }
        }

        match self.params.dt {
            DenseType::GF128 => {
                self.backfill_gf128(&main_rows, &main_cols, &gap_rows, values, output, prng)
            }
            DenseType::Binary => {
                self.backfill_binary(&main_rows, &main_cols, &gap_rows, values, output, prng)
            }
        }
    }

    /// `set_input` followed by `encode`.
    pub fn solve<V: Value>(
        &mut self,
        inputs: &[Block],
        values: &[V],
        output: &mut [V],
        prng: Option<&mut AesRng>,
    ) -> Result<(), Error> {
        self.set_input(inputs)?;
        self.encode(values, output, prng)
    }

    /// Solve the gap system over GF(2); dense columns are bits of a word.
    fn backfill_binary<V: Value>(
        &self,
        main_rows: &[I],
        main_cols: &[I],
        gap_rows: &[[I; 2]],
        values: &[V],
        output: &mut [V],
        mut prng: Option<&mut AesRng>,
    ) -> Result<(), Error> {
        let g = gap_rows.len();
        let sparse = self.sparse_size();
        let dense_size = self.dense_size();
        debug_assert!(dense_size <= 64);
        if g as u64 > self.params.g {
            return Err(Error::CapacityExceeded {
                size: g,
                limit: self.params.g as usize,
            });
        }
        let randomized = prng.is_some();

        let mut gap_cols: Vec<u64> = Vec::new();
        let mut dense_masks = vec![0u64; g];
        if g > 0 {
            let fcinv = self.get_fc_inv(main_rows, main_cols, gap_rows);
            gap_cols = self.get_gap_cols(&fcinv, gap_rows)?;

            if let Some(rng) = prng.as_deref_mut() {
                self.randomize_dense_cols(&mut output[sparse..], &gap_cols, rng);
            }

            let xx2 = self.get_x2_prime(&fcinv, gap_rows, &gap_cols, values, output, randomized);
            let ee = self.get_e_prime(&fcinv, gap_rows, &gap_cols);
            let ee_inv = ee.invert().ok_or(Error::SingularMatrix)?;

            for (i, &gc) in gap_cols.iter().enumerate() {
                let mut pp = output[sparse + gc as usize];
                for (j, x) in xx2.iter().enumerate() {
                    if ee_inv.bit(i, j) {
                        pp.add_assign(x);
                    }
                }
                output[sparse + gc as usize] = pp;
            }
            for (mask, &gc) in dense_masks.iter_mut().zip(gap_cols.iter()) {
                *mask = 1u64 << gc;
            }
        } else if let Some(rng) = prng.as_deref_mut() {
            for v in output[sparse..].iter_mut() {
                v.randomize(rng);
            }
        }

        let w = self.params.weight;
        for k in (0..main_rows.len()).rev() {
            let i = main_rows[k].as_usize();
            let c = main_cols[k].as_usize();
            let mut y = values[i];
            for j in 0..w {
                y.add_assign(&output[self.rows[i * w + j].as_usize()]);
            }
            let d = self.dense[i].get_u64(0);
            if randomized {
                let mut d = d;
                for j in 0..dense_size {
                    if d & 1 == 1 {
                        y.add_assign(&output[sparse + j]);
                    }
                    d >>= 1;
                }
            } else {
                for j in 0..g {
                    if d & dense_masks[j] != 0 {
                        y.add_assign(&output[sparse + gap_cols[j] as usize]);
                    }
                }
            }
            output[c] = y;
        }
        Ok(())
    }

    /// Solve the gap system over GF(2^128); dense column `j` of a row is
    /// the `(j+1)`th field power of its dense word.
    fn backfill_gf128<V: Value>(
        &self,
        main_rows: &[I],
        main_cols: &[I],
        gap_rows: &[[I; 2]],
        values: &[V],
        output: &mut [V],
        mut prng: Option<&mut AesRng>,
    ) -> Result<(), Error> {
        debug_assert_eq!(self.params.dt, DenseType::GF128);
        let g = gap_rows.len();
        let sparse = self.sparse_size();
        let dense_size = self.dense_size();
        if g > dense_size {
            return Err(Error::CapacityExceeded {
                size: g,
                limit: dense_size,
            });
        }
        let randomized = prng.is_some();

        if g > 0 {
            let fcinv = self.get_fc_inv(main_rows, main_cols, gap_rows);
            // When randomizing, solve for every dense position so none is
            // left zero; otherwise only the g pivots are needed.
            let size = if randomized { dense_size } else { g };
            let mut ee = Matrix::<Block>::new(size, size);
            let mut xx = vec![V::zero(); size];

            for i in 0..g {
                let e = self.dense[gap_rows[i][0].as_usize()];
                let mut ej = e;
                ee.set(i, 0, e);
                for j in 1..size {
                    ej = ej.gf128_mul(e);
                    ee.set(i, j, ej);
                }

                xx[i] = values[gap_rows[i][0].as_usize()];
                for &j in &fcinv.mtx[i] {
                    xx[i].add_assign(&values[j]);
                    let fcb = self.dense[j];
                    let mut fcbk = fcb;
                    ee.set(i, 0, ee.get(i, 0) ^ fcbk);
                    for k in 1..size {
                        fcbk = fcbk.gf128_mul(fcb);
                        ee.set(i, k, ee.get(i, k) ^ fcbk);
                    }
                }
            }

            if let Some(rng) = prng.as_deref_mut() {
                for i in g..size {
                    for c in ee.row_mut(i) {
                        *c = rng.gen();
                    }
                    xx[i].randomize(rng);
                }
            }

            let ee_inv = ee.gf128_inverse().ok_or(Error::SingularMatrix)?;
            for i in 0..size {
                let mut pp = output[sparse + i];
                for (j, x) in xx.iter().enumerate() {
                    pp.gf128_mul_add(x, ee_inv.get(i, j));
                }
                output[sparse + i] = pp;
            }
        } else if let Some(rng) = prng.as_deref_mut() {
            for v in output[sparse..].iter_mut() {
                v.randomize(rng);
            }
        }

        let w = self.params.weight;
        let do_dense = g > 0 || randomized;
        for k in (0..main_rows.len()).rev() {
            let i = main_rows[k].as_usize();
            let c = main_cols[k].as_usize();
            let mut y = values[i];
            for j in 0..w {
                y.add_assign(&output[self.rows[i * w + j].as_usize()]);
            }
            if do_dense {
                let d = self.dense[i];
                let mut x = d;
                y.gf128_mul_add(&output[sparse], x);
                for jj in 1..dense_size {
                    x = x.gf128_mul(d);
                    y.gf128_mul_add(&output[sparse + jj], x);
                }
            }
            output[c] = y;
        }
        Ok(())
    }

    /// For each gap row, the set of main rows whose sum cancels its sparse
    /// part. Identical sparse rows short-circuit to the paired main row.
    fn get_fc_inv(&self, main_rows: &[I], main_cols: &[I], gap_rows: &[[I; 2]]) -> FcInv {
        let w = self.params.weight;
        let m = main_rows.len();
        // Main rows were collected in reverse triangular order.
        let invert = |i: usize| m - i - 1;
        let mut col_mapping: Vec<u64> = Vec::new();
        let mut ret = FcInv {
            mtx: vec![Vec::new(); gap_rows.len()],
        };

        for (i, gr) in gap_rows.iter().enumerate() {
            let r0 = gr[0].as_usize();
            let r1 = gr[1].as_usize();
            if self.rows[r0 * w..(r0 + 1) * w] == self.rows[r1 * w..(r1 + 1) * w] {
                ret.mtx[i].push(r1);
                continue;
            }

            // Build the H-column to C-column mapping on first use.
            if col_mapping.is_empty() {
                col_mapping = vec![u64::MAX; self.size()];
                for k in 0..m {
                    col_mapping[main_cols[invert(k)].as_usize()] = k as u64;
                }
            }

            // The current row of F, as C-column indices; cancel from the
            // highest column downward by adding rows of C.
            let mut row: BTreeSet<u64> = BTreeSet::new();
            for j in 0..w {
                let c1 = self.rows[r0 * w + j].as_usize();
                if col_mapping[c1] != u64::MAX {
                    row.insert(col_mapping[c1]);
                }
            }

            while let Some(&c_col) = row.iter().next_back() {
                let h_row = main_rows[invert(c_col as usize)].as_usize();
                ret.mtx[i].push(h_row);
                for j in 0..w {
                    let c2 = col_mapping[self.rows[h_row * w + j].as_usize()];
                    if c2 != u64::MAX {
                        debug_assert!(c2 <= c_col);
                        // Toggle: adding the row twice cancels.
                        if !row.insert(c2) {
                            row.remove(&c2);
                        }
                    }
                }
                debug_assert!(row.iter().next_back() != Some(&c_col));
            }
        }
        ret
    }

    /// Search the dense columns for a subset whose gap submatrix `E'` is
    /// invertible over GF(2).
    fn get_gap_cols(&self, fcinv: &FcInv, gap_rows: &[[I; 2]]) -> Result<Vec<u64>, Error> {
        if gap_rows.is_empty() {
            return Ok(Vec::new());
        }
        let g = gap_rows.len() as u64;
        let total = choose(self.params.dense_size, g);
        let mut ci = 0u64;
        loop {
            if ci >= total {
                return Err(Error::SingularMatrix);
            }
            let gap_cols = ith_combination(ci, self.params.dense_size, g);
            ci += 1;

            let mut ee = DenseMtx::new(g as usize, g as usize);
            for i in 0..g as usize {
                // E' row = E + FC^-1 B
                let mut ee_row = self.dense[gap_rows[i][0].as_usize()];
                for &c in &fcinv.mtx[i] {
                    ee_row ^= self.dense[c];
                }
                for (j, &gc) in gap_cols.iter().enumerate() {
                    ee.set_bit(i, j, (ee_row.0 >> gc) & 1 == 1);
                }
            }
            if ee.invert().is_some() {
                return Ok(gap_cols);
            }
        }
    }

    /// `x2' = x2 - D' r - FC^-1 x1`, the right-hand side of the gap system.
    fn get_x2_prime<V: Value>(
        &self,
        fcinv: &FcInv,
        gap_rows: &[[I; 2]],
        gap_cols: &[u64],
        values: &[V],
        output: &[V],
        randomized: bool,
    ) -> Vec<V> {
        let g = gap_rows.len();
        let mut xx2 = vec![V::zero(); g];
        for i in 0..g {
            xx2[i] = values[gap_rows[i][0].as_usize()];
            for &j in &fcinv.mtx[i] {
                xx2[i].add_assign(&values[j]);
            }
        }
        if randomized {
            // D' only has a dense part: identical sparse rows cancel, and
            // the cancellation rows of C contribute no free columns.
            let p2 = &output[self.sparse_size()..];
            for i in 0..self.params.dense_size {
                if gap_cols.contains(&i) {
                    continue;
                }
                for j in 0..g {
                    let mut dense = self.dense[gap_rows[j][0].as_usize()];
                    for &k in &fcinv.mtx[j] {
                        dense ^= self.dense[k];
                    }
                    if (dense.0 >> i) & 1 == 1 {
                        xx2[j].add_assign(&p2[i as usize]);
                    }
                }
            }
        }
        xx2
    }

    /// `E' = E - FC^-1 B` restricted to the chosen gap columns.
    fn get_e_prime(&self, fcinv: &FcInv, gap_rows: &[[I; 2]], gap_cols: &[u64]) -> DenseMtx {
        let g = gap_rows.len();
        let mut ee = DenseMtx::new(g, g);
        for i in 0..g {
            let mut ee_row = self.dense[gap_rows[i][0].as_usize()];
            for &j in &fcinv.mtx[i] {
                ee_row ^= self.dense[j];
            }
            for (j, &gc) in gap_cols.iter().enumerate() {
                ee.set_bit(i, j, (ee_row.0 >> gc) & 1 == 1);
            }
        }
        ee
    }

    /// Randomize the dense positions that are not gap pivots.
    fn randomize_dense_cols<V: Value>(&self, p2: &mut [V], gap_cols: &[u64], rng: &mut AesRng) {
        for i in 0..self.params.dense_size {
            if !gap_cols.contains(&i) {
                p2[i as usize].randomize(rng);
            }
        }
    }

    /// Decode each input item against the output vector `p`.
    pub fn decode<V: Value>(
        &self,
        inputs: &[Block],
        values: &mut [V],
        p: &[V],
    ) -> Result<(), Error> {
        if values.len() != inputs.len() {
            return Err(Error::InvalidInputLength {
                expected: inputs.len(),
                found: values.len(),
            });
        }
        if p.len() != self.size() {
            return Err(Error::InvalidOutputLength {
                expected: self.size(),
                found: p.len(),
            });
        }
        let w = self.params.weight;
        let main = inputs.len() / PAXOS_BATCH * PAXOS_BATCH;
        let mut rows = vec![I::from_u64(0); PAXOS_BATCH * w];
        let mut dense = [Block::ZERO; PAXOS_BATCH];
        let mut buff = vec![V::zero(); PAXOS_BATCH];

        let mut i = 0;
        while i < main {
            self.hasher
                .hash_build_row32(&inputs[i..i + PAXOS_BATCH], &mut rows, &mut dense);
            if self.add_to_decode {
                self.decode32(&rows, &dense, &mut buff, p);
                for (v, b) in values[i..i + PAXOS_BATCH].iter_mut().zip(buff.iter()) {
                    v.add_assign(b);
                }
            } else {
                self.decode32(&rows, &dense, &mut values[i..i + PAXOS_BATCH], p);
            }
            i += PAXOS_BATCH;
        }
        let mut row = vec![I::from_u64(0); w];
        for i in main..inputs.len() {
            let d = self.hasher.hash_build_row1(inputs[i], &mut row);
            if self.add_to_decode {
                let mut t = V::zero();
                self.decode1(&row, d, &mut t, p);
                values[i].add_assign(&t);
            } else {
                self.decode1(&row, d, &mut values[i], p);
            }
        }
        Ok(())
    }

    /// Decode a batch of `PAXOS_BATCH` pre-hashed rows.
    pub(crate) fn decode32<V: Value>(&self, rows: &[I], dense: &[Block], values: &mut [V], p: &[V]) {
        let w = self.params.weight;
        debug_assert_eq!(rows.len(), PAXOS_BATCH * w);
        debug_assert_eq!(dense.len(), PAXOS_BATCH);
        debug_assert_eq!(values.len(), PAXOS_BATCH);
        for (k, v) in values.iter_mut().enumerate() {
            *v = p[rows[k * w].as_usize()];
        }
        for j in 1..w {
            for (k, v) in values.iter_mut().enumerate() {
                v.add_assign(&p[rows[k * w + j].as_usize()]);
            }
        }
        let sparse = self.sparse_size();
        let dense_size = self.dense_size();
        match self.params.dt {
            DenseType::GF128 => {
                let mut x = [Block::ZERO; PAXOS_BATCH];
                x.copy_from_slice(dense);
                for (k, v) in values.iter_mut().enumerate() {
                    v.gf128_mul_add(&p[sparse], x[k]);
                }
                for i in 1..dense_size {
                    for (k, v) in values.iter_mut().enumerate() {
                        x[k] = x[k].gf128_mul(dense[k]);
                        v.gf128_mul_add(&p[sparse + i], x[k]);
                    }
                }
            }
            DenseType::Binary => {
                let mut d = [0u64; PAXOS_BATCH];
                for (dk, b) in d.iter_mut().zip(dense.iter()) {
                    *dk = b.get_u64(0);
                }
                for i in 0..dense_size {
                    for (k, v) in values.iter_mut().enumerate() {
                        if d[k] & 1 == 1 {
                            v.add_assign(&p[sparse + i]);
                        }
                        d[k] >>= 1;
                    }
                }
            }
        }
    }

    /// Decode a single pre-hashed row.
    pub(crate) fn decode1<V: Value>(&self, row: &[I], dense: Block, value: &mut V, p: &[V]) {
        let w = self.params.weight;
        debug_assert_eq!(row.len(), w);
        let mut y = p[row[0].as_usize()];
        for c in &row[1..] {
            y.add_assign(&p[c.as_usize()]);
        }
        let sparse = self.sparse_size();
        let dense_size = self.dense_size();
        match self.params.dt {
            DenseType::GF128 => {
                let mut x = dense;
                y.gf128_mul_add(&p[sparse], x);
                for i in 1..dense_size {
                    x = x.gf128_mul(dense);
                    y.gf128_mul_add(&p[sparse + i], x);
                }
            }
            DenseType::Binary => {
                let mut d = dense.get_u64(0);
                for i in 0..dense_size {
                    if d & 1 == 1 {
                        y.add_assign(&p[sparse + i]);
                    }
                    d >>= 1;
                }
            }
        }
        *value = y;
    }
}
