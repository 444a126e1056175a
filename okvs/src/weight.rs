//! Priority structure over column weights used by triangulation.
//!
//! Columns live in an arena of doubly linked nodes, bucketed by current
//! weight. The bucket array is trimmed from the top as high weights die out,
//! so the live maximum weight is always `sets.len() - 1`.

use crate::hash::PaxosIdx;

#[derive(Clone, Copy, Debug)]
struct WeightNode<I> {
    prev: I,
    next: I,
    weight: I,
}

/// Bucket queue over column weights, keyed by node (column) index.
#[derive(Clone)]
pub(crate) struct WeightData<I> {
    // Head node index per weight, `I::NULL` when empty. Trailing empty
    // buckets are trimmed.
    sets: Vec<I>,
    nodes: Vec<WeightNode<I>>,
}

impl<I: PaxosIdx> WeightData<I> {
    pub fn new() -> Self {
        WeightData {
            sets: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Number of live buckets; `<= 1` means only weight-zero columns remain.
    #[inline]
    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn weight_of(&self, node: usize) -> I {
        self.nodes[node].weight
    }

    /// Rebuild the structure from per-column weights.
    pub fn init(&mut self, weights: &[I]) {
        let max_weight = weights
            .iter()
            .map(|w| w.as_usize())
            .max()
            .unwrap_or(0);
        self.sets.clear();
        self.sets.resize(max_weight + 1, I::NULL);
        self.nodes.clear();
        self.nodes.resize(
            weights.len(),
            WeightNode {
                prev: I::NULL,
                next: I::NULL,
                weight: I::NULL,
            },
        );
        for (i, w) in weights.iter().enumerate() {
            self.nodes[i].weight = *w;
            self.push(i);
        }
    }

    /// Link `node` at the head of its weight's bucket.
    pub fn push(&mut self, node: usize) {
        let w = self.nodes[node].weight.as_usize();
        if self.sets.len() <= w {
            self.sets.resize(w + 1, I::NULL);
        }
        let head = self.sets[w];
        self.nodes[node].prev = I::NULL;
        self.nodes[node].next = head;
        if head != I::NULL {
            self.nodes[head.as_usize()].prev = I::from_u64(node as u64);
        }
        self.sets[w] = I::from_u64(node as u64);
    }

    /// Unlink `node` from its bucket, trimming trailing empty buckets.
    pub fn pop(&mut self, node: usize) {
        let WeightNode { prev, next, weight } = self.nodes[node];
        if prev == I::NULL {
            let w = weight.as_usize();
            debug_assert_eq!(self.sets[w].as_usize(), node);
            self.sets[w] = next;
            if next == I::NULL {
                while self.sets.last() == Some(&I::NULL) {
                    self.sets.pop();
                }
            } else {
                self.nodes[next.as_usize()].prev = I::NULL;
            }
        } else {
            self.nodes[prev.as_usize()].next = next;
            if next != I::NULL {
                self.nodes[next.as_usize()].prev = prev;
            }
        }
        self.nodes[node].prev = I::NULL;
        self.nodes[node].next = I::NULL;
    }

    /// Mark an unlinked `node` as consumed so later decrements skip it.
    pub fn clear_weight(&mut self, node: usize) {
        debug_assert_eq!(self.nodes[node].prev, I::NULL);
        debug_assert_eq!(self.nodes[node].next, I::NULL);
        self.nodes[node].weight = I::from_u64(0);
    }

    /// Move `node` down one weight bucket.
    pub fn decrement(&mut self, node: usize) {
        debug_assert!(self.nodes[node].weight.as_u64() > 0);
        self.pop(node);
        let w = self.nodes[node].weight.as_u64() - 1;
        self.nodes[node].weight = I::from_u64(w);
        self.push(node);
    }

    /// The head of the lowest nonempty bucket of weight at least one.
    ///
    /// Triangulation only calls this while such a bucket exists; the bucket
    /// trim invariant guarantees the scan finds one.
    pub fn min_weight_node(&self) -> usize {
        for i in 1..self.sets.len() {
            if self.sets[i] != I::NULL {
                return self.sets[i].as_usize();
            }
        }
        unreachable!("no column of weight >= 1 remains")
    }

    /// Iterate the node indices in the bucket for `weight`.
    pub fn set_iter(&self, weight: usize) -> SetIter<'_, I> {
        SetIter {
            data: self,
            cur: if weight < self.sets.len() {
                self.sets[weight]
            } else {
                I::NULL
            },
        }
    }
}

pub(crate) struct SetIter<'a, I> {
    data: &'a WeightData<I>,
    cur: I,
}

impl<I: PaxosIdx> Iterator for SetIter<'_, I> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cur == I::NULL {
            None
        } else {
            let i = self.cur.as_usize();
            self.cur = self.data.nodes[i].next;
            Some(i)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_and_min() {
        let mut wd = WeightData::<u16>::new();
        wd.init(&[0, 2, 1, 3, 1]);
        assert_eq!(wd.num_sets(), 4);
        let min = wd.min_weight_node();
        assert_eq!(wd.weight_of(min), 1);
    }

    #[test]
    fn test_pop_trims() {
        let mut wd = WeightData::<u16>::new();
        wd.init(&[0, 1, 3]);
        assert_eq!(wd.num_sets(), 4);
        wd.pop(2);
        assert_eq!(wd.num_sets(), 2);
        wd.pop(1);
        assert_eq!(wd.num_sets(), 1);
    }

    #[test]
    fn test_decrement_moves_buckets() {
        let mut wd = WeightData::<u16>::new();
        wd.init(&[2, 2, 2]);
        wd.decrement(1);
        assert_eq!(wd.weight_of(1), 1);
        assert_eq!(wd.min_weight_node(), 1);
        wd.decrement(1);
        // Node 1 now sits in the zero bucket.
        assert!(wd.set_iter(0).any(|n| n == 1));
        assert_ne!(wd.min_weight_node(), 1);
    }

    #[test]
    fn test_set_iter_covers_bucket() {
        let mut wd = WeightData::<u16>::new();
        wd.init(&[1, 1, 1, 0]);
        let mut ones: Vec<usize> = wd.set_iter(1).collect();
        ones.sort_unstable();
        assert_eq!(ones, vec![0, 1, 2]);
        assert_eq!(wd.set_iter(0).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_drain_by_min() {
        let mut wd = WeightData::<u8>::new();
        wd.init(&[1, 2, 3, 2, 1]);
        let mut seen = Vec::new();
        while wd.num_sets() > 1 {
            let n = wd.min_weight_node();
            wd.pop(n);
            seen.push(n);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
