//! Binary min-heap keyed by a field of the stored item
//!
//! Unlike `std::collections::BinaryHeap` the ordering key is chosen at
//! construction, equal keys are never swapped, and the backing storage can be
//! inspected directly.

use std::fmt;

pub struct MinHeap<T, K, F>
where
    F: Fn(&T) -> K,
    K: PartialOrd,
{
    items: Vec<T>,
    key: F,
}

impl<T, K, F> MinHeap<T, K, F>
where
    F: Fn(&T) -> K,
    K: PartialOrd,
{
    /// Empty heap ordered ascending by `key`
    pub fn new(key: F) -> Self {
        Self {
            items: Vec::new(),
            key,
        }
    }

    pub fn with_capacity(capacity: usize, key: F) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            key,
        }
    }

    pub fn insert(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Remove and return the item with the smallest key
    pub fn extract_min(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let min = self.items.swap_remove(0);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(min)
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Backing storage in heap order
    pub fn dump(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn greater(&self, a: usize, b: usize) -> bool {
        (self.key)(&self.items[a]) > (self.key)(&self.items[b])
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.greater(parent, index) {
                break;
            }
            self.items.swap(parent, index);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let smaller = if right < len && self.greater(left, right) {
                right
            } else {
                left
            };
            if !self.greater(index, smaller) {
                break;
            }
            self.items.swap(index, smaller);
            index = smaller;
        }
    }
}

impl<T, K, F> fmt::Debug for MinHeap<T, K, F>
where
    T: fmt::Debug,
    F: Fn(&T) -> K,
    K: PartialOrd,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinHeap").field("items", &self.items).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Load {
        id: usize,
        total: f64,
    }

    fn heap() -> MinHeap<Load, f64, fn(&Load) -> f64> {
        MinHeap::new(|l: &Load| l.total)
    }

    #[test]
    fn test_empty_extract_is_none() {
        let mut heap = heap();
        assert!(heap.extract_min().is_none());
        assert!(heap.peek().is_none());
        assert!(heap.is_empty());
    }

    #[test]
    fn test_single_item() {
        let mut heap = heap();
        heap.insert(Load { id: 0, total: 5.0 });
        assert_eq!(heap.extract_min().unwrap().id, 0);
        assert!(heap.extract_min().is_none());
    }

    #[test]
    fn test_extracts_in_ascending_order() {
        let mut heap = heap();
        for (id, total) in [9.0, 3.0, 7.0, 1.0, 8.0, 2.0, 2.5].into_iter().enumerate() {
            heap.insert(Load { id, total });
        }
        assert_eq!(heap.peek().unwrap().total, 1.0);

        let mut out = Vec::new();
        while let Some(item) = heap.extract_min() {
            out.push(item.total);
        }
        assert_eq!(out, vec![1.0, 2.0, 2.5, 3.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_equal_keys_keep_root() {
        let mut heap = heap();
        for id in 0..4 {
            heap.insert(Load { id, total: 0.0 });
        }
        assert_eq!(heap.peek().unwrap().id, 0);
        assert_eq!(heap.dump().iter().map(|l| l.id).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_interleaved_operations_against_model() {
        // deterministic pseudo-random sequence
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        let mut heap = heap();
        let mut model: Vec<f64> = Vec::new();
        let mut inserted = 0;
        let mut extracted = 0;

        for _ in 0..2_000 {
            if next() % 3 == 0 {
                let got = heap.extract_min().map(|l| l.total);
                let expected = if model.is_empty() {
                    None
                } else {
                    let (idx, _) = model
                        .iter()
                        .enumerate()
                        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                        .unwrap();
                    Some(model.remove(idx))
                };
                assert_eq!(got, expected);
                if got.is_some() {
                    extracted += 1;
                }
            } else {
                let total = (next() % 1000) as f64;
                heap.insert(Load { id: inserted, total });
                model.push(total);
                inserted += 1;
            }
            assert_eq!(heap.len(), inserted - extracted);
        }
    }

    #[test]
    fn test_clear() {
        let mut heap = heap();
        heap.insert(Load { id: 0, total: 1.0 });
        heap.clear();
        assert!(heap.is_empty());
    }
}
