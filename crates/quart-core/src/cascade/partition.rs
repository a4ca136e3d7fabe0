//! Block partitions for one Cascade iteration.

use crate::error::{Error, Result};

/// Disjoint blocks over every key index, stored flat.
///
/// `order` lists key indices block after block; block `b` is
/// `order[bounds[b]..bounds[b + 1]]`. `block_of` maps a key index back to
/// the block that holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    order: Vec<usize>,
    bounds: Vec<usize>,
    block_of: Vec<usize>,
}

impl Partition {
    /// Contiguous blocks `[0, size)`, `[size, 2 * size)`, ... over `len` indices.
    pub fn contiguous(len: usize, block_size: usize) -> Self {
        Self::build((0..len).collect(), block_size)
    }

    /// Blocks over a permuted index order. `order` must be a permutation of `0..len`.
    pub fn permuted(order: Vec<usize>, len: usize, block_size: usize) -> Result<Self> {
        if order.len() != len {
            return Err(Error::desync(
                format!("permutation of {len} indices"),
                format!("{} indices", order.len()),
            ));
        }
        let mut seen = vec![false; len];
        for &i in &order {
            match seen.get_mut(i) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(Error::desync(
                        format!("permutation of {len} indices"),
                        format!("repeated or out-of-range index {i}"),
                    ));
                }
            }
        }
        Ok(Self::build(order, block_size))
    }

    fn build(order: Vec<usize>, block_size: usize) -> Self {
        let size = block_size.max(1);
        let len = order.len();
        let mut bounds: Vec<usize> = (0..len).step_by(size).collect();
        bounds.push(len);

        let mut block_of = vec![0; len];
        for (b, window) in bounds.windows(2).enumerate() {
            for &index in &order[window[0]..window[1]] {
                block_of[index] = b;
            }
        }
        Self {
            order,
            bounds,
            block_of,
        }
    }

    pub fn block_count(&self) -> usize {
        self.bounds.len() - 1
    }

    /// Key indices in block `b`.
    pub fn block(&self, b: usize) -> &[usize] {
        &self.order[self.bounds[b]..self.bounds[b + 1]]
    }

    /// Block that contains key index `index`.
    pub fn block_of(&self, index: usize) -> usize {
        self.block_of[index]
    }

    /// Parity of every block of `key`.
    pub fn parities(&self, key: &[bool]) -> Vec<bool> {
        (0..self.block_count())
            .map(|b| parity(key, self.block(b)))
            .collect()
    }
}

/// XOR of the key bits at `indices`.
pub fn parity(key: &[bool], indices: &[usize]) -> bool {
    indices.iter().fold(false, |acc, &i| acc ^ key[i])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_covers_every_index() {
        let p = Partition::contiguous(10, 4);
        assert_eq!(p.block_count(), 3);
        assert_eq!(p.block(0), &[0, 1, 2, 3]);
        assert_eq!(p.block(2), &[8, 9]);
        assert_eq!(p.block_of(9), 2);
        let total: usize = (0..p.block_count()).map(|b| p.block(b).len()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn block_larger_than_key_is_one_block() {
        let p = Partition::contiguous(5, 200);
        assert_eq!(p.block_count(), 1);
        assert_eq!(p.block(0).len(), 5);
    }

    #[test]
    fn empty_key_has_no_blocks() {
        let p = Partition::contiguous(0, 3);
        assert_eq!(p.block_count(), 0);
        assert!(p.parities(&[]).is_empty());
    }

    #[test]
    fn permuted_blocks_follow_order() {
        let p = Partition::permuted(vec![3, 0, 2, 1], 4, 2).unwrap();
        assert_eq!(p.block(0), &[3, 0]);
        assert_eq!(p.block(1), &[2, 1]);
        assert_eq!(p.block_of(0), 0);
        assert_eq!(p.block_of(1), 1);
    }

    #[test]
    fn permuted_rejects_non_permutations() {
        assert!(Partition::permuted(vec![0, 0, 1], 3, 2).is_err());
        assert!(Partition::permuted(vec![0, 1, 5], 3, 2).is_err());
        assert!(Partition::permuted(vec![0, 1], 3, 2).is_err());
    }

    #[test]
    fn parities_per_block() {
        let key = [true, true, false, true, false];
        let p = Partition::contiguous(5, 2);
        assert_eq!(p.parities(&key), vec![false, true, false]);
    }
}
