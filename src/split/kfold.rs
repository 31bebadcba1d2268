use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{CoreResult, PipelineError};

/// Stratified k-fold over per-class sample pools.
///
/// Each pool is cut into `k` contiguous partitions independently: the first
/// `len % k` partitions get one extra sample. Fold `f` tests partition `f`
/// of every pool and trains on the rest.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    pools: Vec<Vec<usize>>,
    k: usize,
}

/// One fold, as global sample indices grouped pool by pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl CrossValidator {
    pub fn new(pools: Vec<Vec<usize>>, k: usize) -> CoreResult<Self> {
        if k < 2 {
            return Err(PipelineError::config(format!(
                "cross validation needs at least 2 splits, got {}",
                k
            )));
        }
        for (c, pool) in pools.iter().enumerate() {
            if k > pool.len() {
                return Err(PipelineError::config(format!(
                    "cannot make {} splits from {} samples of class {}",
                    k,
                    pool.len(),
                    c
                )));
            }
        }
        Ok(Self { pools, k })
    }

    /// Pools of sample indices per label, ascending.
    pub fn from_labels(labels: &[f64], k: usize) -> CoreResult<Self> {
        let mut pools = vec![Vec::new(), Vec::new()];
        for (i, &label) in labels.iter().enumerate() {
            match label {
                l if l == 0.0 => pools[0].push(i),
                l if l == 1.0 => pools[1].push(i),
                value => return Err(PipelineError::InvalidLabel { index: i, value }),
            }
        }
        Self::new(pools, k)
    }

    /// Shuffles every pool once, before partitioning.
    pub fn shuffled(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        for pool in &mut self.pools {
            pool.shuffle(&mut rng);
        }
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn pools(&self) -> &[Vec<usize>] {
        &self.pools
    }

    /// Fresh iterator over exactly `k` folds; call again to restart.
    pub fn folds(&self) -> Folds<'_> {
        Folds { cv: self, next: 0 }
    }

    fn partition(&self, pool_len: usize, fold: usize) -> (usize, usize) {
        let base = pool_len / self.k;
        let extra = pool_len % self.k;
        let start = fold * base + fold.min(extra);
        let len = base + usize::from(fold < extra);
        (start, start + len)
    }

    fn fold(&self, index: usize) -> Fold {
        let mut train = Vec::new();
        let mut test = Vec::new();
        for pool in &self.pools {
            let (start, end) = self.partition(pool.len(), index);
            train.extend_from_slice(&pool[..start]);
            test.extend_from_slice(&pool[start..end]);
            train.extend_from_slice(&pool[end..]);
        }
        Fold { index, train, test }
    }
}

#[derive(Debug, Clone)]
pub struct Folds<'a> {
    cv: &'a CrossValidator,
    next: usize,
}

impl Iterator for Folds<'_> {
    type Item = Fold;

    fn next(&mut self) -> Option<Fold> {
        if self.next >= self.cv.k {
            return None;
        }
        let fold = self.cv.fold(self.next);
        self.next += 1;
        Some(fold)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.cv.k - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Folds<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_sizes_match_kfold() {
        let cv = CrossValidator::new(vec![(0..11).collect()], 3).unwrap();
        let sizes: Vec<usize> = cv.folds().map(|f| f.test.len()).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
        let first = cv.folds().next().unwrap();
        assert_eq!(first.test, vec![0, 1, 2, 3]);
    }

    #[test]
    fn too_many_splits_rejected() {
        let err = CrossValidator::new(vec![vec![0, 1], vec![2, 3, 4]], 3).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
