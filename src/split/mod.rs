//! Video-level holdout splitting and row gathering.
//!
//! A video is never split across train and test: per class,
//! `floor(n_c * test_fraction)` whole videos are drawn (seeded, without
//! replacement) for the test set and the rest train. Video choices expand
//! into sample ranges through the table's cumulative offsets.

use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::error::{CoreResult, PipelineError};
use crate::table::VideoTable;

pub mod balance;
pub mod kfold;

pub use balance::balance_classes;
pub use kfold::{CrossValidator, Fold, Folds};

/// Global video indices of each side, in split order: class by class,
/// ascending inside a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldoutSplit {
    pub train_videos: Vec<usize>,
    pub test_videos: Vec<usize>,
}

impl HoldoutSplit {
    pub fn train_ranges(&self, table: &VideoTable) -> Vec<Range<usize>> {
        video_ranges(table, &self.train_videos)
    }

    pub fn test_ranges(&self, table: &VideoTable) -> Vec<Range<usize>> {
        video_ranges(table, &self.test_videos)
    }
}

pub fn split(table: &VideoTable, test_fraction: f64, seed: u64) -> CoreResult<HoldoutSplit> {
    if !(0.0..1.0).contains(&test_fraction) {
        return Err(PipelineError::config(format!(
            "test fraction {} outside [0, 1)",
            test_fraction
        )));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_videos = Vec::with_capacity(table.n_videos());
    let mut test_videos = Vec::new();
    for class_id in 0..table.n_classes() {
        let videos = table.class_videos(class_id);
        let n = videos.len();
        let n_test = (n as f64 * test_fraction).floor() as usize;
        let mut chosen = rand::seq::index::sample(&mut rng, n, n_test).into_vec();
        chosen.sort_unstable();
        let mut is_test = vec![false; n];
        for &c in &chosen {
            is_test[c] = true;
        }
        test_videos.extend(chosen.iter().map(|&c| videos.start + c));
        train_videos.extend(
            videos
                .clone()
                .zip(&is_test)
                .filter(|(_, &t)| !t)
                .map(|(v, _)| v),
        );
    }
    Ok(HoldoutSplit {
        train_videos,
        test_videos,
    })
}

pub fn video_ranges(table: &VideoTable, videos: &[usize]) -> Vec<Range<usize>> {
    let offsets = table.offsets();
    videos
        .iter()
        .map(|&v| offsets[v]..offsets[v + 1])
        .collect()
}

/// Drops the trailing `window` samples of every range. Appearance streams
/// carry that many more samples per video than the temporal stream.
pub fn dewindow(ranges: &[Range<usize>], window: usize) -> Vec<Range<usize>> {
    ranges
        .iter()
        .map(|r| r.start..r.end.saturating_sub(window).max(r.start))
        .collect()
}

/// Positions of `ranges` inside the concatenation produced by `gather`.
pub fn relative_ranges(ranges: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut start = 0;
    ranges
        .iter()
        .map(|r| {
            let local = start..start + r.len();
            start = local.end;
            local
        })
        .collect()
}

pub fn ranges_len(ranges: &[Range<usize>]) -> usize {
    ranges.iter().map(|r| r.len()).sum()
}

pub fn gather_rows(x: ArrayView2<'_, f64>, ranges: &[Range<usize>]) -> Array2<f64> {
    let indices: Vec<usize> = ranges.iter().cloned().flatten().collect();
    x.select(Axis(0), &indices)
}

pub fn gather(y: ArrayView1<'_, f64>, ranges: &[Range<usize>]) -> Array1<f64> {
    ranges
        .iter()
        .cloned()
        .flatten()
        .map(|i| y[i])
        .collect()
}

/// Checks that the ranges cover `[0, total)` exactly once.
pub fn verify_partition(ranges: &[Range<usize>], total: usize) -> CoreResult<()> {
    let mut seen = vec![false; total];
    for r in ranges {
        for i in r.clone() {
            if i >= total || seen[i] {
                return Err(PipelineError::Table(format!(
                    "sample {} is out of range or assigned twice",
                    i
                )));
            }
            seen[i] = true;
        }
    }
    if let Some(missing) = seen.iter().position(|&s| !s) {
        return Err(PipelineError::Table(format!(
            "sample {} is not assigned to any side",
            missing
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dewindow_truncates_each_range() {
        let r = dewindow(&[0..12, 12..15, 15..30], 10);
        assert_eq!(r, vec![0..2, 12..12, 15..20]);
    }

    #[test]
    fn gather_follows_range_order() {
        let y = ndarray::array![0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(gather(y.view(), &[3..5, 0..1]).to_vec(), vec![3.0, 4.0, 0.0]);
    }
}
