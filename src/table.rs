//! Video-ordered index over a flat sample store.
//!
//! Samples of every video of every class are concatenated in one flat
//! vector. `VideoTable` records, per video and in storage order, which class
//! it belongs to, its ordinal inside that class and how many samples it
//! contributed. Offsets, per-class counts and per-class video ranges all
//! derive from these records.

use std::ops::Range;

use serde::Serialize;

use crate::error::{CoreResult, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoRecord {
    pub class_id: usize,
    /// Ordinal of the video inside its class, 0-based.
    pub video_id: usize,
    pub stack_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoTable {
    records: Vec<VideoRecord>,
    n_classes: usize,
}

impl VideoTable {
    /// Builds the table from the persisted arrays: per-video sample counts
    /// (video-index ordered) and per-class video counts (class-index ordered).
    pub fn from_counts(samples: &[i64], num: &[i64]) -> CoreResult<Self> {
        let mut per_class = Vec::with_capacity(num.len());
        for (c, &n) in num.iter().enumerate() {
            if n < 0 {
                return Err(PipelineError::Table(format!(
                    "class {} has negative video count {}",
                    c, n
                )));
            }
            per_class.push(n as usize);
        }
        let declared: usize = per_class.iter().sum();
        if declared != samples.len() {
            return Err(PipelineError::length(
                "per-class video counts vs per-video sample counts",
                declared,
                samples.len(),
            ));
        }

        let mut records = Vec::with_capacity(samples.len());
        let mut v = 0usize;
        for (class_id, &n_videos) in per_class.iter().enumerate() {
            for video_id in 0..n_videos {
                let count = samples[v];
                if count < 0 {
                    return Err(PipelineError::Table(format!(
                        "video {} has negative sample count {}",
                        v, count
                    )));
                }
                records.push(VideoRecord {
                    class_id,
                    video_id,
                    stack_count: count as usize,
                });
                v += 1;
            }
        }
        Ok(Self {
            records,
            n_classes: per_class.len(),
        })
    }

    /// Builds the table directly from records; records of one class must be
    /// contiguous and classes must appear in ascending order.
    pub fn from_records(records: Vec<VideoRecord>, n_classes: usize) -> CoreResult<Self> {
        let mut expected_class = 0usize;
        let mut expected_video = 0usize;
        for (i, r) in records.iter().enumerate() {
            if r.class_id >= n_classes {
                return Err(PipelineError::Table(format!(
                    "record {} names class {} but only {} classes exist",
                    i, r.class_id, n_classes
                )));
            }
            if r.class_id != expected_class {
                if r.class_id < expected_class {
                    return Err(PipelineError::Table(format!(
                        "record {} breaks class ordering",
                        i
                    )));
                }
                expected_class = r.class_id;
                expected_video = 0;
            }
            if r.video_id != expected_video {
                return Err(PipelineError::Table(format!(
                    "record {} has video ordinal {}, expected {}",
                    i, r.video_id, expected_video
                )));
            }
            expected_video += 1;
        }
        Ok(Self { records, n_classes })
    }

    pub fn records(&self) -> &[VideoRecord] {
        &self.records
    }

    pub fn n_videos(&self) -> usize {
        self.records.len()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn total_samples(&self) -> usize {
        self.records.iter().map(|r| r.stack_count).sum()
    }

    /// Cumulative offsets: `offsets[v]` is the first sample of video `v`,
    /// `offsets[n_videos]` the total sample count.
    pub fn offsets(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.records.len() + 1);
        let mut acc = 0usize;
        out.push(acc);
        for r in &self.records {
            acc += r.stack_count;
            out.push(acc);
        }
        out
    }

    pub fn sample_range(&self, video: usize) -> Range<usize> {
        let start: usize = self.records[..video].iter().map(|r| r.stack_count).sum();
        start..start + self.records[video].stack_count
    }

    pub fn class_video_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for r in &self.records {
            counts[r.class_id] += 1;
        }
        counts
    }

    /// Global video indices belonging to `class_id`.
    pub fn class_videos(&self, class_id: usize) -> Range<usize> {
        let start = self
            .records
            .iter()
            .take_while(|r| r.class_id < class_id)
            .count();
        let len = self.records[start..]
            .iter()
            .take_while(|r| r.class_id == class_id)
            .count();
        start..start + len
    }

    pub fn stack_counts(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.stack_count).collect()
    }

    /// Persisted form of the per-video sample counts.
    pub fn samples_array(&self) -> CoreResult<Vec<i32>> {
        self.records
            .iter()
            .map(|r| to_i32(r.stack_count, "sample count"))
            .collect()
    }

    /// Persisted form of the per-class video counts.
    pub fn num_array(&self) -> CoreResult<Vec<i32>> {
        self.class_video_counts()
            .into_iter()
            .map(|n| to_i32(n, "class video count"))
            .collect()
    }

    /// Sample counts of the given videos, in the given order.
    pub fn counts_of(&self, videos: &[usize]) -> Vec<usize> {
        videos
            .iter()
            .map(|&v| self.records[v].stack_count)
            .collect()
    }
}

fn to_i32(value: usize, what: &str) -> CoreResult<i32> {
    i32::try_from(value)
        .map_err(|_| PipelineError::Table(format!("{} {} does not fit in i32", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_counts() {
        let t = VideoTable::from_counts(&[3, 0, 2, 4], &[2, 2]).unwrap();
        assert_eq!(t.offsets(), vec![0, 3, 3, 5, 9]);
        assert_eq!(t.total_samples(), 9);
        assert_eq!(t.sample_range(2), 3..5);
        assert_eq!(t.class_videos(1), 2..4);
        assert_eq!(t.records()[3].video_id, 1);
    }

    #[test]
    fn mismatched_class_counts_rejected() {
        let err = VideoTable::from_counts(&[3, 2], &[2, 2]).unwrap_err();
        assert!(matches!(err, PipelineError::LengthMismatch { .. }));
    }
}
