use ndarray::ArrayView1;
use serde::Serialize;

use crate::error::{CoreResult, PipelineError};
use crate::table::VideoTable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoReport {
    pub class_id: usize,
    pub class_name: String,
    /// 1-based ordinal inside the class.
    pub video: usize,
    pub samples: usize,
    /// Samples actually compared; fewer than `samples` when the
    /// predictions end inside this video.
    pub scored: usize,
    pub misses: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl VideoReport {
    pub fn is_hit(&self) -> bool {
        self.scored > 0 && self.misses == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassGroup {
    pub class_name: String,
    pub videos: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoScoreReport {
    pub groups: Vec<ClassGroup>,
    pub videos: Vec<VideoReport>,
}

impl VideoScoreReport {
    pub fn hits(&self) -> usize {
        self.videos.iter().filter(|v| v.is_hit()).count()
    }

    pub fn misses(&self) -> usize {
        self.videos.len() - self.hits()
    }

    /// Console rendering: a header per class, then one line per video.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut current = None;
        for v in &self.videos {
            if current != Some(v.class_id) {
                current = Some(v.class_id);
                let n = self.groups.get(v.class_id).map(|g| g.videos).unwrap_or(0);
                out.push_str(&format!("###### {} videos {} ######\n", v.class_name, n));
            }
            if v.is_hit() {
                out.push_str(&format!("Hit video: {}\n", v.video));
            } else {
                out.push_str(&format!(
                    "Miss video: {} (misses {}, FP {}, FN {})\n",
                    v.video, v.misses, v.false_positives, v.false_negatives
                ));
            }
        }
        out
    }
}

/// Walks videos in table order and compares each video's window of
/// predictions with the truth. Zero-count videos are skipped; a window
/// cut short by the end of `predicted` is scored on what is there, and
/// videos starting past that end are left out of the report.
pub fn score(
    truth: ArrayView1<'_, f64>,
    predicted: ArrayView1<'_, f64>,
    table: &VideoTable,
    class_names: &[String],
) -> CoreResult<VideoScoreReport> {
    if class_names.len() < table.n_classes() {
        return Err(PipelineError::config(format!(
            "{} class names for {} classes",
            class_names.len(),
            table.n_classes()
        )));
    }
    if truth.len() != table.total_samples() {
        return Err(PipelineError::length(
            "ground truth vs video table samples",
            table.total_samples(),
            truth.len(),
        ));
    }
    if predicted.len() > truth.len() {
        return Err(PipelineError::length(
            "predictions vs ground truth",
            truth.len(),
            predicted.len(),
        ));
    }

    let groups = table
        .class_video_counts()
        .into_iter()
        .enumerate()
        .map(|(c, videos)| ClassGroup {
            class_name: class_names[c].clone(),
            videos,
        })
        .collect();

    let mut videos = Vec::new();
    let mut start = 0usize;
    for record in table.records() {
        let count = record.stack_count;
        if count == 0 {
            continue;
        }
        if start >= predicted.len() {
            break;
        }
        let end = (start + count).min(predicted.len());
        let mut report = VideoReport {
            class_id: record.class_id,
            class_name: class_names[record.class_id].clone(),
            video: record.video_id + 1,
            samples: count,
            scored: end.saturating_sub(start),
            misses: 0,
            false_positives: 0,
            false_negatives: 0,
        };
        for i in start..end {
            if predicted[i] != truth[i] {
                report.misses += 1;
                if truth[i] == 0.0 {
                    report.false_negatives += 1;
                } else {
                    report.false_positives += 1;
                }
            }
        }
        videos.push(report);
        start += count;
    }
    Ok(VideoScoreReport { groups, videos })
}
