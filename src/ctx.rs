use std::ops::Range;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use ndarray::Array1;

use crate::config::{Config, StreamKind};
use crate::flow::VideoSource;
use crate::net::ConvNet;
use crate::schema::v1::FallstreamV1;
use crate::scores::{CrossValidationScores, ScoredPredictions, VideoScoreReport};
use crate::split::{HoldoutSplit, dewindow, gather, relative_ranges};
use crate::store::StreamStore;
use crate::weights::TransplantReport;

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub out_dir: PathBuf,
    pub json_path: PathBuf,
    pub tsv_path: PathBuf,
}

/// Continuous predictions of one stream over an evaluated sample set.
#[derive(Debug, Clone)]
pub struct StreamPredictions {
    pub stream: StreamKind,
    pub truth: Array1<f64>,
    pub scores: Array1<f64>,
    /// Positions in `scores` that line up with the other streams.
    pub aligned: Vec<Range<usize>>,
}

impl StreamPredictions {
    /// `ranges` are the store rows behind `scores`, in order. Per-frame
    /// streams lose the trailing `window` rows of each video when a windowed
    /// stream takes part in the run.
    pub fn new(
        stream: StreamKind,
        truth: Array1<f64>,
        scores: Array1<f64>,
        ranges: &[Range<usize>],
        config: &Config,
    ) -> Self {
        let local = relative_ranges(ranges);
        let windowed_run = config.streams.iter().any(StreamKind::is_windowed);
        let aligned = if windowed_run && !stream.is_windowed() {
            dewindow(&local, config.window)
        } else {
            local
        };
        Self {
            stream,
            truth,
            scores,
            aligned,
        }
    }

    pub fn aligned_scores(&self) -> Array1<f64> {
        gather(self.scores.view(), &self.aligned)
    }

    pub fn aligned_truth(&self) -> Array1<f64> {
        gather(self.truth.view(), &self.aligned)
    }
}

#[derive(Debug)]
pub struct Ctx {
    pub config: Config,
    pub tool_version: String,
    pub output: OutputPaths,
    pub videos: Vec<VideoSource>,
    pub backbone: Option<ConvNet>,
    pub transplant: Option<TransplantReport>,
    pub stores: Vec<StreamStore>,
    pub splits: Vec<(StreamKind, HoldoutSplit)>,
    pub predictions: Vec<StreamPredictions>,
    pub stream_scores: Vec<ScoredPredictions>,
    pub fused: Option<Array1<f64>>,
    pub fusion_scores: Vec<ScoredPredictions>,
    pub cv_scores: Vec<CrossValidationScores>,
    pub video_report: Option<VideoScoreReport>,
    pub warnings: Vec<String>,
    pub report: Option<FallstreamV1>,
}

impl Ctx {
    pub fn new(config: Config, tool_version: &str) -> Self {
        let out_dir = config.out_dir.clone();
        let json_path = out_dir.join("report.json");
        let tsv_path = out_dir.join("videos.tsv");
        Self {
            config,
            tool_version: tool_version.to_string(),
            output: OutputPaths {
                out_dir,
                json_path,
                tsv_path,
            },
            videos: Vec::new(),
            backbone: None,
            transplant: None,
            stores: Vec::new(),
            splits: Vec::new(),
            predictions: Vec::new(),
            stream_scores: Vec::new(),
            fused: None,
            fusion_scores: Vec::new(),
            cv_scores: Vec::new(),
            video_report: None,
            warnings: Vec::new(),
            report: None,
        }
    }

    pub fn store(&self, stream: StreamKind) -> Result<&StreamStore> {
        self.stores
            .iter()
            .find(|s| s.stream == stream)
            .ok_or_else(|| anyhow!("{} store not loaded", stream.name()))
    }

    pub fn predictions_of(&self, stream: StreamKind) -> Option<&StreamPredictions> {
        self.predictions.iter().find(|p| p.stream == stream)
    }
}
