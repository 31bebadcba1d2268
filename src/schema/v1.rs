use serde::Serialize;

use crate::config::{StreamKind, Task};
use crate::scores::{CrossValidationScores, ScoredPredictions, VideoScoreReport};

pub const SCHEMA_VERSION: &str = "v1";

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
    pub schema: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub task: Task,
    pub streams: Vec<StreamKind>,
    pub classes: Vec<String>,
    pub feature_id: String,
    pub classifier_id: String,
    pub window: usize,
    pub threshold: f64,
    pub seed: u64,
    pub test_fraction: Option<f64>,
    pub nsplits: Option<usize>,
    pub balance: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransplantSummary {
    pub conv_layers: usize,
    pub dense_layers: usize,
    pub backbone_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub stream: StreamKind,
    pub samples: usize,
    pub features: usize,
    pub videos: usize,
    pub class_videos: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub stream: StreamKind,
    pub train_videos: usize,
    pub test_videos: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FallstreamV1 {
    pub tool: ToolInfo,
    pub run: RunInfo,
    pub transplant: Option<TransplantSummary>,
    pub stores: Vec<StoreSummary>,
    pub splits: Vec<SplitSummary>,
    pub streams: Vec<ScoredPredictions>,
    pub fusion: Vec<ScoredPredictions>,
    pub cross_validation: Vec<CrossValidationScores>,
    pub videos: Option<VideoScoreReport>,
    pub warnings: Vec<String>,
}
