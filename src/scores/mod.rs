pub mod metrics;
pub mod video;

use serde::Serialize;

pub use metrics::{ConfusionMatrix, Evaluation, FoldSummary, Metrics, MetricSummary, evaluate, evaluate_threshold};
pub use video::{ClassGroup, VideoReport, VideoScoreReport, score};

/// One evaluated prediction set: a single stream or a fusion of streams.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredPredictions {
    pub name: String,
    pub samples: usize,
    pub evaluation: Evaluation,
}

/// Cross-validation outcome of one stream.
#[derive(Debug, Clone, Serialize)]
pub struct CrossValidationScores {
    pub stream: String,
    pub folds: Vec<Evaluation>,
    pub summary: FoldSummary,
}
