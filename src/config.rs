use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, PipelineError};
use crate::net::NetSpec;

pub const DEFAULT_WINDOW: usize = 10;
pub const DEFAULT_NUM_FEATURES: usize = 4096;
pub const DEFAULT_FRAME_SIZE: usize = 224;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Spatial,
    Temporal,
    Pose,
}

impl StreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Spatial => "spatial",
            Self::Temporal => "temporal",
            Self::Pose => "pose",
        }
    }

    /// Temporal samples are sliding-window stacks; the other streams are
    /// per-frame and carry `window` trailing samples per video that the
    /// temporal stream has no counterpart for.
    pub fn is_windowed(&self) -> bool {
        matches!(self, Self::Temporal)
    }
}

/// What the pipeline is being asked to do; decides which inputs are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Transplant,
    Extract,
    Train,
    CrossTrain,
    Result,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Loss weight of the fall class (label 0); the other class weighs 1.
    pub weight_0: f64,
    /// 0 trains on the full training set as a single batch.
    pub mini_batch_size: usize,
    pub batch_norm: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            learning_rate: 1e-4,
            weight_0: 1.0,
            mini_batch_size: 0,
            batch_norm: true,
        }
    }
}

/// Immutable run configuration. Built once from the CLI, validated, then
/// handed to `Ctx::new`.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub task: Task,
    pub streams: Vec<StreamKind>,
    pub classes: Vec<String>,
    pub data_dir: Option<PathBuf>,
    pub mean_path: Option<PathBuf>,
    pub weights_path: Option<PathBuf>,
    pub store_dir: PathBuf,
    /// Extension of the feature stores: `fst` (native) or `h5`.
    pub store_ext: String,
    pub out_dir: PathBuf,
    pub feature_id: String,
    pub classifier_id: String,
    pub window: usize,
    pub frame_height: usize,
    pub frame_width: usize,
    pub net: NetSpec,
    pub threshold: f64,
    pub training: TrainingConfig,
    pub test_fraction: f64,
    pub nsplits: usize,
    pub balance: bool,
    pub seed: u64,
    pub threads: usize,
}

impl Config {
    pub fn new(task: Task, store_dir: PathBuf, out_dir: PathBuf) -> Self {
        Self {
            task,
            streams: vec![StreamKind::Temporal],
            classes: vec!["Falls".to_string(), "NotFalls".to_string()],
            data_dir: None,
            mean_path: None,
            weights_path: None,
            store_dir,
            store_ext: "fst".to_string(),
            out_dir,
            feature_id: "urfd".to_string(),
            classifier_id: "urfd".to_string(),
            window: DEFAULT_WINDOW,
            frame_height: DEFAULT_FRAME_SIZE,
            frame_width: DEFAULT_FRAME_SIZE,
            net: NetSpec::vgg16(DEFAULT_NUM_FEATURES),
            threshold: 0.5,
            training: TrainingConfig::default(),
            test_fraction: 0.2,
            nsplits: 5,
            balance: false,
            seed: 42,
            threads: 0,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.streams.is_empty() {
            return Err(PipelineError::config("at least one stream is required"));
        }
        for (i, s) in self.streams.iter().enumerate() {
            if self.streams[..i].contains(s) {
                return Err(PipelineError::config(format!(
                    "stream `{}` listed twice",
                    s.name()
                )));
            }
        }
        if self.classes.len() < 2 {
            return Err(PipelineError::config(
                "at least two class names are required (fall class first)",
            ));
        }
        if self.window == 0 {
            return Err(PipelineError::config("window (L) must be at least 1"));
        }
        if self.frame_height == 0 || self.frame_width == 0 {
            return Err(PipelineError::config("frame size must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::config(format!(
                "threshold {} outside [0, 1]",
                self.threshold
            )));
        }
        if !(0.0..1.0).contains(&self.test_fraction) {
            return Err(PipelineError::config(format!(
                "test fraction {} outside [0, 1)",
                self.test_fraction
            )));
        }
        if self.training.learning_rate <= 0.0 || !self.training.learning_rate.is_finite() {
            return Err(PipelineError::config("learning rate must be positive"));
        }
        if self.training.weight_0 <= 0.0 {
            return Err(PipelineError::config("fall class weight must be positive"));
        }
        if self.training.epochs == 0 {
            return Err(PipelineError::config("epochs must be at least 1"));
        }
        self.net.validate()?;
        if self.net.pooled_size(self.frame_height, self.frame_width).0 == 0
            || self.net.pooled_size(self.frame_height, self.frame_width).1 == 0
        {
            return Err(PipelineError::config(format!(
                "frames of {}x{} vanish after {} pooling stages",
                self.frame_height,
                self.frame_width,
                self.net.blocks.len()
            )));
        }
        if !matches!(self.store_ext.as_str(), "fst" | "h5") {
            return Err(PipelineError::config(format!(
                "unknown store format `{}` (fst or h5)",
                self.store_ext
            )));
        }

        match self.task {
            Task::Transplant => {
                require(&self.weights_path, "--weights")?;
            }
            Task::Extract => {
                require(&self.data_dir, "--data")?;
                require(&self.mean_path, "--mean")?;
                require(&self.weights_path, "--weights")?;
                if self.streams != [StreamKind::Temporal] {
                    return Err(PipelineError::config(
                        "feature extraction builds optical-flow stacks; use --stream temporal",
                    ));
                }
            }
            Task::CrossTrain => {
                if self.nsplits < 2 {
                    return Err(PipelineError::config(format!(
                        "cross training needs --nsplits >= 2, got {}",
                        self.nsplits
                    )));
                }
            }
            Task::Train | Task::Result => {}
        }
        Ok(())
    }

    pub fn stacks_depth(&self) -> usize {
        2 * self.window
    }

    pub fn features_path(&self, stream: StreamKind) -> PathBuf {
        self.store_path(stream, "features")
    }

    pub fn samples_path(&self, stream: StreamKind) -> PathBuf {
        self.store_path(stream, "samples")
    }

    pub fn num_path(&self, stream: StreamKind) -> PathBuf {
        self.store_path(stream, "num")
    }

    pub fn classifier_path(&self, stream: StreamKind) -> PathBuf {
        self.out_dir.join(format!(
            "{}_classifier_{}.json",
            stream.name(),
            self.classifier_id
        ))
    }

    pub fn history_path(&self, stream: StreamKind) -> PathBuf {
        self.out_dir.join(format!(
            "{}_history_{}.json",
            stream.name(),
            self.classifier_id
        ))
    }

    pub fn svm_path(&self) -> PathBuf {
        self.out_dir
            .join(format!("svm_avg_{}.json", self.classifier_id))
    }

    pub fn backbone_path(&self) -> PathBuf {
        self.out_dir.join("backbone.fst")
    }

    fn store_path(&self, stream: StreamKind, kind: &str) -> PathBuf {
        self.store_dir.join(format!(
            "{}_{}_{}.{}",
            stream.name(),
            kind,
            self.feature_id,
            self.store_ext
        ))
    }

    /// The stream whose sample ordering every other stream is aligned to:
    /// temporal when present, otherwise the first listed.
    pub fn reference_stream(&self) -> StreamKind {
        if self.streams.contains(&StreamKind::Temporal) {
            StreamKind::Temporal
        } else {
            self.streams[0]
        }
    }
}


fn require(path: &Option<PathBuf>, flag: &str) -> CoreResult<()> {
    if path.is_none() {
        return Err(PipelineError::config(format!("{} is required", flag)));
    }
    Ok(())
}
