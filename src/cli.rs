use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{
    Config, DEFAULT_FRAME_SIZE, DEFAULT_NUM_FEATURES, DEFAULT_WINDOW, StreamKind, Task,
};
use crate::net::NetSpec;

#[derive(Debug, Parser)]
#[command(
    name = "fallstream",
    version,
    about = "Optical-flow fall detection: weight transplant, feature extraction, training and evaluation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert a pretrained weight archive into the backbone layout.
    Transplant(TransplantArgs),
    /// Build flow stacks for every video and store backbone features.
    Extract(ExtractArgs),
    /// Video-level holdout training, per-stream evaluation and fusion.
    Train(TrainArgs),
    /// Stratified k-fold training and evaluation.
    CrossTrain(CrossTrainArgs),
    /// Score stored features with saved classifiers.
    Result(ResultArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StreamArg {
    Spatial,
    Temporal,
    Pose,
}

impl From<StreamArg> for StreamKind {
    fn from(arg: StreamArg) -> Self {
        match arg {
            StreamArg::Spatial => StreamKind::Spatial,
            StreamArg::Temporal => StreamKind::Temporal,
            StreamArg::Pose => StreamKind::Pose,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreFormatArg {
    Fst,
    H5,
}

impl StoreFormatArg {
    fn extension(self) -> &'static str {
        match self {
            Self::Fst => "fst",
            Self::H5 => "h5",
        }
    }
}

#[derive(Debug, Args)]
pub struct NetArgs {
    #[arg(long, default_value_t = DEFAULT_WINDOW, help = "Flow frames per stack (L)")]
    pub window: usize,

    #[arg(long, default_value_t = DEFAULT_FRAME_SIZE)]
    pub frame_height: usize,

    #[arg(long, default_value_t = DEFAULT_FRAME_SIZE)]
    pub frame_width: usize,

    #[arg(long, default_value_t = DEFAULT_NUM_FEATURES, help = "Width of the fc6 embedding")]
    pub num_features: usize,

    #[arg(long, default_value_t = 0, help = "Number of threads (0 = serial)")]
    pub threads: usize,
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    #[arg(long, help = "Directory holding the feature stores")]
    pub store_dir: PathBuf,

    #[arg(long, default_value = "urfd", help = "Identifier in feature store names")]
    pub id: String,

    #[arg(long, value_enum, default_value_t = StoreFormatArg::Fst)]
    pub store_format: StoreFormatArg,

    #[arg(long, value_delimiter = ',', default_values_t = vec!["Falls".to_string(), "NotFalls".to_string()], help = "Class names, fall class first")]
    pub classes: Vec<String>,
}

#[derive(Debug, Args)]
pub struct TransplantArgs {
    #[arg(long, help = "Pretrained weight archive (data/<layer>/0|1)")]
    pub weights: PathBuf,

    #[arg(long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub net: NetArgs,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    #[arg(long, help = "Dataset root: <class>/<video>/flow_x_*.jpg, flow_y_*.jpg")]
    pub data: PathBuf,

    #[arg(long, help = "Flow mean file holding image_mean [H x W x 2L]")]
    pub mean: PathBuf,

    #[arg(long, help = "Pretrained weight archive (data/<layer>/0|1)")]
    pub weights: PathBuf,

    #[arg(long)]
    pub out: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub net: NetArgs,
}

#[derive(Debug, Args)]
pub struct TrainingArgs {
    #[arg(long = "stream", value_enum, num_args = 1.., default_values_t = vec![StreamArg::Temporal])]
    pub streams: Vec<StreamArg>,

    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, help = "Identifier in classifier file names (defaults to --id)")]
    pub classifier_id: Option<String>,

    #[arg(long, default_value_t = DEFAULT_WINDOW, help = "Flow frames per stack (L)")]
    pub window: usize,

    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 50)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    #[arg(long, default_value_t = 1.0, help = "Loss weight of the fall class")]
    pub w0: f64,

    #[arg(long, default_value_t = 0, help = "Mini-batch size (0 = full batch)")]
    pub mini_batch: usize,

    #[arg(long, default_value_t = false)]
    pub no_batch_norm: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Debug, Args)]
pub struct TrainArgs {
    #[command(flatten)]
    pub common: TrainingArgs,

    #[arg(long, default_value_t = 0.2, help = "Fraction of each class's videos held out")]
    pub test_fraction: f64,
}

#[derive(Debug, Args)]
pub struct CrossTrainArgs {
    #[command(flatten)]
    pub common: TrainingArgs,

    #[arg(long, default_value_t = 5)]
    pub nsplits: usize,

    #[arg(long, default_value_t = false, help = "Subsample the majority class in each training fold")]
    pub balance: bool,
}

#[derive(Debug, Args)]
pub struct ResultArgs {
    #[command(flatten)]
    pub common: TrainingArgs,
}

impl NetArgs {
    fn apply(&self, config: &mut Config) {
        config.window = self.window;
        config.frame_height = self.frame_height;
        config.frame_width = self.frame_width;
        config.net = NetSpec::vgg16(self.num_features);
        config.threads = self.threads;
    }
}

impl StoreArgs {
    fn apply(&self, config: &mut Config) {
        config.feature_id = self.id.clone();
        config.classifier_id = self.id.clone();
        config.store_ext = self.store_format.extension().to_string();
        config.classes = self.classes.clone();
    }
}

impl TrainingArgs {
    fn to_config(&self, task: Task) -> Config {
        let mut config = Config::new(task, self.store.store_dir.clone(), self.out.clone());
        self.store.apply(&mut config);
        if let Some(id) = &self.classifier_id {
            config.classifier_id = id.clone();
        }
        config.streams = self.streams.iter().map(|&s| s.into()).collect();
        config.window = self.window;
        config.threshold = self.threshold;
        config.seed = self.seed;
        config.training.epochs = self.epochs;
        config.training.learning_rate = self.lr;
        config.training.weight_0 = self.w0;
        config.training.mini_batch_size = self.mini_batch;
        config.training.batch_norm = !self.no_batch_norm;
        config
    }
}

impl TransplantArgs {
    pub fn to_config(&self) -> Config {
        let mut config = Config::new(Task::Transplant, self.out.clone(), self.out.clone());
        self.net.apply(&mut config);
        config.weights_path = Some(self.weights.clone());
        config
    }
}

impl ExtractArgs {
    pub fn to_config(&self) -> Config {
        let mut config = Config::new(Task::Extract, self.store.store_dir.clone(), self.out.clone());
        self.store.apply(&mut config);
        self.net.apply(&mut config);
        config.data_dir = Some(self.data.clone());
        config.mean_path = Some(self.mean.clone());
        config.weights_path = Some(self.weights.clone());
        config
    }
}

impl TrainArgs {
    pub fn to_config(&self) -> Config {
        let mut config = self.common.to_config(Task::Train);
        config.test_fraction = self.test_fraction;
        config
    }
}

impl CrossTrainArgs {
    pub fn to_config(&self) -> Config {
        let mut config = self.common.to_config(Task::CrossTrain);
        config.nsplits = self.nsplits;
        config.balance = self.balance;
        config
    }
}

impl ResultArgs {
    pub fn to_config(&self) -> Config {
        self.common.to_config(Task::Result)
    }
}
