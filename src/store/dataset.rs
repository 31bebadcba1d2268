use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use tracing::info;

use crate::config::{Config, StreamKind};
use crate::error::{CoreResult, PipelineError};
use crate::net::check_labels;
use crate::store::{Tensor, TensorBundle, read_bundle, write_bundle};
use crate::table::VideoTable;

pub const FEATURES_KEY: &str = "features";
pub const LABELS_KEY: &str = "labels";
pub const SAMPLES_KEY: &str = "samples";
pub const NUM_KEY: &str = "num";

/// One stream's extracted features with labels and video bookkeeping.
#[derive(Debug, Clone)]
pub struct StreamStore {
    pub stream: StreamKind,
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
    pub table: VideoTable,
}

impl StreamStore {
    pub fn new(
        stream: StreamKind,
        features: Array2<f64>,
        labels: Array1<f64>,
        table: VideoTable,
    ) -> CoreResult<Self> {
        let store = Self {
            stream,
            features,
            labels,
            table,
        };
        store.validate()?;
        Ok(store)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let n = self.features.nrows();
        if self.labels.len() != n {
            return Err(PipelineError::length(
                format!("{} labels vs feature rows", self.stream.name()),
                n,
                self.labels.len(),
            ));
        }
        if self.table.total_samples() != n {
            return Err(PipelineError::length(
                format!("{} per-video sample counts vs feature rows", self.stream.name()),
                n,
                self.table.total_samples(),
            ));
        }
        check_labels(self.labels.view())
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn load(config: &Config, stream: StreamKind) -> Result<Self> {
        let features_path = config.features_path(stream);
        let features_bundle = read_bundle(&features_path)?;
        let features = features_bundle
            .require(FEATURES_KEY)
            .and_then(Tensor::to_matrix)
            .with_context(|| format!("in {}", features_path.display()))?;
        let labels = features_bundle
            .require(LABELS_KEY)
            .and_then(Tensor::to_column)
            .with_context(|| format!("in {}", features_path.display()))?;
        let samples = read_counts(&config.samples_path(stream), SAMPLES_KEY)?;
        let num = read_counts(&config.num_path(stream), NUM_KEY)?;
        let table = VideoTable::from_counts(&samples, &num)
            .with_context(|| format!("{} store video table", stream.name()))?;
        let store = Self::new(stream, features, labels, table)
            .with_context(|| format!("{} store is inconsistent", stream.name()))?;
        info!(
            stream = stream.name(),
            samples = store.n_samples(),
            features = store.features.ncols(),
            videos = store.table.n_videos(),
            "stream_store_loaded"
        );
        Ok(store)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        let mut features = TensorBundle::new();
        features.insert(FEATURES_KEY, Tensor::from_matrix(&self.features));
        features.insert(LABELS_KEY, Tensor::column_f64(&self.labels.to_vec()));
        write_bundle(&config.features_path(self.stream), &features)?;

        let mut samples = TensorBundle::new();
        samples.insert(SAMPLES_KEY, Tensor::column_i32(&self.table.samples_array()?));
        write_bundle(&config.samples_path(self.stream), &samples)?;

        let mut num = TensorBundle::new();
        num.insert(NUM_KEY, Tensor::column_i32(&self.table.num_array()?));
        write_bundle(&config.num_path(self.stream), &num)?;
        Ok(())
    }
}

fn read_counts(path: &Path, key: &str) -> Result<Vec<i64>> {
    let bundle = read_bundle(path)?;
    let tensor = bundle
        .require(key)
        .with_context(|| format!("in {}", path.display()))?;
    tensor
        .to_i64_vec()
        .with_context(|| format!("`{}` in {}", key, path.display()))
}
