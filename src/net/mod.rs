use std::path::Path;

use anyhow::Result;
use ndarray::{Array1, ArrayView1, ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, PipelineError};
use crate::weights::LayerKind;

pub mod convnet;
pub mod head;

pub use convnet::ConvNet;
pub use head::LogisticHead;

/// Geometry of a VGG-style feature extractor: blocks of 3x3 convolutions,
/// each block closed by a 2x2 max-pool, then one dense layer named `fc6`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetSpec {
    /// Output channels of every convolution, grouped by block.
    pub blocks: Vec<Vec<usize>>,
    pub num_features: usize,
}

impl NetSpec {
    pub fn vgg16(num_features: usize) -> Self {
        Self {
            blocks: vec![
                vec![64, 64],
                vec![128, 128],
                vec![256, 256, 256],
                vec![512, 512, 512],
                vec![512, 512, 512],
            ],
            num_features,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.blocks.is_empty() {
            return Err(PipelineError::config("network needs at least one block"));
        }
        for (b, block) in self.blocks.iter().enumerate() {
            if block.is_empty() {
                return Err(PipelineError::config(format!(
                    "network block {} has no convolutions",
                    b + 1
                )));
            }
            if block.iter().any(|&c| c == 0) {
                return Err(PipelineError::config(format!(
                    "network block {} has a zero-channel convolution",
                    b + 1
                )));
            }
        }
        if self.num_features == 0 {
            return Err(PipelineError::config("num_features must be at least 1"));
        }
        Ok(())
    }

    /// Layer names in forward order: `conv<block>_<index>` then `fc6`.
    pub fn layers(&self) -> Vec<(String, LayerKind)> {
        let mut out = Vec::new();
        for (b, block) in self.blocks.iter().enumerate() {
            for i in 0..block.len() {
                out.push((format!("conv{}_{}", b + 1, i + 1), LayerKind::Conv));
            }
        }
        out.push(("fc6".to_string(), LayerKind::Dense));
        out
    }

    /// Spatial size after every block's pooling.
    pub fn pooled_size(&self, height: usize, width: usize) -> (usize, usize) {
        self.blocks
            .iter()
            .fold((height, width), |(h, w), _| (h / 2, w / 2))
    }

    pub fn last_channels(&self, in_channels: usize) -> usize {
        self.blocks
            .last()
            .and_then(|b| b.last())
            .copied()
            .unwrap_or(in_channels)
    }

    /// Input width of `fc6` for a given input geometry.
    pub fn flat_len(&self, in_channels: usize, height: usize, width: usize) -> usize {
        let (h, w) = self.pooled_size(height, width);
        self.last_channels(in_channels) * h * w
    }
}

/// Embeds one flow stack `(2L, H, W)` into a `num_features` vector.
pub trait Backbone {
    fn input_shape(&self) -> [usize; 3];
    fn num_features(&self) -> usize;
    fn embed(&self, stack: ArrayView3<'_, f64>) -> CoreResult<Array1<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Loss weights indexed by label.
    pub class_weight: [f64; 2],
    /// 0 means one batch holding the whole training set.
    pub batch_size: usize,
    pub epochs: usize,
    pub seed: u64,
}

/// Per-epoch training curves, written out for external plotting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub loss: Vec<f64>,
    pub accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
}

/// Binary classifier over feature vectors. Predictions are the probability
/// of label 1 (not fall).
pub trait Classifier {
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        validation: Option<(ArrayView2<'_, f64>, ArrayView1<'_, f64>)>,
        opts: &FitOptions,
    ) -> CoreResult<History>;

    fn predict(&self, x: ArrayView2<'_, f64>) -> CoreResult<Array1<f64>>;

    fn save(&self, path: &Path) -> Result<()>;

    fn load(path: &Path) -> Result<Self>
    where
        Self: Sized;
}

/// Checks that every label is exactly 0 or 1.
pub fn check_labels(y: ArrayView1<'_, f64>) -> CoreResult<()> {
    for (index, &value) in y.iter().enumerate() {
        if value != 0.0 && value != 1.0 {
            return Err(PipelineError::InvalidLabel { index, value });
        }
    }
    Ok(())
}
