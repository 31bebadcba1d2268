use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array3, ArrayView3, Ix3};

use crate::error::{CoreResult, PipelineError};
use crate::store::read_bundle;

pub const MEAN_KEY: &str = "image_mean";

/// Per-pixel, per-channel mean of the flow stacks, held channel-first
/// `(2L, H, W)`. Persisted as `image_mean` with shape `(H, W, 2L)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowMean {
    values: Array3<f64>,
}

impl FlowMean {
    /// From the persisted `(H, W, 2L)` layout.
    pub fn from_hwc(values: Array3<f64>, window: usize, height: usize, width: usize) -> CoreResult<Self> {
        let expected = [height, width, 2 * window];
        if values.shape() != &expected[..] {
            return Err(PipelineError::ShapeMismatch {
                what: "image_mean".to_string(),
                expected: expected.to_vec(),
                actual: values.shape().to_vec(),
            });
        }
        let values = values
            .permuted_axes([2, 0, 1])
            .as_standard_layout()
            .into_owned();
        Ok(Self { values })
    }

    pub fn zeros(window: usize, height: usize, width: usize) -> Self {
        Self {
            values: Array3::zeros((2 * window, height, width)),
        }
    }

    pub fn load(path: &Path, window: usize, height: usize, width: usize) -> Result<Self> {
        let bundle = read_bundle(path)?;
        let values = bundle
            .require(MEAN_KEY)
            .and_then(|t| t.to_array())
            .with_context(|| format!("in {}", path.display()))?
            .into_dimensionality::<Ix3>()
            .with_context(|| format!("`{}` in {} is not 3-D", MEAN_KEY, path.display()))?;
        let mean = Self::from_hwc(values, window, height, width)
            .with_context(|| format!("mean file {}", path.display()))?;
        Ok(mean)
    }

    /// Channel-first view `(2L, H, W)`.
    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.values.view()
    }

    /// Persisted `(H, W, 2L)` layout.
    pub fn to_hwc(&self) -> Array3<f64> {
        self.values
            .view()
            .permuted_axes([1, 2, 0])
            .as_standard_layout()
            .into_owned()
    }
}
