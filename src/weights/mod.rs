//! Moving pretrained Caffe-ordered weights into the feature extractor.
//!
//! Convolution kernels arrive as `(out, in, h, w)`. The target expects the
//! axes permuted `(3, 2, 1, 0)` with both leading spatial axes reversed, the
//! layout of a flipped-kernel convolution. Dense kernels arrive `(out, in)`
//! and are transposed to `(in, out)`. Biases are copied as they are.

use ndarray::{Array1, Array2, Array4, ArrayD, Axis, Ix2, Ix4};
use tracing::debug;

use crate::error::{CoreResult, PipelineError};
use crate::net::NetSpec;

pub mod archive;

pub use archive::{TensorPair, WeightArchive};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Conv,
    Dense,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLayer {
    pub name: String,
    pub kind: LayerKind,
}

/// Ordered list of layers to transplant. Archive layers not named here
/// (`fc7`, `fc8`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPlan {
    layers: Vec<PlannedLayer>,
}

impl LayerPlan {
    pub fn new(layers: Vec<PlannedLayer>) -> Self {
        Self { layers }
    }

    pub fn from_spec(spec: &NetSpec) -> Self {
        Self {
            layers: spec
                .layers()
                .into_iter()
                .map(|(name, kind)| PlannedLayer { name, kind })
                .collect(),
        }
    }

    pub fn vgg16() -> Self {
        Self::from_spec(&NetSpec::vgg16(crate::config::DEFAULT_NUM_FEATURES))
    }

    pub fn layers(&self) -> &[PlannedLayer] {
        &self.layers
    }
}

/// A network whose layers can receive transplanted parameters.
pub trait TargetLayers {
    /// Kernel shape and bias length of a named layer, `None` if the network
    /// has no such layer.
    fn layer_shape(&self, name: &str) -> Option<(Vec<usize>, usize)>;

    fn set_layer(&mut self, name: &str, kernel: ArrayD<f64>, bias: Array1<f64>) -> CoreResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransplantReport {
    pub conv_layers: usize,
    pub dense_layers: usize,
}

/// `(out, in, h, w)` to the target `(h, w, in, out)` with both spatial axes
/// reversed.
pub fn conv_kernel_to_target(kernel: &ArrayD<f64>) -> CoreResult<Array4<f64>> {
    let view = kernel
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| PipelineError::ShapeMismatch {
            what: "convolution kernel rank".to_string(),
            expected: vec![4],
            actual: vec![kernel.ndim()],
        })?;
    let mut t = view.permuted_axes([2, 3, 1, 0]);
    t.invert_axis(Axis(0));
    t.invert_axis(Axis(1));
    Ok(t.as_standard_layout().into_owned())
}

/// Inverse of [`conv_kernel_to_target`].
pub fn restore_conv_kernel(kernel: &Array4<f64>) -> Array4<f64> {
    let mut v = kernel.view();
    v.invert_axis(Axis(0));
    v.invert_axis(Axis(1));
    v.permuted_axes([3, 2, 0, 1]).as_standard_layout().into_owned()
}

pub fn dense_kernel_to_target(kernel: &ArrayD<f64>) -> CoreResult<Array2<f64>> {
    let view = kernel
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| PipelineError::ShapeMismatch {
            what: "dense kernel rank".to_string(),
            expected: vec![2],
            actual: vec![kernel.ndim()],
        })?;
    Ok(view.t().as_standard_layout().into_owned())
}

/// Inverse of [`dense_kernel_to_target`].
pub fn restore_dense_kernel(kernel: &Array2<f64>) -> Array2<f64> {
    kernel.t().as_standard_layout().into_owned()
}

/// Validates the archive against the plan, transforms every planned layer
/// and checks it against the target before writing anything.
pub fn transplant<T: TargetLayers>(
    archive: &WeightArchive,
    plan: &LayerPlan,
    target: &mut T,
) -> CoreResult<TransplantReport> {
    archive.validate(plan)?;

    let mut staged = Vec::with_capacity(plan.layers().len());
    for layer in plan.layers() {
        let pair = archive
            .get(&layer.name)
            .ok_or_else(|| PipelineError::MissingLayers(vec![layer.name.clone()]))?;
        let kernel = match layer.kind {
            LayerKind::Conv => conv_kernel_to_target(&pair.kernel)?.into_dyn(),
            LayerKind::Dense => dense_kernel_to_target(&pair.kernel)?.into_dyn(),
        };
        let (expected_kernel, expected_bias) =
            target.layer_shape(&layer.name).ok_or_else(|| {
                PipelineError::config(format!("target network has no layer `{}`", layer.name))
            })?;
        if kernel.shape() != expected_kernel.as_slice() {
            return Err(PipelineError::LayerShape {
                layer: layer.name.clone(),
                expected: expected_kernel,
                actual: kernel.shape().to_vec(),
            });
        }
        if pair.bias.len() != expected_bias {
            return Err(PipelineError::LayerShape {
                layer: format!("{}/bias", layer.name),
                expected: vec![expected_bias],
                actual: vec![pair.bias.len()],
            });
        }
        staged.push((layer, kernel, pair.bias.clone()));
    }

    let mut report = TransplantReport::default();
    for (layer, kernel, bias) in staged {
        debug!(layer = %layer.name, shape = ?kernel.shape(), "layer_transplanted");
        target.set_layer(&layer.name, kernel, bias)?;
        match layer.kind {
            LayerKind::Conv => report.conv_layers += 1,
            LayerKind::Dense => report.dense_layers += 1,
        }
    }
    Ok(report)
}
