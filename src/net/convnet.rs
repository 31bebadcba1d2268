use std::ops::Range;

use ndarray::{Array1, Array2, Array3, Array4, ArrayD, ArrayView3, Axis, Ix2, Ix4, s};

#[cfg(feature = "mt")]
use rayon::prelude::*;

use crate::error::{CoreResult, PipelineError};
use crate::net::{Backbone, NetSpec};
use crate::store::{Tensor, TensorBundle};
use crate::weights::TargetLayers;

#[derive(Debug, Clone)]
struct ConvLayer {
    name: String,
    /// `(kh, kw, in, out)`.
    kernel: Array4<f64>,
    bias: Array1<f64>,
    initialized: bool,
}

#[derive(Debug, Clone)]
struct DenseLayer {
    name: String,
    /// `(in, out)`.
    kernel: Array2<f64>,
    bias: Array1<f64>,
    initialized: bool,
}

/// Forward-only VGG-style extractor: 3x3 zero-padded convolutions with
/// ReLU, a 2x2 max-pool after each block, flatten, then the linear `fc6`.
///
/// Layers start zeroed and flagged uninitialized; `embed` refuses to run
/// until every layer has received weights.
#[derive(Debug)]
pub struct ConvNet {
    input: [usize; 3],
    blocks: Vec<Vec<ConvLayer>>,
    dense: DenseLayer,
    #[cfg(feature = "mt")]
    pool: Option<rayon::ThreadPool>,
}

impl ConvNet {
    pub fn new(spec: &NetSpec, in_channels: usize, height: usize, width: usize) -> CoreResult<Self> {
        spec.validate()?;
        let (ph, pw) = spec.pooled_size(height, width);
        if in_channels == 0 || ph == 0 || pw == 0 {
            return Err(PipelineError::config(format!(
                "input ({}, {}, {}) is too small for {} pooling stages",
                in_channels,
                height,
                width,
                spec.blocks.len()
            )));
        }
        let mut blocks = Vec::with_capacity(spec.blocks.len());
        let mut c_in = in_channels;
        for (b, block) in spec.blocks.iter().enumerate() {
            let mut layers = Vec::with_capacity(block.len());
            for (i, &c_out) in block.iter().enumerate() {
                layers.push(ConvLayer {
                    name: format!("conv{}_{}", b + 1, i + 1),
                    kernel: Array4::zeros((3, 3, c_in, c_out)),
                    bias: Array1::zeros(c_out),
                    initialized: false,
                });
                c_in = c_out;
            }
            blocks.push(layers);
        }
        let flat = spec.flat_len(in_channels, height, width);
        Ok(Self {
            input: [in_channels, height, width],
            blocks,
            dense: DenseLayer {
                name: "fc6".to_string(),
                kernel: Array2::zeros((flat, spec.num_features)),
                bias: Array1::zeros(spec.num_features),
                initialized: false,
            },
            #[cfg(feature = "mt")]
            pool: None,
        })
    }

    /// Spreads each convolution's output channels over `threads` workers.
    /// Without the `mt` feature the forward pass stays serial.
    pub fn with_threads(self, threads: usize) -> anyhow::Result<Self> {
        #[cfg(feature = "mt")]
        {
            let mut net = self;
            if threads > 1 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| anyhow::anyhow!("failed to build thread pool: {}", e))?;
                net.pool = Some(pool);
            }
            Ok(net)
        }
        #[cfg(not(feature = "mt"))]
        {
            let _ = threads;
            Ok(self)
        }
    }

    fn conv_layers(&self) -> impl Iterator<Item = &ConvLayer> {
        self.blocks.iter().flatten()
    }

    pub fn is_initialized(&self) -> bool {
        self.conv_layers().all(|l| l.initialized) && self.dense.initialized
    }

    fn check_initialized(&self) -> CoreResult<()> {
        if let Some(layer) = self.conv_layers().find(|l| !l.initialized) {
            return Err(PipelineError::Uninitialized(layer.name.clone()));
        }
        if !self.dense.initialized {
            return Err(PipelineError::Uninitialized(self.dense.name.clone()));
        }
        Ok(())
    }

    /// Converted parameters as `layers/<name>/kernel` and `layers/<name>/bias`.
    pub fn to_bundle(&self) -> TensorBundle {
        let mut bundle = TensorBundle::new();
        for layer in self.conv_layers() {
            bundle.insert(
                format!("layers/{}/kernel", layer.name),
                Tensor::from_f64(&layer.kernel.clone().into_dyn()),
            );
            bundle.insert(
                format!("layers/{}/bias", layer.name),
                Tensor::from_f64(&layer.bias.clone().into_dyn()),
            );
        }
        bundle.insert(
            format!("layers/{}/kernel", self.dense.name),
            Tensor::from_matrix(&self.dense.kernel),
        );
        bundle.insert(
            format!("layers/{}/bias", self.dense.name),
            Tensor::from_f64(&self.dense.bias.clone().into_dyn()),
        );
        bundle
    }

    fn conv_relu(&self, input: &Array3<f64>, layer: &ConvLayer) -> Array3<f64> {
        let (_, h, w) = input.dim();
        let c_out = layer.kernel.shape()[3];
        let plane = |co: usize| conv_channel(input, &layer.kernel, layer.bias[co], co);

        #[cfg(feature = "mt")]
        let planes: Vec<Array2<f64>> = match &self.pool {
            Some(pool) => pool.install(|| (0..c_out).into_par_iter().map(plane).collect()),
            None => (0..c_out).map(plane).collect(),
        };
        #[cfg(not(feature = "mt"))]
        let planes: Vec<Array2<f64>> = (0..c_out).map(plane).collect();

        let mut out = Array3::zeros((c_out, h, w));
        for (co, p) in planes.into_iter().enumerate() {
            out.index_axis_mut(Axis(0), co).assign(&p);
        }
        out
    }
}

/// One output channel of a zero-padded, flipped-kernel convolution
/// followed by ReLU.
fn conv_channel(input: &Array3<f64>, kernel: &Array4<f64>, bias: f64, co: usize) -> Array2<f64> {
    let (c_in, h, w) = input.dim();
    let (kh, kw) = (kernel.shape()[0], kernel.shape()[1]);
    let (pad_h, pad_w) = ((kh / 2) as isize, (kw / 2) as isize);
    let mut out = Array2::from_elem((h, w), bias);
    for ci in 0..c_in {
        let src = input.index_axis(Axis(0), ci);
        for a in 0..kh {
            let (oy, iy) = shifted(h, pad_h - a as isize);
            for b in 0..kw {
                let weight = kernel[[a, b, ci, co]];
                if weight == 0.0 {
                    continue;
                }
                let (ox, ix) = shifted(w, pad_w - b as isize);
                out.slice_mut(s![oy.clone(), ox])
                    .scaled_add(weight, &src.slice(s![iy.clone(), ix]));
            }
        }
    }
    out.mapv_inplace(|v| v.max(0.0));
    out
}

/// Output and input index ranges for `out[y] += in[y + d]` over `0..n`.
fn shifted(n: usize, d: isize) -> (Range<usize>, Range<usize>) {
    let n = n as isize;
    let lo = (-d).max(0);
    let hi = (n - d).min(n).max(lo);
    (
        lo as usize..hi as usize,
        (lo + d) as usize..(hi + d) as usize,
    )
}

fn max_pool2(input: &Array3<f64>) -> Array3<f64> {
    let (c, h, w) = input.dim();
    let (ph, pw) = (h / 2, w / 2);
    Array3::from_shape_fn((c, ph, pw), |(ci, y, x)| {
        let (y0, x0) = (2 * y, 2 * x);
        input[[ci, y0, x0]]
            .max(input[[ci, y0, x0 + 1]])
            .max(input[[ci, y0 + 1, x0]])
            .max(input[[ci, y0 + 1, x0 + 1]])
    })
}

impl Backbone for ConvNet {
    fn input_shape(&self) -> [usize; 3] {
        self.input
    }

    fn num_features(&self) -> usize {
        self.dense.bias.len()
    }

    fn embed(&self, stack: ArrayView3<'_, f64>) -> CoreResult<Array1<f64>> {
        if stack.shape() != &self.input[..] {
            return Err(PipelineError::ShapeMismatch {
                what: "flow stack".to_string(),
                expected: self.input.to_vec(),
                actual: stack.shape().to_vec(),
            });
        }
        self.check_initialized()?;

        let mut x = stack.to_owned();
        for block in &self.blocks {
            for layer in block {
                x = self.conv_relu(&x, layer);
            }
            x = max_pool2(&x);
        }
        let flat = Array1::from_iter(x.iter().copied());
        Ok(flat.dot(&self.dense.kernel) + &self.dense.bias)
    }
}

impl TargetLayers for ConvNet {
    fn layer_shape(&self, name: &str) -> Option<(Vec<usize>, usize)> {
        if name == self.dense.name {
            return Some((self.dense.kernel.shape().to_vec(), self.dense.bias.len()));
        }
        self.conv_layers()
            .find(|l| l.name == name)
            .map(|l| (l.kernel.shape().to_vec(), l.bias.len()))
    }

    fn set_layer(&mut self, name: &str, kernel: ArrayD<f64>, bias: Array1<f64>) -> CoreResult<()> {
        let shape_err = |expected: &[usize], actual: &[usize]| PipelineError::LayerShape {
            layer: name.to_string(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        };
        if name == self.dense.name {
            if kernel.shape() != self.dense.kernel.shape() || bias.len() != self.dense.bias.len() {
                return Err(shape_err(self.dense.kernel.shape(), kernel.shape()));
            }
            self.dense.kernel = kernel
                .into_dimensionality::<Ix2>()
                .map_err(|_| shape_err(&[0, 0], &[]))?;
            self.dense.bias = bias;
            self.dense.initialized = true;
            return Ok(());
        }
        let layer = self
            .blocks
            .iter_mut()
            .flatten()
            .find(|l| l.name == name)
            .ok_or_else(|| PipelineError::config(format!("network has no layer `{}`", name)))?;
        if kernel.shape() != layer.kernel.shape() || bias.len() != layer.bias.len() {
            return Err(shape_err(layer.kernel.shape(), kernel.shape()));
        }
        layer.kernel = kernel
            .into_dimensionality::<Ix4>()
            .map_err(|_| shape_err(&[0, 0, 0, 0], &[]))?;
        layer.bias = bias;
        layer.initialized = true;
        Ok(())
    }
}
