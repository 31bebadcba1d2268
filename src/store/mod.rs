//! Named tensor bundles on disk.
//!
//! The native format (`FSTENSOR`) is a header, an entry directory and
//! little-endian data blocks, each guarded by a CRC-64. Plain bundles are
//! memory-mapped, `.gz` bundles are inflated in memory. HDF5 files
//! (`.h5`, `.hdf5`, `.mat`) go through the `hdf5` feature with the same
//! dataset names.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use ndarray::{Array1, Array2, ArrayD, IxDyn};

pub mod dataset;
#[cfg(feature = "hdf5")]
pub mod h5;
#[cfg(not(feature = "hdf5"))]
pub mod h5 {
    use anyhow::{Result, bail};
    use std::path::Path;

    use super::TensorBundle;

    pub fn read_bundle(_path: &Path) -> Result<TensorBundle> {
        bail!("HDF5 support not enabled. Rebuild with --features hdf5");
    }

    pub fn write_bundle(_path: &Path, _bundle: &TensorBundle) -> Result<()> {
        bail!("HDF5 support not enabled. Rebuild with --features hdf5");
    }
}
pub mod layout;
pub mod reader;
pub mod writer;

pub use dataset::StreamStore;

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            Self::F64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> layout::DType {
        match self {
            Self::F64(_) => layout::DType::F64,
            Self::F32(_) => layout::DType::F32,
            Self::I32(_) => layout::DType::I32,
            Self::I64(_) => layout::DType::I64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self> {
        let numel = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .with_context(|| format!("tensor shape {:?} overflows", shape))?;
        if numel != data.len() {
            bail!(
                "tensor shape {:?} holds {} values, data has {}",
                shape,
                numel,
                data.len()
            );
        }
        Ok(Self { shape, data })
    }

    pub fn from_f64(array: &ArrayD<f64>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: TensorData::F64(array.iter().copied().collect()),
        }
    }

    pub fn from_matrix(array: &Array2<f64>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: TensorData::F64(array.iter().copied().collect()),
        }
    }

    /// Column tensor `[n x 1]` of i32 counts.
    pub fn column_i32(values: &[i32]) -> Self {
        Self {
            shape: vec![values.len(), 1],
            data: TensorData::I32(values.to_vec()),
        }
    }

    /// Column tensor `[n x 1]` of f64 values.
    pub fn column_f64(values: &[f64]) -> Self {
        Self {
            shape: vec![values.len(), 1],
            data: TensorData::F64(values.to_vec()),
        }
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            TensorData::F64(v) => v.clone(),
            TensorData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::I32(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::I64(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }

    /// Integer view of the values. Floats must be integral.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>> {
        match &self.data {
            TensorData::I32(v) => Ok(v.iter().map(|&x| x as i64).collect()),
            TensorData::I64(v) => Ok(v.clone()),
            TensorData::F64(v) => v.iter().map(|&x| integral(x)).collect(),
            TensorData::F32(v) => v.iter().map(|&x| integral(x as f64)).collect(),
        }
    }

    pub fn to_array(&self) -> Result<ArrayD<f64>> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.to_f64_vec())
            .map_err(|e| anyhow!("tensor shape {:?}: {}", self.shape, e))
    }

    /// Interprets the tensor as a matrix; 1-D tensors become a single column.
    pub fn to_matrix(&self) -> Result<Array2<f64>> {
        let (rows, cols) = match self.shape.as_slice() {
            [n] => (*n, 1),
            [r, c] => (*r, *c),
            other => bail!("expected a 2-D tensor, got shape {:?}", other),
        };
        Array2::from_shape_vec((rows, cols), self.to_f64_vec())
            .map_err(|e| anyhow!("tensor shape {:?}: {}", self.shape, e))
    }

    /// Flattens a vector or a single-column matrix.
    pub fn to_column(&self) -> Result<Array1<f64>> {
        match self.shape.as_slice() {
            [_] | [_, 1] => Ok(Array1::from(self.to_f64_vec())),
            other => bail!("expected a column tensor, got shape {:?}", other),
        }
    }
}

fn integral(x: f64) -> Result<i64> {
    if x.fract() != 0.0 || !x.is_finite() {
        bail!("expected an integer value, got {}", x);
    }
    Ok(x as i64)
}

/// Ordered map from entry name to tensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorBundle {
    entries: BTreeMap<String, Tensor>,
}

impl TensorBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.entries.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.entries.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Tensor> {
        self.entries
            .get(name)
            .ok_or_else(|| anyhow!("missing tensor `{}`", name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn is_hdf5_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("h5") | Some("hdf5") | Some("mat")
    )
}

pub fn is_gz_path(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("gz")
}

pub fn read_bundle(path: &Path) -> Result<TensorBundle> {
    if is_hdf5_path(path) {
        return h5::read_bundle(path)
            .with_context(|| format!("failed to read HDF5 store {}", path.display()));
    }
    reader::read_bundle(path)
        .with_context(|| format!("failed to read tensor bundle {}", path.display()))
}

pub fn write_bundle(path: &Path, bundle: &TensorBundle) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    if is_hdf5_path(path) {
        return h5::write_bundle(path, bundle)
            .with_context(|| format!("failed to write HDF5 store {}", path.display()));
    }
    writer::write_bundle(path, bundle)
        .with_context(|| format!("failed to write tensor bundle {}", path.display()))
}
