use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array1, ArrayD};

use crate::error::{CoreResult, PipelineError};
use crate::store::{TensorBundle, read_bundle};
use crate::weights::LayerPlan;

const KERNEL_SLOT: &str = "0";
const BIAS_SLOT: &str = "1";

#[derive(Debug, Clone, PartialEq)]
pub struct TensorPair {
    pub kernel: ArrayD<f64>,
    pub bias: Array1<f64>,
}

/// Pretrained weights keyed by layer name, read from `data/<layer>/0`
/// (kernel) and `data/<layer>/1` (bias) entries.
#[derive(Debug, Clone, Default)]
pub struct WeightArchive {
    layers: BTreeMap<String, TensorPair>,
    /// Layers where only one half of the pair was present, with the name of
    /// the missing entry.
    incomplete: BTreeMap<String, String>,
}

impl WeightArchive {
    /// Reads the archive and validates it against the plan.
    pub fn load(path: &Path, plan: &LayerPlan) -> Result<Self> {
        let bundle = read_bundle(path)?;
        let archive = Self::from_bundle(&bundle)
            .with_context(|| format!("weight archive {}", path.display()))?;
        archive
            .validate(plan)
            .with_context(|| format!("weight archive {}", path.display()))?;
        Ok(archive)
    }

    pub fn from_bundle(bundle: &TensorBundle) -> Result<Self> {
        let mut kernels: BTreeMap<String, ArrayD<f64>> = BTreeMap::new();
        let mut biases: BTreeMap<String, Array1<f64>> = BTreeMap::new();
        for (name, tensor) in bundle.iter() {
            let Some(rest) = name.strip_prefix("data/") else {
                continue;
            };
            let Some((layer, slot)) = rest.rsplit_once('/') else {
                continue;
            };
            match slot {
                KERNEL_SLOT => {
                    kernels.insert(layer.to_string(), tensor.to_array()?);
                }
                BIAS_SLOT => {
                    let values = tensor.to_f64_vec();
                    biases.insert(layer.to_string(), Array1::from(values));
                }
                _ => {}
            }
        }

        let mut archive = Self::default();
        for (layer, kernel) in kernels {
            match biases.remove(&layer) {
                Some(bias) => {
                    archive.layers.insert(layer, TensorPair { kernel, bias });
                }
                None => {
                    let missing = format!("data/{}/{}", layer, BIAS_SLOT);
                    archive.incomplete.insert(layer, missing);
                }
            }
        }
        for layer in biases.into_keys() {
            let missing = format!("data/{}/{}", layer, KERNEL_SLOT);
            archive.incomplete.insert(layer, missing);
        }
        Ok(archive)
    }

    pub fn insert(&mut self, layer: impl Into<String>, pair: TensorPair) {
        let layer = layer.into();
        self.incomplete.remove(&layer);
        self.layers.insert(layer, pair);
    }

    /// Fails listing every planned layer that is absent or half present.
    pub fn validate(&self, plan: &LayerPlan) -> CoreResult<()> {
        let missing: Vec<String> = plan
            .layers()
            .iter()
            .filter(|l| !self.layers.contains_key(&l.name))
            .map(|l| match self.incomplete.get(&l.name) {
                Some(entry) => entry.clone(),
                None => l.name.clone(),
            })
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::MissingLayers(missing))
        }
    }

    pub fn get(&self, layer: &str) -> Option<&TensorPair> {
        self.layers.get(layer)
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
