use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, PipelineError};
use crate::net::{Classifier, FitOptions, History, check_labels};

const BN_EPSILON: f64 = 1e-3;
const LOSS_EPSILON: f64 = 1e-7;
const BETA_1: f64 = 0.9;
const BETA_2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
const DECAY: f64 = 5e-4;

/// Single sigmoid unit over (optionally standardised) features.
///
/// With `batch_norm` the inputs are standardised with training-set
/// statistics and passed through ReLU; without it they pass through ELU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticHead {
    pub batch_norm: bool,
    pub learning_rate: f64,
    mean: Vec<f64>,
    scale: Vec<f64>,
    weights: Vec<f64>,
    bias: f64,
}

struct Adam {
    m: Vec<f64>,
    v: Vec<f64>,
    iterations: u64,
}

impl LogisticHead {
    pub fn new(learning_rate: f64, batch_norm: bool) -> Self {
        Self {
            batch_norm,
            learning_rate,
            mean: Vec::new(),
            scale: Vec::new(),
            weights: Vec::new(),
            bias: 0.0,
        }
    }

    pub fn n_inputs(&self) -> usize {
        self.weights.len()
    }

    fn activate(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        if self.batch_norm {
            Array1::from_iter(
                row.iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(&x, (&m, &s))| ((x - m) / s).max(0.0)),
            )
        } else {
            row.mapv(|x| if x > 0.0 { x } else { x.exp() - 1.0 })
        }
    }

    fn forward(&self, row: ArrayView1<'_, f64>) -> (Array1<f64>, f64) {
        let h = self.activate(row);
        let z = h.iter().zip(&self.weights).map(|(a, w)| a * w).sum::<f64>() + self.bias;
        (h, sigmoid(z))
    }

    fn evaluate(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, class_weight: [f64; 2]) -> (f64, f64) {
        let n = x.nrows();
        if n == 0 {
            return (0.0, 0.0);
        }
        let mut loss = 0.0;
        let mut correct = 0usize;
        for (row, &label) in x.axis_iter(Axis(0)).zip(y.iter()) {
            let (_, p) = self.forward(row);
            loss += class_weight[label as usize] * bce(p, label);
            if (p > 0.5) == (label == 1.0) {
                correct += 1;
            }
        }
        (loss / n as f64, correct as f64 / n as f64)
    }

    fn fit_standardisation(&mut self, x: ArrayView2<'_, f64>) {
        let d = x.ncols();
        let n = x.nrows() as f64;
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(d));
        let mut var = Array1::<f64>::zeros(d);
        for row in x.axis_iter(Axis(0)) {
            var += &(&row - &mean).mapv(|v| v * v);
        }
        var /= n.max(1.0);
        self.mean = mean.to_vec();
        self.scale = var.iter().map(|v| (v + BN_EPSILON).sqrt()).collect();
    }
}

impl Adam {
    fn new(d: usize) -> Self {
        Self {
            m: vec![0.0; d + 1],
            v: vec![0.0; d + 1],
            iterations: 0,
        }
    }

    /// Updates `params` (weights then bias) in place from `grads`.
    fn step(&mut self, lr: f64, params: &mut [f64], grads: &[f64]) {
        self.iterations += 1;
        let t = self.iterations as f64;
        let lr_t = lr / (1.0 + DECAY * (t - 1.0));
        let lr_t = lr_t * (1.0 - BETA_2.powf(t)).sqrt() / (1.0 - BETA_1.powf(t));
        for (i, (p, &g)) in params.iter_mut().zip(grads).enumerate() {
            self.m[i] = BETA_1 * self.m[i] + (1.0 - BETA_1) * g;
            self.v[i] = BETA_2 * self.v[i] + (1.0 - BETA_2) * g * g;
            *p -= lr_t * self.m[i] / (self.v[i].sqrt() + ADAM_EPSILON);
        }
    }
}

impl Classifier for LogisticHead {
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        validation: Option<(ArrayView2<'_, f64>, ArrayView1<'_, f64>)>,
        opts: &FitOptions,
    ) -> CoreResult<History> {
        let (n, d) = x.dim();
        if y.len() != n {
            return Err(PipelineError::length("training labels", n, y.len()));
        }
        if n == 0 {
            return Err(PipelineError::length("training samples", 1, 0));
        }
        check_labels(y)?;
        if let Some((vx, vy)) = &validation {
            if vx.ncols() != d {
                return Err(PipelineError::ShapeMismatch {
                    what: "validation features".to_string(),
                    expected: vec![vx.nrows(), d],
                    actual: vx.shape().to_vec(),
                });
            }
            if vy.len() != vx.nrows() {
                return Err(PipelineError::length("validation labels", vx.nrows(), vy.len()));
            }
            check_labels(*vy)?;
        }

        let mut rng = StdRng::seed_from_u64(opts.seed);
        if self.batch_norm {
            self.fit_standardisation(x);
        }
        let limit = (6.0 / (d as f64 + 1.0)).sqrt();
        self.weights = (0..d).map(|_| rng.gen_range(-limit..limit)).collect();
        self.bias = 0.0;

        let batch = if opts.batch_size == 0 { n } else { opts.batch_size.min(n) };
        let mut adam = Adam::new(d);
        let mut order: Vec<usize> = (0..n).collect();
        let mut history = History::default();
        let mut params = vec![0.0; d + 1];
        let mut grads = vec![0.0; d + 1];

        for _ in 0..opts.epochs {
            order.shuffle(&mut rng);
            for chunk in order.chunks(batch) {
                grads.iter_mut().for_each(|g| *g = 0.0);
                for &i in chunk {
                    let label = y[i];
                    let (h, p) = self.forward(x.row(i));
                    let dz = opts.class_weight[label as usize] * (p - label);
                    for (g, a) in grads[..d].iter_mut().zip(h.iter()) {
                        *g += dz * a;
                    }
                    grads[d] += dz;
                }
                let m = chunk.len() as f64;
                grads.iter_mut().for_each(|g| *g /= m);

                params[..d].copy_from_slice(&self.weights);
                params[d] = self.bias;
                adam.step(self.learning_rate, &mut params, &grads);
                self.weights.copy_from_slice(&params[..d]);
                self.bias = params[d];
            }

            let (loss, acc) = self.evaluate(x, y, opts.class_weight);
            history.loss.push(loss);
            history.accuracy.push(acc);
            if let Some((vx, vy)) = &validation {
                let (vloss, vacc) = self.evaluate(*vx, *vy, [1.0, 1.0]);
                history.val_loss.push(vloss);
                history.val_accuracy.push(vacc);
            }
        }
        Ok(history)
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> CoreResult<Array1<f64>> {
        if x.ncols() != self.weights.len() {
            return Err(PipelineError::ShapeMismatch {
                what: "classifier input".to_string(),
                expected: vec![x.nrows(), self.weights.len()],
                actual: x.shape().to_vec(),
            });
        }
        Ok(x.axis_iter(Axis(0)).map(|row| self.forward(row).1).collect())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let head: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse classifier {}", path.display()))?;
        Ok(head)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn bce(p: f64, label: f64) -> f64 {
    let p = p.clamp(LOSS_EPSILON, 1.0 - LOSS_EPSILON);
    -(label * p.ln() + (1.0 - label) * (1.0 - p).ln())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn separable_points_are_learned() {
        let x = array![[0.0, 0.1], [0.2, 0.0], [0.1, 0.2], [2.0, 2.1], [2.2, 1.9], [1.9, 2.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut head = LogisticHead::new(0.1, true);
        let opts = FitOptions {
            class_weight: [1.0, 1.0],
            batch_size: 0,
            epochs: 200,
            seed: 7,
        };
        let history = head.fit(x.view(), y.view(), None, &opts).unwrap();
        assert_eq!(history.loss.len(), 200);
        assert!(history.loss[199] < history.loss[0]);
        let p = head.predict(x.view()).unwrap();
        assert!(p[0] < 0.5 && p[5] > 0.5);
    }

    #[test]
    fn non_binary_labels_rejected() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 2.0];
        let mut head = LogisticHead::new(0.01, false);
        let opts = FitOptions {
            class_weight: [1.0, 1.0],
            batch_size: 0,
            epochs: 1,
            seed: 0,
        };
        let err = head.fit(x.view(), y.view(), None, &opts).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidLabel { index: 1, .. }));
    }
}
