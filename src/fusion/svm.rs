//! C-SVC with an RBF kernel, solved by SMO with maximal-violating-pair
//! working-set selection.
//!
//! Labels map 1 -> +1 and 0 -> -1; a positive decision value predicts 1.
//! `gamma` defaults to `1 / (n_features * Var(X))` over all entries of X.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreResult, PipelineError};
use crate::net::check_labels;

const TAU: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvmParams {
    pub c: f64,
    /// `None` selects the variance-scaled default.
    pub gamma: Option<f64>,
    pub tolerance: f64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: None,
            tolerance: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Svm {
    pub gamma: f64,
    pub c: f64,
    support: Vec<Vec<f64>>,
    /// `alpha_i * y_i` per support vector.
    dual_coef: Vec<f64>,
    rho: f64,
}

pub fn scale_gamma(x: ArrayView2<'_, f64>) -> f64 {
    let n = x.len();
    if n == 0 {
        return 1.0;
    }
    let mean = x.sum() / n as f64;
    let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    if var > 0.0 {
        1.0 / (x.ncols() as f64 * var)
    } else {
        1.0
    }
}

fn rbf(gamma: f64, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let d2: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q) * (p - q)).sum();
    (-gamma * d2).exp()
}

impl Svm {
    pub fn fit(x: ArrayView2<'_, f64>, labels: ArrayView1<'_, f64>, params: &SvmParams) -> CoreResult<Self> {
        let n = x.nrows();
        if labels.len() != n {
            return Err(PipelineError::length("svm labels", n, labels.len()));
        }
        if n == 0 {
            return Err(PipelineError::length("svm training samples", 1, 0));
        }
        check_labels(labels)?;
        if labels.iter().all(|&l| l == labels[0]) {
            return Err(PipelineError::SingleClass(labels[0] as u8));
        }

        let gamma = params.gamma.unwrap_or_else(|| scale_gamma(x));
        let c = params.c;
        let y: Vec<f64> = labels.iter().map(|&l| if l == 1.0 { 1.0 } else { -1.0 }).collect();
        let q_row = |i: usize| -> Vec<f64> {
            let xi = x.row(i);
            (0..n)
                .map(|t| y[i] * y[t] * rbf(gamma, xi, x.row(t)))
                .collect()
        };
        // RBF diagonal is 1.
        let qd = 1.0;

        let mut alpha = vec![0.0f64; n];
        let mut grad = vec![-1.0f64; n];
        let is_up = |t: usize, a: f64| (y[t] > 0.0 && a < c) || (y[t] < 0.0 && a > 0.0);
        let is_low = |t: usize, a: f64| (y[t] > 0.0 && a > 0.0) || (y[t] < 0.0 && a < c);

        let max_iter = (100 * n).max(10_000_000);
        let mut iter = 0usize;
        while iter < max_iter {
            let mut g_max = f64::NEG_INFINITY;
            let mut g_min = f64::INFINITY;
            let mut i = usize::MAX;
            let mut j = usize::MAX;
            for t in 0..n {
                let v = -y[t] * grad[t];
                if is_up(t, alpha[t]) && v > g_max {
                    g_max = v;
                    i = t;
                }
                if is_low(t, alpha[t]) && v < g_min {
                    g_min = v;
                    j = t;
                }
            }
            if i == usize::MAX || j == usize::MAX || g_max - g_min < params.tolerance {
                break;
            }
            iter += 1;

            let qi = q_row(i);
            let qj = q_row(j);
            let (old_i, old_j) = (alpha[i], alpha[j]);
            let (mut ai, mut aj) = (old_i, old_j);
            if y[i] != y[j] {
                let quad = (qd + qd + 2.0 * qi[j]).max(TAU);
                let delta = (-grad[i] - grad[j]) / quad;
                let diff = ai - aj;
                ai += delta;
                aj += delta;
                if diff > 0.0 {
                    if aj < 0.0 {
                        aj = 0.0;
                        ai = diff;
                    }
                } else if ai < 0.0 {
                    ai = 0.0;
                    aj = -diff;
                }
                if diff > 0.0 {
                    if ai > c {
                        ai = c;
                        aj = c - diff;
                    }
                } else if aj > c {
                    aj = c;
                    ai = c + diff;
                }
            } else {
                let quad = (qd + qd - 2.0 * qi[j]).max(TAU);
                let delta = (grad[i] - grad[j]) / quad;
                let sum = ai + aj;
                ai -= delta;
                aj += delta;
                if sum > c {
                    if ai > c {
                        ai = c;
                        aj = sum - c;
                    }
                } else if aj < 0.0 {
                    aj = 0.0;
                    ai = sum;
                }
                if sum > c {
                    if aj > c {
                        aj = c;
                        ai = sum - c;
                    }
                } else if ai < 0.0 {
                    ai = 0.0;
                    aj = sum;
                }
            }
            alpha[i] = ai;
            alpha[j] = aj;
            let (di, dj) = (ai - old_i, aj - old_j);
            for t in 0..n {
                grad[t] += qi[t] * di + qj[t] * dj;
            }
        }
        if iter >= max_iter {
            warn!(iterations = iter, "svm_max_iterations_reached");
        }

        let rho = compute_rho(&y, &alpha, &grad, c);
        let mut support = Vec::new();
        let mut dual_coef = Vec::new();
        for t in 0..n {
            if alpha[t] > 0.0 {
                support.push(x.row(t).to_vec());
                dual_coef.push(alpha[t] * y[t]);
            }
        }
        debug!(iterations = iter, support_vectors = support.len(), gamma, rho, "svm_fitted");
        Ok(Self {
            gamma,
            c,
            support,
            dual_coef,
            rho,
        })
    }

    pub fn n_features(&self) -> Option<usize> {
        self.support.first().map(|s| s.len())
    }

    pub fn n_support(&self) -> usize {
        self.support.len()
    }

    /// Signed distances for a batch of rows.
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> CoreResult<Array1<f64>> {
        if let Some(d) = self.n_features() {
            if x.ncols() != d {
                return Err(PipelineError::ShapeMismatch {
                    what: "svm input".to_string(),
                    expected: vec![x.nrows(), d],
                    actual: x.shape().to_vec(),
                });
            }
        }
        Ok(x.axis_iter(Axis(0))
            .map(|row| {
                self.support
                    .iter()
                    .zip(&self.dual_coef)
                    .map(|(sv, &coef)| coef * rbf(self.gamma, ArrayView1::from(sv.as_slice()), row))
                    .sum::<f64>()
                    - self.rho
            })
            .collect())
    }

    /// Predicted labels (0 or 1) for a batch of rows.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> CoreResult<Array1<f64>> {
        Ok(self
            .decision_function(x)?
            .mapv(|d| if d > 0.0 { 1.0 } else { 0.0 }))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let svm = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse svm {}", path.display()))?;
        Ok(svm)
    }
}

fn compute_rho(y: &[f64], alpha: &[f64], grad: &[f64], c: f64) -> f64 {
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut free = 0usize;
    let mut sum_free = 0.0;
    for t in 0..y.len() {
        let yg = y[t] * grad[t];
        if alpha[t] >= c {
            if y[t] < 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else if alpha[t] <= 0.0 {
            if y[t] > 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else {
            free += 1;
            sum_free += yg;
        }
    }
    if free > 0 {
        sum_free / free as f64
    } else {
        (ub + lb) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn separates_one_dimensional_scores() {
        let x = array![[0.05], [0.1], [0.2], [0.15], [0.8], [0.9], [0.85], [0.95]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let svm = Svm::fit(x.view(), y.view(), &SvmParams::default()).unwrap();
        let p = svm.predict(array![[0.1], [0.9]].view()).unwrap();
        assert_eq!(p.to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn single_class_is_rejected() {
        let x = array![[0.1], [0.2]];
        let y = array![1.0, 1.0];
        let err = Svm::fit(x.view(), y.view(), &SvmParams::default()).unwrap_err();
        assert!(matches!(err, PipelineError::SingleClass(1)));
    }
}
