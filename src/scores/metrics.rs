use ndarray::ArrayView1;
use serde::Serialize;
use tracing::warn;

use crate::error::{CoreResult, PipelineError};
use crate::fusion::binarize;
use crate::net::check_labels;

/// Confusion counts with label 0 (fall) as the positive class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fn_: usize,
    pub fp: usize,
    pub tn: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> CoreResult<Self> {
        if truth.len() != predicted.len() {
            return Err(PipelineError::length(
                "predictions vs ground truth",
                truth.len(),
                predicted.len(),
            ));
        }
        check_labels(truth)?;
        check_labels(predicted)?;
        let mut cm = Self::default();
        for (&t, &p) in truth.iter().zip(predicted.iter()) {
            match (t == 0.0, p == 0.0) {
                (true, true) => cm.tp += 1,
                (true, false) => cm.fn_ += 1,
                (false, true) => cm.fp += 1,
                (false, false) => cm.tn += 1,
            }
        }
        Ok(cm)
    }

    pub fn total(&self) -> usize {
        self.tp + self.fn_ + self.fp + self.tn
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.tp + self.tn) as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub confusion: ConfusionMatrix,
    pub tpr: f64,
    pub tnr: f64,
    pub fpr: f64,
    pub fnr: f64,
    pub precision: f64,
    pub recall: f64,
    pub specificity: f64,
    pub f1: f64,
    pub accuracy: f64,
}

impl Metrics {
    pub fn sensitivity(&self) -> f64 {
        self.recall
    }

    /// False alarm rate.
    pub fn far(&self) -> f64 {
        self.fpr
    }

    /// Missed detection rate.
    pub fn mdr(&self) -> f64 {
        self.fnr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Evaluation {
    Complete(Metrics),
    /// A ratio had a zero denominator; only accuracy is meaningful.
    Degenerate {
        confusion: ConfusionMatrix,
        accuracy: f64,
    },
}

impl Evaluation {
    pub fn accuracy(&self) -> f64 {
        match self {
            Self::Complete(m) => m.accuracy,
            Self::Degenerate { accuracy, .. } => *accuracy,
        }
    }

    pub fn confusion(&self) -> ConfusionMatrix {
        match self {
            Self::Complete(m) => m.confusion,
            Self::Degenerate { confusion, .. } => *confusion,
        }
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        match self {
            Self::Complete(m) => Some(m),
            Self::Degenerate { .. } => None,
        }
    }
}

pub fn evaluate(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> CoreResult<Evaluation> {
    let cm = ConfusionMatrix::from_labels(truth, predicted)?;
    let accuracy = cm.accuracy();
    let (tp, fn_, fp, tn) = (cm.tp as f64, cm.fn_ as f64, cm.fp as f64, cm.tn as f64);
    if cm.tp + cm.fn_ == 0 || cm.fp + cm.tn == 0 || cm.tp + cm.fp == 0 {
        warn!(
            tp = cm.tp,
            fn_ = cm.fn_,
            fp = cm.fp,
            tn = cm.tn,
            accuracy,
            "degenerate_confusion_matrix"
        );
        return Ok(Evaluation::Degenerate {
            confusion: cm,
            accuracy,
        });
    }
    let tpr = tp / (tp + fn_);
    let tnr = tn / (tn + fp);
    let precision = tp / (tp + fp);
    let recall = tpr;
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    Ok(Evaluation::Complete(Metrics {
        confusion: cm,
        tpr,
        tnr,
        fpr: fp / (fp + tn),
        fnr: fn_ / (fn_ + tp),
        precision,
        recall,
        specificity: tnr,
        f1,
        accuracy,
    }))
}

/// Thresholds continuous scores, then evaluates.
pub fn evaluate_threshold(
    truth: ArrayView1<'_, f64>,
    scores: ArrayView1<'_, f64>,
    threshold: f64,
) -> CoreResult<Evaluation> {
    evaluate(truth, binarize(scores, threshold).view())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
    /// Folds the metric was defined for.
    pub folds: usize,
}

impl MetricSummary {
    pub fn from_values(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self {
                mean: f64::NAN,
                std: f64::NAN,
                folds: 0,
            };
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
        Self {
            mean,
            std: var.sqrt(),
            folds: n,
        }
    }
}

/// Mean and population standard deviation across folds. Degenerate folds
/// only contribute their accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FoldSummary {
    pub sensitivity: MetricSummary,
    pub specificity: MetricSummary,
    pub far: MetricSummary,
    pub mdr: MetricSummary,
    pub accuracy: MetricSummary,
}

impl FoldSummary {
    pub fn from_evaluations(evals: &[Evaluation]) -> Self {
        let complete: Vec<&Metrics> = evals.iter().filter_map(|e| e.metrics()).collect();
        let pick = |f: fn(&Metrics) -> f64| -> MetricSummary {
            MetricSummary::from_values(&complete.iter().map(|m| f(*m)).collect::<Vec<_>>())
        };
        Self {
            sensitivity: pick(Metrics::sensitivity),
            specificity: pick(|m| m.specificity),
            far: pick(Metrics::far),
            mdr: pick(Metrics::mdr),
            accuracy: MetricSummary::from_values(
                &evals.iter().map(Evaluation::accuracy).collect::<Vec<_>>(),
            ),
        }
    }
}
