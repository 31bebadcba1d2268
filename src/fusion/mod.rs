use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, PipelineError};

pub mod svm;

pub use svm::{Svm, SvmParams};

/// What a learned fusion is fit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnedInput {
    /// One column per stream.
    PerStream,
    /// The single column of the stream average.
    Averaged,
}

#[derive(Debug, Clone, Copy)]
pub enum FusionMode<'a> {
    Average,
    Learned(&'a LearnedFusion),
}

/// SVM over per-stream predictions, fit against ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedFusion {
    pub input: LearnedInput,
    pub svm: Svm,
}

fn check_aligned(per_stream: &[Array1<f64>]) -> CoreResult<usize> {
    let first = per_stream
        .first()
        .ok_or_else(|| PipelineError::length("fused streams", 1, 0))?;
    let n = first.len();
    for p in &per_stream[1..] {
        if p.len() != n {
            return Err(PipelineError::length("stream predictions", n, p.len()));
        }
    }
    Ok(n)
}

/// Element-wise mean of equally long per-stream predictions.
pub fn average(per_stream: &[Array1<f64>]) -> CoreResult<Array1<f64>> {
    let n = check_aligned(per_stream)?;
    let mut sum = Array1::<f64>::zeros(n);
    for p in per_stream {
        sum += p;
    }
    Ok(sum / per_stream.len() as f64)
}

fn design_matrix(per_stream: &[Array1<f64>], input: LearnedInput) -> CoreResult<Array2<f64>> {
    let n = check_aligned(per_stream)?;
    Ok(match input {
        LearnedInput::PerStream => {
            Array2::from_shape_fn((n, per_stream.len()), |(i, s)| per_stream[s][i])
        }
        LearnedInput::Averaged => average(per_stream)?.insert_axis(ndarray::Axis(1)),
    })
}

impl LearnedFusion {
    pub fn fit(
        input: LearnedInput,
        per_stream: &[Array1<f64>],
        truth: ArrayView1<'_, f64>,
        params: &SvmParams,
    ) -> CoreResult<Self> {
        let x = design_matrix(per_stream, input)?;
        let svm = Svm::fit(x.view(), truth, params)?;
        Ok(Self { input, svm })
    }

    pub fn predict(&self, per_stream: &[Array1<f64>]) -> CoreResult<Array1<f64>> {
        let x = design_matrix(per_stream, self.input)?;
        self.svm.predict(x.view())
    }
}

/// Combines per-stream predictions. Average output stays continuous; a
/// learned fusion yields labels directly.
pub fn fuse(per_stream: &[Array1<f64>], mode: FusionMode<'_>) -> CoreResult<Array1<f64>> {
    match mode {
        FusionMode::Average => average(per_stream),
        FusionMode::Learned(model) => model.predict(per_stream),
    }
}

/// `< cutoff` becomes 0, everything else 1.
pub fn binarize(pred: ArrayView1<'_, f64>, cutoff: f64) -> Array1<f64> {
    pred.mapv(|p| if p < cutoff { 0.0 } else { 1.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn average_rejects_misaligned_streams() {
        let err = average(&[array![0.1, 0.2], array![0.3]]).unwrap_err();
        assert!(matches!(err, PipelineError::LengthMismatch { .. }));
    }

    #[test]
    fn binarize_cutoff_is_inclusive_for_one() {
        let b = binarize(array![0.49, 0.5, 0.51].view(), 0.5);
        assert_eq!(b.to_vec(), vec![0.0, 1.0, 1.0]);
    }
}
