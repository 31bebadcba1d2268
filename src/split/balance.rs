use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{CoreResult, PipelineError};

/// Subsamples the majority label of `indices` down to the minority count.
/// Returns the kept indices in ascending order.
pub fn balance_classes(indices: &[usize], labels: &[f64], seed: u64) -> CoreResult<Vec<usize>> {
    let mut zeros = Vec::new();
    let mut ones = Vec::new();
    for &i in indices {
        let value = *labels
            .get(i)
            .ok_or_else(|| PipelineError::length("labels", i + 1, labels.len()))?;
        if value == 0.0 {
            zeros.push(i);
        } else if value == 1.0 {
            ones.push(i);
        } else {
            return Err(PipelineError::InvalidLabel { index: i, value });
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let keep = zeros.len().min(ones.len());
    let (minority, majority) = if zeros.len() <= ones.len() {
        (zeros, ones)
    } else {
        (ones, zeros)
    };
    let mut out = minority;
    out.extend(
        rand::seq::index::sample(&mut rng, majority.len(), keep)
            .into_iter()
            .map(|j| majority[j]),
    );
    out.sort_unstable();
    Ok(out)
}
