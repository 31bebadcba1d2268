use anyhow::{Context, Result};
use ndarray::Array1;
use tracing::{info, warn};

use crate::config::Task;
use crate::ctx::Ctx;
use crate::fusion::{FusionMode, LearnedFusion, LearnedInput, SvmParams, fuse};
use crate::pipeline::Stage;
use crate::scores::{ScoredPredictions, evaluate, evaluate_threshold};

pub struct Stage8Fusion;

impl Stage8Fusion {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage8Fusion {
    fn name(&self) -> &'static str {
        "stage8_fusion"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        if ctx.predictions.len() < 2 {
            info!(streams = ctx.predictions.len(), "fusion_skipped");
            return Ok(());
        }
        let config = &ctx.config;
        let reference = config.reference_stream();
        let truth = ctx
            .predictions_of(reference)
            .with_context(|| format!("{} predictions missing", reference.name()))?
            .aligned_truth();

        let per_stream: Vec<Array1<f64>> =
            ctx.predictions.iter().map(|p| p.aligned_scores()).collect();
        for p in &ctx.predictions {
            let other = p.aligned_truth();
            if other.len() == truth.len() && other != truth {
                warn!(
                    stream = p.stream.name(),
                    reference = reference.name(),
                    "fusion_labels_disagree"
                );
            }
        }

        let average = fuse(&per_stream, FusionMode::Average)
            .context("streams cannot be fused sample by sample")?;
        let mut scored = vec![ScoredPredictions {
            name: "average".to_string(),
            samples: average.len(),
            evaluation: evaluate_threshold(truth.view(), average.view(), config.threshold)?,
        }];

        let both_classes = truth.iter().any(|&t| t == 0.0) && truth.iter().any(|&t| t == 1.0);
        let mut warnings = Vec::new();
        if matches!(config.task, Task::Train) && !both_classes {
            warn!(samples = truth.len(), "fusion_svm_skipped_single_class");
            warnings.push("learned fusion skipped: fused test set holds a single class".to_string());
        } else if matches!(config.task, Task::Train) {
            let params = SvmParams::default();

            let learned =
                LearnedFusion::fit(LearnedInput::PerStream, &per_stream, truth.view(), &params)
                    .context("fitting per-stream fusion SVM")?;
            let predicted = fuse(&per_stream, FusionMode::Learned(&learned))?;
            scored.push(ScoredPredictions {
                name: "svm".to_string(),
                samples: predicted.len(),
                evaluation: evaluate(truth.view(), predicted.view())?,
            });

            let averaged =
                LearnedFusion::fit(LearnedInput::Averaged, &per_stream, truth.view(), &params)
                    .context("fitting averaged fusion SVM")?;
            let predicted = fuse(&per_stream, FusionMode::Learned(&averaged))?;
            scored.push(ScoredPredictions {
                name: "svm_average".to_string(),
                samples: predicted.len(),
                evaluation: evaluate(truth.view(), predicted.view())?,
            });
            let path = config.svm_path();
            averaged.svm.save(&path)?;
            info!(
                path = %path.display(),
                support_vectors = averaged.svm.n_support(),
                "fusion_svm_saved"
            );
        }

        for s in &scored {
            info!(
                fusion = %s.name,
                samples = s.samples,
                accuracy = s.evaluation.accuracy(),
                "fusion_evaluated"
            );
        }
        ctx.fusion_scores.extend(scored);
        ctx.warnings.extend(warnings);
        ctx.fused = Some(average);
        Ok(())
    }
}
