use anyhow::{Context, Result};
use ndarray::Axis;
use tracing::info;

use crate::ctx::Ctx;
use crate::io::write_pretty;
use crate::net::{Classifier, LogisticHead};
use crate::pipeline::Stage;
use crate::pipeline::stage5_holdout::fit_options;
use crate::scores::{CrossValidationScores, FoldSummary, evaluate_threshold};
use crate::split::{CrossValidator, balance_classes};

pub struct Stage6CrossValidate;

impl Stage6CrossValidate {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage6CrossValidate {
    fn name(&self) -> &'static str {
        "stage6_cross_validate"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let opts = fit_options(&ctx.config);
        let streams = ctx.config.streams.clone();
        for stream in streams {
            let config = &ctx.config;
            let store = ctx.store(stream)?;
            let labels = store.labels.to_vec();
            let cv = CrossValidator::from_labels(&labels, config.nsplits)
                .with_context(|| format!("{} cross validation", stream.name()))?
                .shuffled(config.seed);

            let mut folds = Vec::with_capacity(cv.k());
            for fold in cv.folds() {
                let train = if config.balance {
                    balance_classes(&fold.train, &labels, config.seed.wrapping_add(fold.index as u64))?
                } else {
                    fold.train
                };
                let x_train = store.features.select(Axis(0), &train);
                let y_train = store.labels.select(Axis(0), &train);
                let x_test = store.features.select(Axis(0), &fold.test);
                let y_test = store.labels.select(Axis(0), &fold.test);

                let mut head = LogisticHead::new(
                    config.training.learning_rate,
                    config.training.batch_norm,
                );
                let history = head
                    .fit(x_train.view(), y_train.view(), None, &opts)
                    .with_context(|| format!("{} fold {}", stream.name(), fold.index))?;
                if fold.index == 0 {
                    head.save(&config.classifier_path(stream))?;
                    write_pretty(&config.history_path(stream), &history)?;
                }

                let scores = head.predict(x_test.view())?;
                let evaluation =
                    evaluate_threshold(y_test.view(), scores.view(), config.threshold)?;
                info!(
                    stream = stream.name(),
                    fold = fold.index,
                    train_samples = train.len(),
                    test_samples = fold.test.len(),
                    accuracy = evaluation.accuracy(),
                    "fold_evaluated"
                );
                folds.push(evaluation);
            }

            let summary = FoldSummary::from_evaluations(&folds);
            info!(
                stream = stream.name(),
                folds = folds.len(),
                accuracy_mean = summary.accuracy.mean,
                accuracy_std = summary.accuracy.std,
                "cross_validation_finished"
            );
            ctx.cv_scores.push(CrossValidationScores {
                stream: stream.name().to_string(),
                folds,
                summary,
            });
        }
        Ok(())
    }
}
