use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::ctx::{Ctx, StreamPredictions};
use crate::io::write_pretty;
use crate::net::{Classifier, FitOptions, LogisticHead};
use crate::pipeline::Stage;
use crate::scores::{ScoredPredictions, evaluate_threshold};
use crate::split::{gather, gather_rows, split};

pub struct Stage5Holdout;

impl Stage5Holdout {
    pub fn new() -> Self {
        Self
    }
}

pub fn fit_options(config: &Config) -> FitOptions {
    FitOptions {
        class_weight: [config.training.weight_0, 1.0],
        batch_size: config.training.mini_batch_size,
        epochs: config.training.epochs,
        seed: config.seed,
    }
}

impl Stage for Stage5Holdout {
    fn name(&self) -> &'static str {
        "stage5_holdout"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let opts = fit_options(&ctx.config);
        let streams = ctx.config.streams.clone();
        for stream in streams {
            let config = &ctx.config;
            let store = ctx.store(stream)?;
            let holdout = split(&store.table, config.test_fraction, config.seed)
                .with_context(|| format!("splitting {} videos", stream.name()))?;
            let train = holdout.train_ranges(&store.table);
            let test = holdout.test_ranges(&store.table);

            let x_train = gather_rows(store.features.view(), &train);
            let y_train = gather(store.labels.view(), &train);
            let x_test = gather_rows(store.features.view(), &test);
            let y_test = gather(store.labels.view(), &test);
            info!(
                stream = stream.name(),
                train_videos = holdout.train_videos.len(),
                test_videos = holdout.test_videos.len(),
                train_samples = y_train.len(),
                test_samples = y_test.len(),
                "holdout_split"
            );

            let mut head = LogisticHead::new(
                config.training.learning_rate,
                config.training.batch_norm,
            );
            let validation = (!y_test.is_empty()).then(|| (x_test.view(), y_test.view()));
            let history = head
                .fit(x_train.view(), y_train.view(), validation, &opts)
                .with_context(|| format!("training {} classifier", stream.name()))?;
            head.save(&config.classifier_path(stream))?;
            write_pretty(&config.history_path(stream), &history)?;
            info!(
                stream = stream.name(),
                epochs = history.loss.len(),
                final_loss = history.loss.last().copied().unwrap_or(f64::NAN),
                classifier = %config.classifier_path(stream).display(),
                "classifier_trained"
            );

            let scores = head.predict(x_test.view())?;
            let evaluation = evaluate_threshold(y_test.view(), scores.view(), config.threshold)?;
            let scored = ScoredPredictions {
                name: stream.name().to_string(),
                samples: y_test.len(),
                evaluation,
            };
            let predictions = StreamPredictions::new(stream, y_test, scores, &test, config);

            ctx.stream_scores.push(scored);
            ctx.predictions.push(predictions);
            ctx.splits.push((stream, holdout));
        }
        Ok(())
    }
}
