use anyhow::{Context, Result};
use tracing::info;

use crate::ctx::{Ctx, StreamPredictions};
use crate::net::{Classifier, LogisticHead};
use crate::pipeline::Stage;
use crate::scores::{ScoredPredictions, evaluate_threshold};
use crate::split::video_ranges;

pub struct Stage7Predict;

impl Stage7Predict {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage7Predict {
    fn name(&self) -> &'static str {
        "stage7_predict"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let streams = ctx.config.streams.clone();
        for stream in streams {
            let config = &ctx.config;
            let store = ctx.store(stream)?;
            let path = config.classifier_path(stream);
            let head = LogisticHead::load(&path)
                .with_context(|| format!("loading {} classifier", stream.name()))?;

            let scores = head.predict(store.features.view())?;
            let evaluation =
                evaluate_threshold(store.labels.view(), scores.view(), config.threshold)?;
            info!(
                stream = stream.name(),
                classifier = %path.display(),
                samples = scores.len(),
                accuracy = evaluation.accuracy(),
                "stream_predicted"
            );

            let all: Vec<usize> = (0..store.table.n_videos()).collect();
            let ranges = video_ranges(&store.table, &all);
            let predictions =
                StreamPredictions::new(stream, store.labels.clone(), scores, &ranges, config);
            let scored = ScoredPredictions {
                name: stream.name().to_string(),
                samples: store.n_samples(),
                evaluation,
            };
            ctx.stream_scores.push(scored);
            ctx.predictions.push(predictions);
        }
        Ok(())
    }
}
