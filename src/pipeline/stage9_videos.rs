use anyhow::{Context, Result};
use tracing::info;

use crate::ctx::Ctx;
use crate::fusion::binarize;
use crate::pipeline::Stage;
use crate::scores::score;

pub struct Stage9Videos;

impl Stage9Videos {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage9Videos {
    fn name(&self) -> &'static str {
        "stage9_videos"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let config = &ctx.config;
        let reference = config.reference_stream();
        let store = ctx.store(reference)?;
        let scores = match &ctx.fused {
            Some(fused) => fused.clone(),
            None => ctx
                .predictions_of(reference)
                .with_context(|| format!("{} predictions missing", reference.name()))?
                .aligned_scores(),
        };
        let predicted = binarize(scores.view(), config.threshold);
        let report = score(
            store.labels.view(),
            predicted.view(),
            &store.table,
            &config.classes,
        )
        .with_context(|| format!("scoring {} videos", reference.name()))?;
        info!(
            stream = reference.name(),
            videos = report.videos.len(),
            hits = report.hits(),
            misses = report.misses(),
            "videos_scored"
        );
        ctx.video_report = Some(report);
        Ok(())
    }
}
