use anyhow::{Context, Result};
use tracing::info;

use crate::ctx::Ctx;
use crate::extract::extract_features;
use crate::flow::FlowMean;
use crate::pipeline::Stage;

pub struct Stage3Extract;

impl Stage3Extract {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage3Extract {
    fn name(&self) -> &'static str {
        "stage3_extract"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let config = &ctx.config;
        let mean_path = config.mean_path.as_ref().context("--mean is required")?;
        let mean = FlowMean::load(
            mean_path,
            config.window,
            config.frame_height,
            config.frame_width,
        )?;
        let backbone = ctx
            .backbone
            .as_ref()
            .context("backbone not transplanted")?;

        let store = extract_features(
            backbone,
            &ctx.videos,
            config.classes.len(),
            config.window,
            &mean,
        )?;
        store.save(config)?;
        info!(
            stream = store.stream.name(),
            samples = store.n_samples(),
            videos = store.table.n_videos(),
            features = %config.features_path(store.stream).display(),
            "stream_store_saved"
        );
        ctx.stores.push(store);
        Ok(())
    }
}
