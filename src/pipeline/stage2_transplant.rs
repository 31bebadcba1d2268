use anyhow::{Context, Result};
use tracing::info;

use crate::config::Task;
use crate::ctx::Ctx;
use crate::net::ConvNet;
use crate::pipeline::Stage;
use crate::store::write_bundle;
use crate::weights::{LayerPlan, WeightArchive, transplant};

pub struct Stage2Transplant;

impl Stage2Transplant {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage2Transplant {
    fn name(&self) -> &'static str {
        "stage2_transplant"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let config = &ctx.config;
        let weights = config
            .weights_path
            .as_ref()
            .context("--weights is required")?;
        let plan = LayerPlan::from_spec(&config.net);
        let archive = WeightArchive::load(weights, &plan)?;

        let mut net = ConvNet::new(
            &config.net,
            config.stacks_depth(),
            config.frame_height,
            config.frame_width,
        )?
        .with_threads(config.threads)?;
        let report = transplant(&archive, &plan, &mut net)
            .with_context(|| format!("transplanting {}", weights.display()))?;
        info!(
            weights = %weights.display(),
            conv_layers = report.conv_layers,
            dense_layers = report.dense_layers,
            "weights_transplanted"
        );

        if matches!(config.task, Task::Transplant) {
            let path = config.backbone_path();
            write_bundle(&path, &net.to_bundle())?;
            info!(path = %path.display(), "backbone_written");
        }

        ctx.transplant = Some(report);
        ctx.backbone = Some(net);
        Ok(())
    }
}
