use anyhow::Result;
use tracing::info;

use crate::ctx::Ctx;
use crate::io::{json_writer, tsv_writer};
use crate::pipeline::Stage;

pub struct Stage10Output;

impl Stage10Output {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage10Output {
    fn name(&self) -> &'static str {
        "stage10_output"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let report = json_writer::build_report(ctx)?;
        json_writer::write_json(&ctx.output.json_path, &report)?;
        if let Some(videos) = &ctx.video_report {
            tsv_writer::write_tsv(&ctx.output.tsv_path, videos)?;
        }
        ctx.report = Some(report);

        info!(
            json = %ctx.output.json_path.display(),
            "stage10_output_ready"
        );
        Ok(())
    }
}
