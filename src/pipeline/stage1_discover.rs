use anyhow::{Context, Result, bail};
use tracing::info;

use crate::ctx::Ctx;
use crate::flow::{discover_videos, stack_count};
use crate::pipeline::Stage;

pub struct Stage1Discover;

impl Stage1Discover {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage1Discover {
    fn name(&self) -> &'static str {
        "stage1_discover"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let data_dir = ctx.config.data_dir.as_ref().context("--data is required")?;
        let videos = discover_videos(data_dir, &ctx.config.classes)?;
        if videos.is_empty() {
            bail!("no videos found under {}", data_dir.display());
        }

        let window = ctx.config.window;
        let stacks: usize = videos
            .iter()
            .map(|v| stack_count(v.frame_count(), window))
            .sum();
        for v in videos.iter().filter(|v| v.frame_count() < window) {
            ctx.warnings.push(format!(
                "{} has {} flow frames, fewer than the window of {}; it contributes no samples",
                v.dir.display(),
                v.frame_count(),
                window
            ));
        }
        info!(
            data_dir = %data_dir.display(),
            videos = videos.len(),
            stacks,
            "videos_discovered"
        );
        ctx.videos = videos;
        Ok(())
    }
}
