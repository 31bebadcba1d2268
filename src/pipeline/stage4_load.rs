use anyhow::Result;

use crate::ctx::Ctx;
use crate::pipeline::Stage;
use crate::store::StreamStore;

pub struct Stage4Load;

impl Stage4Load {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage4Load {
    fn name(&self) -> &'static str {
        "stage4_load"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let mut stores = Vec::with_capacity(ctx.config.streams.len());
        for &stream in &ctx.config.streams {
            stores.push(StreamStore::load(&ctx.config, stream)?);
        }

        let reference = ctx.config.reference_stream();
        let ref_videos = stores
            .iter()
            .find(|s| s.stream == reference)
            .map(|s| s.table.class_video_counts());
        for store in &stores {
            let videos = store.table.class_video_counts();
            if Some(&videos) != ref_videos.as_ref() {
                ctx.warnings.push(format!(
                    "{} store has per-class video counts {:?}, {} has {:?}",
                    store.stream.name(),
                    videos,
                    reference.name(),
                    ref_videos.clone().unwrap_or_default()
                ));
            }
        }
        ctx.stores = stores;
        Ok(())
    }
}
