use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use ndarray::{Array1, Array2};
use tracing::{info, warn};

use crate::config::StreamKind;
use crate::flow::{FlowMean, FlowStackBuilder, VideoSource, decode_frame};
use crate::net::Backbone;
use crate::store::StreamStore;
use crate::table::{VideoRecord, VideoTable};

/// Embeds every stack of one video. Frames are decoded and scattered one
/// pair at a time; the stack buffer lives only for this call.
pub fn embed_video<B: Backbone + ?Sized>(
    backbone: &B,
    source: &VideoSource,
    window: usize,
    mean: &FlowMean,
) -> Result<Array2<f64>> {
    let [_, height, width] = backbone.input_shape();
    let name = source.name();
    let mut builder = FlowStackBuilder::new(&name, source.frame_count(), window, height, width)?;
    for (x_path, y_path) in source.frame_pairs() {
        let fx = decode_frame(x_path, height, width)?;
        let fy = decode_frame(y_path, height, width)?;
        builder.push(fx.view(), fy.view())?;
    }
    let buffer = builder.finish(mean.view())?;

    let d = backbone.num_features();
    let mut out = Array2::zeros((buffer.len(), d));
    for (i, stack) in buffer.stacks().enumerate() {
        let embedding = backbone
            .embed(stack)
            .with_context(|| format!("video {} stack {}", name, i))?;
        out.row_mut(i).assign(&embedding);
    }
    Ok(out)
}

/// Runs every video through the backbone. Videos shorter than the window
/// are skipped with a warning and recorded with zero samples.
pub fn extract_features<B: Backbone + ?Sized>(
    backbone: &B,
    videos: &[VideoSource],
    n_classes: usize,
    window: usize,
    mean: &FlowMean,
) -> Result<StreamStore> {
    let d = backbone.num_features();
    let mut flat: Vec<f64> = Vec::new();
    let mut labels: Vec<f64> = Vec::new();
    let mut records = Vec::with_capacity(videos.len());

    for source in videos {
        let frames = source.frame_count();
        if frames < window {
            warn!(
                video = %source.dir.display(),
                frames,
                window,
                "video_shorter_than_window"
            );
            records.push(VideoRecord {
                class_id: source.class_id,
                video_id: source.video_id,
                stack_count: 0,
            });
            continue;
        }
        let started = Instant::now();
        let embeddings = embed_video(backbone, source, window, mean)
            .with_context(|| format!("failed to extract {}", source.dir.display()))?;
        let stacks = embeddings.nrows();
        flat.extend(embeddings.iter().copied());
        labels.extend(std::iter::repeat(source.class_id as f64).take(stacks));
        records.push(VideoRecord {
            class_id: source.class_id,
            video_id: source.video_id,
            stack_count: stacks,
        });
        info!(
            video = %source.dir.display(),
            class = source.class_id,
            stacks,
            elapsed_ms = started.elapsed().as_millis(),
            "video_extracted"
        );
    }

    let n = labels.len();
    let features = Array2::from_shape_vec((n, d), flat)
        .map_err(|e| anyhow!("feature matrix shape ({}, {}): {}", n, d, e))?;
    let table = VideoTable::from_records(records, n_classes)?;
    let store = StreamStore::new(StreamKind::Temporal, features, Array1::from(labels), table)?;
    Ok(store)
}
