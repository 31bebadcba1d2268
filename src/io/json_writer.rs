use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Task;
use crate::ctx::Ctx;
use crate::schema::v1::{
    FallstreamV1, RunInfo, SCHEMA_VERSION, SplitSummary, StoreSummary, ToolInfo,
    TransplantSummary,
};

pub fn build_report(ctx: &Ctx) -> Result<FallstreamV1> {
    let config = &ctx.config;
    let run = RunInfo {
        task: config.task,
        streams: config.streams.clone(),
        classes: config.classes.clone(),
        feature_id: config.feature_id.clone(),
        classifier_id: config.classifier_id.clone(),
        window: config.window,
        threshold: config.threshold,
        seed: config.seed,
        test_fraction: matches!(config.task, Task::Train).then_some(config.test_fraction),
        nsplits: matches!(config.task, Task::CrossTrain).then_some(config.nsplits),
        balance: config.balance,
    };

    let transplant = ctx.transplant.map(|t| TransplantSummary {
        conv_layers: t.conv_layers,
        dense_layers: t.dense_layers,
        backbone_path: matches!(config.task, Task::Transplant)
            .then(|| config.backbone_path().display().to_string()),
    });

    let stores = ctx
        .stores
        .iter()
        .map(|s| StoreSummary {
            stream: s.stream,
            samples: s.n_samples(),
            features: s.features.ncols(),
            videos: s.table.n_videos(),
            class_videos: s.table.class_video_counts(),
        })
        .collect();

    let splits = ctx
        .splits
        .iter()
        .map(|(stream, split)| SplitSummary {
            stream: *stream,
            train_videos: split.train_videos.len(),
            test_videos: split.test_videos.len(),
        })
        .collect();

    Ok(FallstreamV1 {
        tool: ToolInfo {
            name: "fallstream".to_string(),
            version: ctx.tool_version.clone(),
            schema: SCHEMA_VERSION.to_string(),
        },
        run,
        transplant,
        stores,
        splits,
        streams: ctx.stream_scores.clone(),
        fusion: ctx.fusion_scores.clone(),
        cross_validation: ctx.cv_scores.clone(),
        videos: ctx.video_report.clone(),
        warnings: ctx.warnings.clone(),
    })
}

pub fn write_json(path: &Path, report: &FallstreamV1) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
