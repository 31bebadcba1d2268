use anyhow::Result;

use crate::ctx::Ctx;
use crate::scores::{Evaluation, MetricSummary, ScoredPredictions};

pub fn format_summary(ctx: &Ctx) -> Result<String> {
    let config = &ctx.config;
    let streams: Vec<&str> = config.streams.iter().map(|s| s.name()).collect();

    let mut out = String::new();
    out.push_str(&format!("fallstream v{}\n", ctx.tool_version));
    out.push_str(&format!(
        "Task: {:?}, streams: {}, window: {}\n",
        config.task,
        streams.join(", "),
        config.window
    ));

    if let Some(t) = &ctx.transplant {
        out.push_str(&format!(
            "Transplanted: {} conv, {} dense layers\n",
            t.conv_layers, t.dense_layers
        ));
    }
    for store in &ctx.stores {
        out.push_str(&format!(
            "Store {}: {} samples x {} features, {} videos\n",
            store.stream.name(),
            store.n_samples(),
            store.features.ncols(),
            store.table.n_videos()
        ));
    }
    for scored in ctx.stream_scores.iter().chain(&ctx.fusion_scores) {
        out.push_str(&format_scored(scored));
    }
    for cv in &ctx.cv_scores {
        out.push_str(&format!(
            "{} ({} folds): sensitivity {}, specificity {}, FAR {}, MDR {}, accuracy {}\n",
            cv.stream,
            cv.folds.len(),
            mean_std(&cv.summary.sensitivity),
            mean_std(&cv.summary.specificity),
            mean_std(&cv.summary.far),
            mean_std(&cv.summary.mdr),
            mean_std(&cv.summary.accuracy)
        ));
    }
    if let Some(videos) = &ctx.video_report {
        out.push_str(&videos.render());
        out.push_str(&format!(
            "Videos: {} hit, {} miss\n",
            videos.hits(),
            videos.misses()
        ));
    }
    Ok(out)
}

fn format_scored(scored: &ScoredPredictions) -> String {
    let cm = scored.evaluation.confusion();
    match &scored.evaluation {
        Evaluation::Complete(m) => format!(
            "{}: TP {} FN {} FP {} TN {}, sensitivity {:.4}, specificity {:.4}, FAR {:.4}, MDR {:.4}, F1 {:.4}, accuracy {:.4}\n",
            scored.name,
            cm.tp,
            cm.fn_,
            cm.fp,
            cm.tn,
            m.sensitivity(),
            m.specificity,
            m.far(),
            m.mdr(),
            m.f1,
            m.accuracy
        ),
        Evaluation::Degenerate { accuracy, .. } => format!(
            "{}: TP {} FN {} FP {} TN {}, degenerate, accuracy {:.4}\n",
            scored.name, cm.tp, cm.fn_, cm.fp, cm.tn, accuracy
        ),
    }
}

fn mean_std(m: &MetricSummary) -> String {
    if m.folds == 0 {
        "n/a".to_string()
    } else {
        format!("{:.4} ± {:.4}", m.mean, m.std)
    }
}
