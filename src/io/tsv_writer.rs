use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::scores::VideoScoreReport;

/// One row per scored video.
pub fn write_tsv(path: &Path, report: &VideoScoreReport) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut w = BufWriter::new(file);

    writeln!(
        w,
        "class\tvideo\tsamples\tscored\tstatus\tmisses\tfalse_positives\tfalse_negatives"
    )?;
    for v in &report.videos {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            v.class_name,
            v.video,
            v.samples,
            v.scored,
            if v.is_hit() { "hit" } else { "miss" },
            v.misses,
            v.false_positives,
            v.false_negatives
        )?;
    }
    w.flush()?;
    Ok(())
}
