//! Typed failures raised by the core algorithms.
//!
//! Stages and the binary wrap these in `anyhow` with context; the core keeps
//! them typed so callers (and tests) can tell a configuration mistake from a
//! data-integrity failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("weight archive is missing layers: {}", .0.join(", "))]
    MissingLayers(Vec<String>),

    #[error("layer `{layer}` shape mismatch: expected {expected:?}, got {actual:?}")]
    LayerShape {
        layer: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("layer `{0}` was never initialized from the weight archive")]
    Uninitialized(String),

    #[error("video `{video}` has {frames} flow frames, fewer than the window of {window}")]
    ShortVideo {
        video: String,
        frames: usize,
        window: usize,
    },

    #[error("{what} length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("{what} shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("invalid label {value} at sample {index} (expected 0 or 1)")]
    InvalidLabel { index: usize, value: f64 },

    #[error("invalid video table: {0}")]
    Table(String),

    #[error("cannot fit a classifier on a single class (label {0})")]
    SingleClass(u8),
}

impl PipelineError {
    pub fn length(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::LengthMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type CoreResult<T> = std::result::Result<T, PipelineError>;
