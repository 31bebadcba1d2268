//! Sliding-window optical-flow stacks.
//!
//! A video of `F` frame pairs yields `F - L + 1` overlapping stacks of depth
//! `L`. Stack `j` holds frame `j + s` at channels `2s` (horizontal flow) and
//! `2s + 1` (vertical flow). Frames arrive one at a time; each is scattered
//! into every stack that contains it, so only the current frame and the
//! per-video buffer are ever held.

use ndarray::{Array4, ArrayView2, ArrayView3, Axis, s};

use crate::error::{CoreResult, PipelineError};

pub mod frames;
pub mod mean;

pub use frames::{VideoSource, decode_frame, discover_videos};
pub use mean::FlowMean;

/// Number of stacks a video of `frame_count` frames yields.
pub fn stack_count(frame_count: usize, window: usize) -> usize {
    (frame_count + 1).saturating_sub(window)
}

/// All stacks of one video, `(stack, 2L, H, W)`. Dropped once the video's
/// embeddings are computed.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowStackBuffer {
    data: Array4<f64>,
}

impl FlowStackBuffer {
    pub fn len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stack(&self, index: usize) -> ArrayView3<'_, f64> {
        self.data.index_axis(Axis(0), index)
    }

    pub fn stacks(&self) -> impl Iterator<Item = ArrayView3<'_, f64>> {
        self.data.axis_iter(Axis(0))
    }

    pub fn as_array(&self) -> &Array4<f64> {
        &self.data
    }
}

/// Streaming scatter of one video's frames into its stack buffer.
#[derive(Debug)]
pub struct FlowStackBuilder {
    window: usize,
    frame_count: usize,
    height: usize,
    width: usize,
    next_frame: usize,
    data: Array4<f64>,
}

impl FlowStackBuilder {
    pub fn new(
        video: &str,
        frame_count: usize,
        window: usize,
        height: usize,
        width: usize,
    ) -> CoreResult<Self> {
        if window == 0 {
            return Err(PipelineError::config("window (L) must be at least 1"));
        }
        if frame_count < window {
            return Err(PipelineError::ShortVideo {
                video: video.to_string(),
                frames: frame_count,
                window,
            });
        }
        let stacks = stack_count(frame_count, window);
        Ok(Self {
            window,
            frame_count,
            height,
            width,
            next_frame: 0,
            data: Array4::zeros((stacks, 2 * window, height, width)),
        })
    }

    /// Writes frame `i` (the next one) into stack `i - s` at channels
    /// `2s`/`2s + 1`, for every offset `s` that lands on an existing stack.
    pub fn push<'a>(&mut self, flow_x: ArrayView2<'a, f64>, flow_y: ArrayView2<'a, f64>) -> CoreResult<()> {
        let expected = [self.height, self.width];
        for frame in [&flow_x, &flow_y] {
            if frame.shape() != &expected[..] {
                return Err(PipelineError::ShapeMismatch {
                    what: format!("flow frame {}", self.next_frame),
                    expected: expected.to_vec(),
                    actual: frame.shape().to_vec(),
                });
            }
        }
        if self.next_frame >= self.frame_count {
            return Err(PipelineError::length(
                "flow frames pushed",
                self.frame_count,
                self.next_frame + 1,
            ));
        }
        let i = self.next_frame;
        let stacks = self.data.len_of(Axis(0));
        for offset in 0..self.window.min(i + 1) {
            let j = i - offset;
            if j < stacks {
                self.data
                    .slice_mut(s![j, 2 * offset, .., ..])
                    .assign(&flow_x);
                self.data
                    .slice_mut(s![j, 2 * offset + 1, .., ..])
                    .assign(&flow_y);
            }
        }
        self.next_frame += 1;
        Ok(())
    }

    /// Subtracts the mean from every stack and hands the buffer over.
    pub fn finish(mut self, mean: ArrayView3<'_, f64>) -> CoreResult<FlowStackBuffer> {
        if self.next_frame != self.frame_count {
            return Err(PipelineError::length(
                "flow frames pushed",
                self.frame_count,
                self.next_frame,
            ));
        }
        let expected = [2 * self.window, self.height, self.width];
        if mean.shape() != &expected[..] {
            return Err(PipelineError::ShapeMismatch {
                what: "flow mean".to_string(),
                expected: expected.to_vec(),
                actual: mean.shape().to_vec(),
            });
        }
        for mut stack in self.data.axis_iter_mut(Axis(0)) {
            stack -= &mean;
        }
        Ok(FlowStackBuffer { data: self.data })
    }
}

/// Builds every stack of a video from in-memory frame pairs.
pub fn build<'a, I>(
    video: &str,
    frames: I,
    window: usize,
    mean: &FlowMean,
) -> CoreResult<FlowStackBuffer>
where
    I: ExactSizeIterator<Item = (ArrayView2<'a, f64>, ArrayView2<'a, f64>)>,
{
    let m = mean.view();
    let (_, h, w) = m.dim();
    let mut builder = FlowStackBuilder::new(video, frames.len(), window, h, w)?;
    for (x, y) in frames {
        builder.push(x, y)?;
    }
    builder.finish(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_count_saturates() {
        assert_eq!(stack_count(10, 10), 1);
        assert_eq!(stack_count(25, 10), 16);
        assert_eq!(stack_count(9, 10), 0);
        assert_eq!(stack_count(0, 1), 0);
    }

    #[test]
    fn short_video_is_an_error() {
        let err = FlowStackBuilder::new("v", 3, 4, 2, 2).unwrap_err();
        assert!(matches!(err, PipelineError::ShortVideo { frames: 3, window: 4, .. }));
    }
}
