//! Temporal frame windows
//!
//! A window is the group of resampled frames one evaluation consumes: the
//! current and next frame for pair models, two frames either side of the
//! current one for quintuple models. Positions past either end of the
//! stream are filled with one shared blank frame.

use std::sync::Arc;

use inference_engine::{ModelSpec, Topology};
use video_frame::{FrameError, FrameSource, Resampler, VideoFrame};

use crate::cache::{ResampledClip, DEFAULT_CACHE_FRAMES};

/// Frames for one evaluation at index `t`
#[derive(Debug, Clone)]
pub struct FrameWindow {
    pub index: usize,
    pub topology: Topology,
    /// Unresampled source frame that receives the annotation
    pub original: Arc<VideoFrame>,
    /// Resampled frames in temporal order
    pub frames: Vec<Arc<VideoFrame>>,
    /// Which positions were filled with the blank frame
    pub padded: Vec<bool>,
}

impl FrameWindow {
    /// Resampled frame at the current index
    pub fn center(&self) -> &Arc<VideoFrame> {
        &self.frames[self.topology.center()]
    }
}

/// Builds windows over a resampled view of a frame source
pub struct FrameWindowBuilder {
    source: Arc<dyn FrameSource>,
    clip: ResampledClip,
    topology: Topology,
    blank: Arc<VideoFrame>,
}

impl FrameWindowBuilder {
    pub fn new(source: Arc<dyn FrameSource>, spec: &ModelSpec, resampler: Arc<dyn Resampler>) -> Self {
        Self::with_cache_capacity(source, spec, resampler, DEFAULT_CACHE_FRAMES)
    }

    /// Builder with a custom resample cache size (never below the window arity)
    pub fn with_cache_capacity(
        source: Arc<dyn FrameSource>,
        spec: &ModelSpec,
        resampler: Arc<dyn Resampler>,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(spec.topology.arity());
        let clip = ResampledClip::new(
            source.clone(),
            resampler,
            spec.resolution,
            spec.input_format(),
            capacity,
        );
        let blank = Arc::new(clip.blank());

        Self {
            source,
            clip,
            topology: spec.topology,
            blank,
        }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// The padding frame shared by every window
    pub fn blank(&self) -> &Arc<VideoFrame> {
        &self.blank
    }

    /// Resample operations performed so far
    pub fn resample_count(&self) -> usize {
        self.clip.resample_count()
    }

    /// Window for frame `t`
    pub fn window(&self, t: usize) -> Result<FrameWindow, FrameError> {
        let len = self.source.len();
        if t >= len {
            return Err(FrameError::IndexOutOfRange { index: t, len });
        }

        let original = self.source.frame(t)?;
        let center = self.topology.center() as isize;
        let arity = self.topology.arity() as isize;

        let mut frames = Vec::with_capacity(arity as usize);
        let mut padded = Vec::with_capacity(arity as usize);
        for offset in -center..arity - center {
            let i = t as isize + offset;
            if i < 0 || i >= len as isize {
                frames.push(self.blank.clone());
                padded.push(true);
            } else {
                frames.push(self.clip.frame(i as usize)?);
                padded.push(false);
            }
        }

        Ok(FrameWindow {
            index: t,
            topology: self.topology,
            original,
            frames,
            padded,
        })
    }
}
