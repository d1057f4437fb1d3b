//! Indexable frame sources

use std::sync::Arc;

use crate::{FrameError, VideoFrame};

/// Random-access, ordered frame stream
pub trait FrameSource: Send + Sync {
    /// Number of frames in the stream
    fn len(&self) -> usize;

    /// Frame at `index`
    fn frame(&self, index: usize) -> Result<Arc<VideoFrame>, FrameError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory frame source
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    frames: Vec<Arc<VideoFrame>>,
}

impl VecSource {
    pub fn new(frames: Vec<VideoFrame>) -> Self {
        Self {
            frames: frames.into_iter().map(Arc::new).collect(),
        }
    }
}

impl From<Vec<VideoFrame>> for VecSource {
    fn from(frames: Vec<VideoFrame>) -> Self {
        Self::new(frames)
    }
}

impl FrameSource for VecSource {
    fn len(&self) -> usize {
        self.frames.len()
    }

    fn frame(&self, index: usize) -> Result<Arc<VideoFrame>, FrameError> {
        self.frames
            .get(index)
            .cloned()
            .ok_or(FrameError::IndexOutOfRange {
                index,
                len: self.frames.len(),
            })
    }
}
