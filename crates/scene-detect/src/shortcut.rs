//! Similarity short-circuit
//!
//! Near-identical neighbours cannot be a scene cut, so when an external
//! similarity score is available and high enough the model call is skipped.

use std::sync::Arc;

use video_frame::{FrameError, FrameSource};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.98;

/// Frame property holding a structural similarity score
pub const SIMILARITY_PROP: &str = "float_ssim";

/// Skip rule: evaluation is bypassed only when similarity is strictly above the threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityShortCut {
    pub threshold: f64,
}

impl Default for SimilarityShortCut {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl SimilarityShortCut {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn should_skip(&self, similarity: Option<f64>) -> bool {
        matches!(similarity, Some(s) if s > self.threshold)
    }
}

/// Per-frame similarity between frame `t` and its neighbour
pub trait SimilaritySource: Send + Sync {
    fn similarity(&self, index: usize) -> Result<Option<f64>, FrameError>;
}

/// Reads the similarity from a float property on each frame of a source
pub struct PropSimilarity {
    source: Arc<dyn FrameSource>,
    key: String,
}

impl PropSimilarity {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self::with_key(source, SIMILARITY_PROP)
    }

    pub fn with_key(source: Arc<dyn FrameSource>, key: impl Into<String>) -> Self {
        Self {
            source,
            key: key.into(),
        }
    }
}

impl SimilaritySource for PropSimilarity {
    fn similarity(&self, index: usize) -> Result<Option<f64>, FrameError> {
        Ok(self.source.frame(index)?.props().get_float(&self.key))
    }
}

impl SimilaritySource for Vec<Option<f64>> {
    fn similarity(&self, index: usize) -> Result<Option<f64>, FrameError> {
        Ok(self.get(index).copied().flatten())
    }
}
