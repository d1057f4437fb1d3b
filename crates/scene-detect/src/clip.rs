//! Annotated clip
//!
//! Binds a frame source to an evaluator. Frames are evaluated independently,
//! so any subset may be requested in any order or in parallel.

use std::sync::Arc;

use inference_engine::InferenceSession;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use video_frame::{FrameSource, Resampler, VideoFrame};

use crate::evaluator::SceneChangeEvaluator;
use crate::shortcut::SimilaritySource;
use crate::window::FrameWindowBuilder;
use crate::SceneDetectError;

/// A frame source whose frames come out annotated with `_SceneChangeNext`
pub struct SceneChangeClip<S> {
    windows: FrameWindowBuilder,
    evaluator: SceneChangeEvaluator<S>,
    similarity: Option<Arc<dyn SimilaritySource>>,
}

impl<S> SceneChangeClip<S> {
    pub fn new(
        source: Arc<dyn FrameSource>,
        evaluator: SceneChangeEvaluator<S>,
        resampler: Arc<dyn Resampler>,
    ) -> Self {
        let windows = FrameWindowBuilder::new(source, evaluator.spec(), resampler);
        Self {
            windows,
            evaluator,
            similarity: None,
        }
    }

    /// Similarity scores consulted by the evaluator's shortcut
    pub fn with_similarity(mut self, similarity: Arc<dyn SimilaritySource>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn windows(&self) -> &FrameWindowBuilder {
        &self.windows
    }

    pub fn evaluator(&self) -> &SceneChangeEvaluator<S> {
        &self.evaluator
    }
}

impl<S: InferenceSession> SceneChangeClip<S> {
    /// Annotated frame `t`
    pub fn frame(&self, t: usize) -> Result<VideoFrame, SceneDetectError> {
        let window = self.windows.window(t)?;
        let similarity = match (&self.similarity, self.evaluator.shortcut()) {
            (Some(source), Some(_)) => source.similarity(t)?,
            _ => None,
        };
        self.evaluator.evaluate(&window, similarity)
    }

    /// Every frame in order on the calling thread
    pub fn annotate_all(&self) -> Result<Vec<VideoFrame>, SceneDetectError> {
        (0..self.len()).map(|t| self.frame(t)).collect()
    }
}

impl<S: InferenceSession + 'static> SceneChangeClip<S> {
    /// Every frame, with up to `concurrency` evaluations in flight on the
    /// blocking thread pool. Output order matches frame order.
    pub async fn annotate_parallel(
        self: Arc<Self>,
        concurrency: usize,
    ) -> Result<Vec<VideoFrame>, SceneDetectError> {
        let concurrency = concurrency.max(1);
        info!(
            "Annotating {} frames with {} concurrent evaluations ({} sessions)",
            self.len(),
            concurrency,
            self.evaluator.pool().size()
        );

        let permits = Arc::new(Semaphore::new(concurrency));
        let mut handles = Vec::with_capacity(self.len());
        for t in 0..self.len() {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SceneDetectError::Worker(e.to_string()))?;
            let clip = self.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                clip.frame(t)
            }));
        }

        let mut frames = Vec::with_capacity(handles.len());
        for handle in handles {
            let frame = handle
                .await
                .map_err(|e| SceneDetectError::Worker(e.to_string()))??;
            frames.push(frame);
        }

        let stats = self.evaluator.pool().stats();
        debug!(
            checkouts = stats.checkouts,
            contended = stats.contended,
            resamples = self.windows.resample_count(),
            "Clip annotated"
        );
        Ok(frames)
    }
}
