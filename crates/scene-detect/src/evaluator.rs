//! Scene Change Evaluator
//!
//! Turns one frame window into an annotated copy of its original frame:
//! optional similarity bypass, tensor marshalling, one pooled inference and
//! a strict threshold on the topology's output score.

use inference_engine::{
    ensure_weights, InferenceError, InferenceSession, ModelSpec, OrtSession, SessionPool,
    Topology, WeightFetcher,
};
use tracing::{debug, info};
use video_frame::VideoFrame;

use crate::config::SceneDetectConfig;
use crate::marshal::{MarshalError, TensorMarshaller};
use crate::shortcut::SimilarityShortCut;
use crate::window::FrameWindow;
use crate::SceneDetectError;

/// Default decision threshold
pub const DEFAULT_THRESHOLD: f32 = 0.98;

/// Score for the scene change class in a model's output row
pub fn extract_score(scores: &[f32], topology: Topology) -> Result<f32, InferenceError> {
    let index = topology.output_index();
    scores
        .get(index)
        .copied()
        .ok_or(InferenceError::MissingOutput {
            index,
            len: scores.len(),
        })
}

/// Scores windows against a pool of sessions for one model
pub struct SceneChangeEvaluator<S> {
    pool: SessionPool<S>,
    threshold: f32,
    shortcut: Option<SimilarityShortCut>,
}

impl<S> SceneChangeEvaluator<S> {
    pub fn new(pool: SessionPool<S>, threshold: f32) -> Self {
        Self {
            pool,
            threshold,
            shortcut: None,
        }
    }

    pub fn with_shortcut(mut self, shortcut: SimilarityShortCut) -> Self {
        self.shortcut = Some(shortcut);
        self
    }

    pub fn spec(&self) -> &ModelSpec {
        self.pool.spec()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn shortcut(&self) -> Option<SimilarityShortCut> {
        self.shortcut
    }

    pub fn pool(&self) -> &SessionPool<S> {
        &self.pool
    }
}

impl<S: InferenceSession> SceneChangeEvaluator<S> {
    /// Annotated copy of `window.original`. `similarity` is only consulted
    /// when a shortcut is configured.
    pub fn evaluate(
        &self,
        window: &FrameWindow,
        similarity: Option<f64>,
    ) -> Result<VideoFrame, SceneDetectError> {
        if let Some(shortcut) = &self.shortcut {
            if shortcut.should_skip(similarity) {
                debug!(index = window.index, similarity, "Similar frames, skipping model");
                return Ok(window.original.annotated(false));
            }
        }

        let topology = self.pool.spec().topology;
        if window.topology != topology {
            return Err(MarshalError::MismatchedWindow(format!(
                "{} window for a {} model",
                window.topology.as_str(),
                topology.as_str()
            ))
            .into());
        }

        let tensor = TensorMarshaller::marshal(window)?;

        let scores = {
            let mut guard = self.pool.checkout();
            self.pool.run(&mut guard, &tensor)?
        };

        let score = extract_score(&scores, topology)?;
        let scene_change = score > self.threshold;
        debug!(index = window.index, score, scene_change, "Evaluated frame");

        Ok(window.original.annotated(scene_change))
    }
}

impl SceneChangeEvaluator<OrtSession> {
    /// Resolve the model, make its weights local and build the ONNX Runtime pool
    pub fn from_config(
        config: &SceneDetectConfig,
        fetcher: &dyn WeightFetcher,
    ) -> Result<Self, SceneDetectError> {
        let spec = config.validate()?;
        let weights = ensure_weights(fetcher, &spec.weight_path(&config.model_dir))?;
        let options = config.session_options();

        info!(
            "Building scene change evaluator: model={:?}, topology={}, threshold={}",
            spec.id,
            spec.topology.as_str(),
            config.threshold
        );
        let pool = SessionPool::construct(spec, config.pool_size, |_| {
            OrtSession::load(&weights, &options)
        })?;

        let evaluator = Self::new(pool, config.threshold);
        Ok(match config.shortcut() {
            Some(shortcut) => evaluator.with_shortcut(shortcut),
            None => evaluator,
        })
    }
}
