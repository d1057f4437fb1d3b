//! Scene Change Detection
//!
//! Annotates every frame of a stream with a "scene change starts at the next
//! frame" flag:
//! - Temporal windows (pairs or quintuples) with blank padding at the edges
//! - Tensor marshalling for both model topologies
//! - Pooled inference dispatch with exclusive session checkout
//! - Similarity short-circuit for near-duplicate frames

pub mod cache;
pub mod clip;
pub mod config;
pub mod evaluator;
pub mod logging;
pub mod marshal;
pub mod shortcut;
pub mod window;

pub use cache::ResampledClip;
pub use clip::SceneChangeClip;
pub use config::SceneDetectConfig;
pub use evaluator::{extract_score, SceneChangeEvaluator, DEFAULT_THRESHOLD};
pub use logging::init_logging;
pub use marshal::{MarshalError, TensorMarshaller};
pub use shortcut::{PropSimilarity, SimilarityShortCut, SimilaritySource};
pub use window::{FrameWindow, FrameWindowBuilder};

pub use inference_engine::{ConfigError, InferenceError};
pub use video_frame::FrameError;

use thiserror::Error;

/// Scene detection error types
#[derive(Error, Debug)]
pub enum SceneDetectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error("Failed to load settings: {0}")]
    Settings(#[from] ::config::ConfigError),

    #[error("Evaluation worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use inference_engine::{InferenceError, InferenceSession, ModelRegistry, ModelSpec, SessionPool, Tensor};
    use video_frame::{PixelFormat, PlaneData, PropValue, VecSource, VideoFrame};

    pub const INDEX_PROP: &str = "test_index";

    /// Registry spec with a small resolution to keep tests fast
    pub fn small_spec(id: i64) -> ModelSpec {
        ModelSpec {
            resolution: (4, 4),
            ..ModelRegistry::resolve(id).unwrap()
        }
    }

    /// RgbS frame with every sample set to `value`
    pub fn constant_frame(value: f32) -> VideoFrame {
        VideoFrame::new(PixelFormat::RgbS, 8, 6, vec![PlaneData::F32(vec![value; 48]); 3]).unwrap()
    }

    /// Source whose frame i is constant `values[i]` and carries its index as a property
    pub fn constant_source(values: &[f32]) -> Arc<VecSource> {
        let frames = values
            .iter()
            .enumerate()
            .map(|(i, &v)| constant_frame(v).with_prop(INDEX_PROP, PropValue::Int(i as i64)))
            .collect::<Vec<_>>();
        Arc::new(VecSource::new(frames))
    }

    type ScoreFn = dyn Fn(&Tensor) -> Result<Vec<f32>, InferenceError> + Send + Sync;

    /// Deterministic stub engine with a call counter
    pub struct ScriptedSession {
        calls: Arc<AtomicUsize>,
        score: Arc<ScoreFn>,
    }

    impl InferenceSession for ScriptedSession {
        fn run(&mut self, input: &Tensor) -> Result<Vec<f32>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.score)(input)
        }
    }

    pub fn scripted_pool<F>(spec: ModelSpec, size: usize, score: F) -> (SessionPool<ScriptedSession>, Arc<AtomicUsize>)
    where
        F: Fn(&Tensor) -> Result<Vec<f32>, InferenceError> + Send + Sync + 'static,
    {
        let calls = Arc::new(AtomicUsize::new(0));
        let score: Arc<ScoreFn> = Arc::new(score);
        let pool = SessionPool::construct(spec, size, |_| {
            Ok(ScriptedSession {
                calls: calls.clone(),
                score: score.clone(),
            })
        })
        .unwrap();
        (pool, calls)
    }
}
