//! Scene Change Inference Engine
//!
//! Provides model selection and pooled ONNX Runtime inference for scene
//! change scoring:
//! - Closed registry of scene change models
//! - Half/single precision input tensors
//! - TensorRT-backed sessions with exclusive checkout from a fixed pool
//! - Local weight resolution

mod model;
mod pool;
mod session;
mod tensor;
mod weights;

pub use model::{ModelId, ModelRegistry, ModelSpec, Topology, DEFAULT_MODEL_DIR};
pub use pool::{PoolStats, SessionGuard, SessionPool};
pub use session::{InferenceSession, OrtSession, PrecisionMode, SessionOptions};
pub use tensor::Tensor;
pub use weights::{ensure_weights, LocalWeights, WeightFetcher};

use std::path::PathBuf;

use thiserror::Error;

/// Errors in static configuration, raised before any frame is processed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Unknown model id {0} (valid ids are 0..=6)")]
    UnknownModel(i64),
    #[error("Pool size must be at least 1, got {0}")]
    InvalidPoolSize(usize),
    #[error("Invalid {name}: {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
}

/// Errors during model setup and inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model weights unavailable at {path}: {reason}")]
    WeightUnavailable { path: PathBuf, reason: String },
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Session pool requires at least one session")]
    EmptyPool,
    #[error("No session became available within {0}ms")]
    PoolTimeout(u64),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Model output has {len} values, no score at index {index}")]
    MissingOutput { index: usize, len: usize },
}
