//! Inference sessions
//!
//! `InferenceSession` is the tensor-in/scores-out seam the pool dispatches to.
//! `OrtSession` is the production implementation on ONNX Runtime with the
//! TensorRT execution provider.

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{ArrayViewD, Axis};
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::ValueType;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{InferenceError, Tensor};

/// Engine precision mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionMode {
    /// FP16 kernels enabled
    #[default]
    Half,
    /// FP32 only
    Full,
}

/// Provider options fixed once at pool construction
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// GPU device index
    pub device_id: i32,
    pub precision: PrecisionMode,
    /// Directory for TensorRT engine and timing caches
    pub engine_cache_dir: PathBuf,
    pub timing_cache: bool,
    /// TensorRT builder workspace (bytes)
    pub max_workspace_size: usize,
    /// TensorRT builder optimization level (0-5)
    pub builder_optimization_level: u8,
    /// Name of the model input
    pub input_name: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            device_id: 0,
            precision: PrecisionMode::Half,
            engine_cache_dir: PathBuf::from("/workspace/tensorrt"),
            timing_cache: true,
            max_workspace_size: 7_000_000_000,
            builder_optimization_level: 5,
            input_name: "input".to_string(),
        }
    }
}

/// A loaded, non-reentrant inference engine
pub trait InferenceSession: Send {
    /// Run one inference and return the first batch row of the first output
    fn run(&mut self, input: &Tensor) -> Result<Vec<f32>, InferenceError>;
}

/// ONNX Runtime session with TensorRT and CUDA providers
pub struct OrtSession {
    session: Session,
    input_name: String,
    /// Declared input dimensions; negative entries are dynamic
    input_dims: Option<Vec<i64>>,
    model_path: PathBuf,
}

impl OrtSession {
    /// Build a session for the model at `path`. Engine compilation happens here.
    pub fn load(path: &Path, options: &SessionOptions) -> Result<Self, InferenceError> {
        info!(
            "Loading scene change model from {} (device={}, precision={:?})",
            path.display(),
            options.device_id,
            options.precision
        );
        let start = Instant::now();

        let tensorrt = TensorRTExecutionProvider::default()
            .with_device_id(options.device_id)
            .with_fp16(options.precision == PrecisionMode::Half)
            .with_engine_cache(true)
            .with_engine_cache_path(options.engine_cache_dir.to_string_lossy().to_string())
            .with_timing_cache(options.timing_cache)
            .with_max_workspace_size(options.max_workspace_size)
            .with_builder_optimization_level(options.builder_optimization_level);

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| {
                b.with_execution_providers([
                    tensorrt.build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(options.device_id)
                        .build(),
                ])
            })
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| {
                error!("Failed to load model {}: {}", path.display(), e);
                InferenceError::ModelLoad(format!("{}: {}", path.display(), e))
            })?;

        let input_dims = session
            .inputs
            .iter()
            .find(|i| i.name == options.input_name)
            .and_then(|i| match &i.input_type {
                ValueType::Tensor { dimensions, .. } => Some(dimensions.clone()),
                _ => None,
            });

        info!("Model {} loaded in {:?}", path.display(), start.elapsed());

        Ok(Self {
            session,
            input_name: options.input_name.clone(),
            input_dims,
            model_path: path.to_path_buf(),
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn check_shape(&self, shape: &[usize]) -> Result<(), InferenceError> {
        let Some(dims) = &self.input_dims else {
            return Ok(());
        };
        let matches = dims.len() == shape.len()
            && dims
                .iter()
                .zip(shape)
                .all(|(&d, &s)| d < 0 || d as usize == s);
        if matches {
            Ok(())
        } else {
            Err(InferenceError::InvalidInputShape {
                expected: format!("{:?}", dims),
                actual: format!("{:?}", shape),
            })
        }
    }
}

/// First batch row of an output, flattened
fn first_row<T: Copy>(view: ArrayViewD<'_, T>, widen: impl Fn(T) -> f32) -> Vec<f32> {
    let row = if view.ndim() > 1 {
        view.index_axis_move(Axis(0), 0)
    } else {
        view
    };
    row.iter().map(|&v| widen(v)).collect()
}

impl InferenceSession for OrtSession {
    fn run(&mut self, input: &Tensor) -> Result<Vec<f32>, InferenceError> {
        self.check_shape(input.shape())?;
        let name = self.input_name.as_str();

        let inputs = match input {
            Tensor::Half(a) => ort::inputs![name => a.clone()],
            Tensor::Single(a) => ort::inputs![name => a.clone()],
        }
        .map_err(|e| InferenceError::InferenceFailed(format!("input conversion: {}", e)))?;

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let output = &outputs[0];
        let scores = match output.try_extract_tensor::<f32>() {
            Ok(view) => first_row(view, |v| v),
            Err(_) => {
                let view = output
                    .try_extract_tensor::<half::f16>()
                    .map_err(|e| InferenceError::InferenceFailed(format!("output extraction: {}", e)))?;
                first_row(view, |v| v.to_f32())
            }
        };

        debug!(scores = ?scores, "Inference completed");
        Ok(scores)
    }
}
