//! Scene detection configuration

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use inference_engine::{
    ConfigError, ModelRegistry, ModelSpec, PrecisionMode, SessionOptions, DEFAULT_MODEL_DIR,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::evaluator::DEFAULT_THRESHOLD;
use crate::shortcut::{SimilarityShortCut, DEFAULT_SIMILARITY_THRESHOLD};
use crate::SceneDetectError;

/// Prefix of environment variables overlaid on the file settings
pub const ENV_PREFIX: &str = "SCENE_DETECT";

/// Scene detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDetectConfig {
    /// Model variant (0..=6)
    pub model_id: i64,

    /// Scores strictly above this mark a scene change
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default)]
    pub precision_mode: PrecisionMode,

    /// Number of engine instances
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Bypass the model for frames whose similarity score is above `similarity_threshold`
    #[serde(default)]
    pub similarity_shortcut: bool,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_engine_cache_dir")]
    pub engine_cache_dir: PathBuf,

    /// GPU device index
    #[serde(default)]
    pub device_id: i32,
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_pool_size() -> usize {
    1
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_model_dir() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_DIR)
}

fn default_engine_cache_dir() -> PathBuf {
    SessionOptions::default().engine_cache_dir
}

impl SceneDetectConfig {
    /// Defaults for everything but the model
    pub fn new(model_id: i64) -> Self {
        Self {
            model_id,
            threshold: default_threshold(),
            precision_mode: PrecisionMode::default(),
            pool_size: default_pool_size(),
            similarity_shortcut: false,
            similarity_threshold: default_similarity_threshold(),
            model_dir: default_model_dir(),
            engine_cache_dir: default_engine_cache_dir(),
            device_id: 0,
        }
    }

    /// Load from an optional file (TOML, YAML or JSON by extension), then
    /// overlay `SCENE_DETECT_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, SceneDetectError> {
        Self::load_with_env(path, None)
    }

    /// As `load`, reading the overlay from `env` instead of the process environment
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, SceneDetectError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading scene detection settings from {}", path.display());
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Check static settings and resolve the model
    pub fn validate(&self) -> Result<ModelSpec, ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize(self.pool_size));
        }
        if !self.threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold {
                name: "threshold",
                value: f64::from(self.threshold),
            });
        }
        if !self.similarity_threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold {
                name: "similarity_threshold",
                value: self.similarity_threshold,
            });
        }
        ModelRegistry::resolve(self.model_id)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            device_id: self.device_id,
            precision: self.precision_mode,
            engine_cache_dir: self.engine_cache_dir.clone(),
            ..SessionOptions::default()
        }
    }

    pub fn shortcut(&self) -> Option<SimilarityShortCut> {
        self.similarity_shortcut
            .then(|| SimilarityShortCut::new(self.similarity_threshold))
    }
}
