//! Scene change model registry

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use video_frame::PixelFormat;

use crate::ConfigError;

/// Default directory holding model weights
pub const DEFAULT_MODEL_DIR: &str = "/workspace/tensorrt/models";

/// Frame arrangement a model consumes per inference call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    /// Current and next frame, channel-stacked
    Pair,
    /// Frames t-2..=t+2, temporally stacked
    Quint,
}

impl Topology {
    /// Number of resampled frames per window
    pub fn arity(&self) -> usize {
        match self {
            Topology::Pair => 2,
            Topology::Quint => 5,
        }
    }

    /// Index of the scene change score in the model output
    pub fn output_index(&self) -> usize {
        match self {
            Topology::Pair => 0,
            Topology::Quint => 2,
        }
    }

    /// Position of frame t inside a window
    pub fn center(&self) -> usize {
        match self {
            Topology::Pair => 0,
            Topology::Quint => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Pair => "pair",
            Topology::Quint => "quint",
        }
    }
}

/// Known scene change models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    EfficientFormerV2S0,
    EfficientFormerV2S0Rife,
    EfficientNetV2B0,
    EfficientNetV2B0Rife,
    SwinV2Small,
    SwinV2SmallRife,
    AutoShot,
}

impl ModelId {
    pub const ALL: [ModelId; 7] = [
        ModelId::EfficientFormerV2S0,
        ModelId::EfficientFormerV2S0Rife,
        ModelId::EfficientNetV2B0,
        ModelId::EfficientNetV2B0Rife,
        ModelId::SwinV2Small,
        ModelId::SwinV2SmallRife,
        ModelId::AutoShot,
    ];

    /// Numeric id used in configuration
    pub fn index(&self) -> i64 {
        match self {
            ModelId::EfficientFormerV2S0 => 0,
            ModelId::EfficientFormerV2S0Rife => 1,
            ModelId::EfficientNetV2B0 => 2,
            ModelId::EfficientNetV2B0Rife => 3,
            ModelId::SwinV2Small => 4,
            ModelId::SwinV2SmallRife => 5,
            ModelId::AutoShot => 6,
        }
    }

    /// Static model description
    pub fn spec(&self) -> ModelSpec {
        let (weight_file, resolution, topology) = match self {
            ModelId::EfficientFormerV2S0 => (
                "sc_efficientformerv2_s0_12263_224_CHW_6ch_clamp_softmax_op17_fp16_sim.onnx",
                (224, 224),
                Topology::Pair,
            ),
            ModelId::EfficientFormerV2S0Rife => (
                "sc_efficientformerv2_s0+rife46_flow_84119_224_CHW_6ch_clamp_softmax_op17_fp16.onnx",
                (224, 224),
                Topology::Pair,
            ),
            ModelId::EfficientNetV2B0 => (
                "sc_efficientnetv2b0_17957_256_CHW_6ch_clamp_softmax_op17_fp16_sim.onnx",
                (256, 256),
                Topology::Pair,
            ),
            ModelId::EfficientNetV2B0Rife => (
                "sc_efficientnetv2b0+rife46_flow_1362_256_CHW_6ch_clamp_softmax_op17_fp16_sim.onnx",
                (256, 256),
                Topology::Pair,
            ),
            ModelId::SwinV2Small => (
                "sc_swinv2_small_window16_10412_256_CHW_6ch_clamp_softmax_op17_fp16.onnx",
                (256, 256),
                Topology::Pair,
            ),
            ModelId::SwinV2SmallRife => (
                "sc_swinv2_small_window16+rife46_flow_1814_256_84119_224_CHW_6ch_clamp_softmax_op17_fp16.onnx",
                (256, 256),
                Topology::Pair,
            ),
            ModelId::AutoShot => ("autoshot_clamp_op17_5img.onnx", (48, 27), Topology::Quint),
        };

        ModelSpec {
            id: *self,
            weight_file,
            resolution,
            topology,
        }
    }
}

impl TryFrom<i64> for ModelId {
    type Error = ConfigError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        ModelId::ALL
            .into_iter()
            .find(|m| m.index() == id)
            .ok_or(ConfigError::UnknownModel(id))
    }
}

/// Immutable description of one model variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: ModelId,
    /// Weight file name inside the model directory
    pub weight_file: &'static str,
    /// Model input resolution (width, height)
    pub resolution: (u32, u32),
    pub topology: Topology,
}

impl ModelSpec {
    /// Format frames are resampled to before marshalling
    pub fn input_format(&self) -> PixelFormat {
        match self.topology {
            Topology::Pair => PixelFormat::RgbH,
            Topology::Quint => PixelFormat::RgbS,
        }
    }

    /// Full weight path below `model_dir`
    pub fn weight_path(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(self.weight_file)
    }
}

/// Lookup from configured model id to model spec
pub struct ModelRegistry;

impl ModelRegistry {
    /// Resolve a configured id; ids outside the known set are a configuration error
    pub fn resolve(id: i64) -> Result<ModelSpec, ConfigError> {
        ModelId::try_from(id).map(|m| m.spec())
    }

    /// All known model specs in id order
    pub fn all() -> impl Iterator<Item = ModelSpec> {
        ModelId::ALL.into_iter().map(|m| m.spec())
    }
}
