//! Model input tensors

use half::f16;
use ndarray::ArrayD;

/// Dense model input in half or single precision
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    Half(ArrayD<f16>),
    Single(ArrayD<f32>),
}

impl Tensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::Half(a) => a.shape(),
            Tensor::Single(a) => a.shape(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Tensor::Half(a) => a.len(),
            Tensor::Single(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_half(&self) -> bool {
        matches!(self, Tensor::Half(_))
    }

    /// Element at `index` widened to f32
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        match self {
            Tensor::Half(a) => a.get(index).map(|v| v.to_f32()),
            Tensor::Single(a) => a.get(index).copied(),
        }
    }

    /// Copy widened to f32
    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            Tensor::Half(a) => a.mapv(|v| v.to_f32()),
            Tensor::Single(a) => a.clone(),
        }
    }
}
