//! Video Frame Library for Scene Detection
//!
//! Provides planar frame types shared by the scene detection pipeline:
//! - Planar 8-bit and float frames with per-frame properties
//! - Indexable frame sources
//! - Resampling to model resolution and RGB float formats

pub mod frame;
pub mod resample;
pub mod source;

pub use frame::{FrameProps, PixelFormat, Plane, PlaneData, PropValue, SampleType, VideoFrame};
pub use resample::{BicubicResampler, Resampler};
pub use source::{FrameSource, VecSource};

use thiserror::Error;

/// Frame error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Format {format:?} expects {expected} planes, got {actual}")]
    PlaneCount {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("Plane {plane} has {actual} samples, expected {expected} ({width}x{height})")]
    PlaneSize {
        plane: usize,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Frame index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Resample failed: {0}")]
    Resample(String),
}
