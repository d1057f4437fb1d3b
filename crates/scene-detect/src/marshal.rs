//! Window to tensor marshalling
//!
//! Pair windows become `[6, H, W]` (current RGB then next RGB); quintuple
//! windows become `[1, C, 5, H, W]` with the temporal axis after channels.
//! Sample values are copied unchanged.

use half::f16;
use inference_engine::{Tensor, Topology};
use ndarray::{Array3, ArrayD, Axis};
use thiserror::Error;
use video_frame::{PixelFormat, PlaneData, SampleType, VideoFrame};

use crate::window::FrameWindow;

#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("Frames in {0:?} cannot be fed to a model, expected half or single precision RGB")]
    UnsupportedSample(PixelFormat),

    #[error("Inconsistent window: {0}")]
    MismatchedWindow(String),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Converts frame windows into model input tensors
#[derive(Debug, Clone, Copy, Default)]
pub struct TensorMarshaller;

impl TensorMarshaller {
    pub fn marshal(window: &FrameWindow) -> Result<Tensor, MarshalError> {
        let arity = window.topology.arity();
        if window.frames.len() != arity {
            return Err(MarshalError::MismatchedWindow(format!(
                "{} topology needs {} frames, window has {}",
                window.topology.as_str(),
                arity,
                window.frames.len()
            )));
        }

        let first = &window.frames[0];
        let layout = (first.format(), first.width(), first.height());
        for (position, frame) in window.frames.iter().enumerate() {
            let actual = (frame.format(), frame.width(), frame.height());
            if actual != layout {
                return Err(MarshalError::MismatchedWindow(format!(
                    "frame {} is {:?} {}x{}, frame 0 is {:?} {}x{}",
                    position, actual.0, actual.1, actual.2, layout.0, layout.1, layout.2
                )));
            }
        }

        match layout.0.sample_type() {
            SampleType::F16 => {
                let planes = collect_planes(window, half_samples)?;
                Ok(Tensor::Half(assemble(window.topology, &planes)?))
            }
            SampleType::F32 => {
                let planes = collect_planes(window, single_samples)?;
                Ok(Tensor::Single(assemble(window.topology, &planes)?))
            }
            SampleType::U8 => Err(MarshalError::UnsupportedSample(layout.0)),
        }
    }
}

fn half_samples(data: &PlaneData) -> Option<&[f16]> {
    match data {
        PlaneData::F16(v) => Some(v),
        _ => None,
    }
}

fn single_samples(data: &PlaneData) -> Option<&[f32]> {
    match data {
        PlaneData::F32(v) => Some(v),
        _ => None,
    }
}

fn collect_planes<T: Copy>(
    window: &FrameWindow,
    samples: fn(&PlaneData) -> Option<&[T]>,
) -> Result<Vec<Array3<T>>, MarshalError> {
    window
        .frames
        .iter()
        .map(|frame| stack_planes(frame, samples))
        .collect()
}

/// `[planes, H, W]` in plane order
fn stack_planes<T: Copy>(
    frame: &VideoFrame,
    samples: fn(&PlaneData) -> Option<&[T]>,
) -> Result<Array3<T>, MarshalError> {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let mut data = Vec::with_capacity(frame.num_planes() * w * h);
    for plane in frame.planes() {
        let plane_samples =
            samples(plane.data()).ok_or(MarshalError::UnsupportedSample(frame.format()))?;
        data.extend_from_slice(plane_samples);
    }
    Ok(Array3::from_shape_vec((frame.num_planes(), h, w), data)?)
}

fn assemble<T: Clone>(topology: Topology, planes: &[Array3<T>]) -> Result<ArrayD<T>, MarshalError> {
    let views: Vec<_> = planes.iter().map(|a| a.view()).collect();
    let tensor = match topology {
        Topology::Pair => ndarray::concatenate(Axis(0), &views)?.into_dyn(),
        Topology::Quint => ndarray::stack(Axis(1), &views)?
            .insert_axis(Axis(0))
            .into_dyn(),
    };
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{constant_source, small_spec};
    use crate::window::FrameWindowBuilder;
    use std::sync::Arc;
    use video_frame::BicubicResampler;

    fn window(values: &[f32], model: i64, t: usize) -> FrameWindow {
        FrameWindowBuilder::new(
            constant_source(values),
            &small_spec(model),
            Arc::new(BicubicResampler::new()),
        )
        .window(t)
        .unwrap()
    }

    #[test]
    fn test_pair_layout() {
        let tensor = TensorMarshaller::marshal(&window(&[0.25, 0.5, 0.75], 0, 0)).unwrap();
        assert!(tensor.is_half());
        assert_eq!(tensor.shape(), &[6, 4, 4]);

        // Channels 0..3 are the current frame, 3..6 the next
        let current = tensor.get(&[0, 0, 0]).unwrap();
        let next = tensor.get(&[3, 0, 0]).unwrap();
        assert!((current - 0.25).abs() < 1e-3);
        assert!((next - 0.5).abs() < 1e-3);
        assert!((tensor.get(&[5, 3, 3]).unwrap() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_pair_padding_is_zero() {
        let tensor = TensorMarshaller::marshal(&window(&[0.25, 0.5], 0, 1)).unwrap();
        assert_eq!(tensor.get(&[3, 1, 1]), Some(0.0));
    }

    #[test]
    fn test_quint_layout() {
        let tensor = TensorMarshaller::marshal(&window(&[0.25, 0.5, 0.75], 6, 1)).unwrap();
        assert!(!tensor.is_half());
        assert_eq!(tensor.shape(), &[1, 3, 5, 4, 4]);

        // Temporal positions t-2..t+2 along axis 2
        let expected = [0.0, 0.25, 0.5, 0.75, 0.0];
        for (k, value) in expected.iter().enumerate() {
            for c in 0..3 {
                let sample = tensor.get(&[0, c, k, 2, 2]).unwrap();
                assert!((sample - value).abs() < 1e-3, "c={} k={}", c, k);
            }
        }
    }

    #[test]
    fn test_mismatched_window_rejected() {
        let mut w = window(&[0.25, 0.5], 0, 0);
        w.frames[1] = Arc::new(VideoFrame::blank(PixelFormat::RgbH, 2, 2));
        assert!(matches!(
            TensorMarshaller::marshal(&w),
            Err(MarshalError::MismatchedWindow(_))
        ));

        let mut w = window(&[0.25, 0.5], 0, 0);
        w.frames.pop();
        assert!(matches!(
            TensorMarshaller::marshal(&w),
            Err(MarshalError::MismatchedWindow(_))
        ));
    }

    #[test]
    fn test_integer_frames_rejected() {
        let mut w = window(&[0.25, 0.5], 0, 0);
        let gray = Arc::new(VideoFrame::blank(PixelFormat::Rgb24, 4, 4));
        w.frames = vec![gray.clone(), gray];
        assert!(matches!(
            TensorMarshaller::marshal(&w),
            Err(MarshalError::UnsupportedSample(PixelFormat::Rgb24))
        ));
    }
}
