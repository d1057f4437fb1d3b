//! Resampling to model resolution and RGB float formats

use half::f16;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use tracing::trace;

use crate::{FrameError, PixelFormat, PlaneData, VideoFrame};

/// BT.709 matrix coefficients (Kr = 0.2126, Kb = 0.0722)
const BT709_R_CR: f32 = 1.5748;
const BT709_G_CB: f32 = -0.187_324;
const BT709_G_CR: f32 = -0.468_124;
const BT709_B_CB: f32 = 1.8556;

/// Resamples frames to an arbitrary resolution and pixel format
pub trait Resampler: Send + Sync {
    fn resample(
        &self,
        frame: &VideoFrame,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<VideoFrame, FrameError>;
}

/// Bicubic (Catmull-Rom) resampler with BT.709 limited-range YUV input
#[derive(Debug, Clone, Copy)]
pub struct BicubicResampler {
    filter: FilterType,
}

impl Default for BicubicResampler {
    fn default() -> Self {
        Self {
            filter: FilterType::CatmullRom,
        }
    }
}

impl BicubicResampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different interpolation filter
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }

    /// Resize one plane of normalized samples. The filter clamps to [0, 1], so
    /// samples are mapped into that range by the plane's own extent while
    /// resizing and mapped back afterwards; values outside [0, 1] survive.
    fn resize_plane(
        &self,
        samples: Vec<f32>,
        src: (u32, u32),
        dst: (u32, u32),
    ) -> Result<Vec<f32>, FrameError> {
        if src == dst {
            return Ok(samples);
        }

        let (min, max) = samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        let len = dst.0 as usize * dst.1 as usize;
        if samples.is_empty() || max <= min {
            let value = if samples.is_empty() { 0.0 } else { min };
            return Ok(vec![value; len]);
        }

        let range = max - min;
        let scaled: Vec<f32> = samples.into_iter().map(|s| (s - min) / range).collect();
        let buffer = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(src.0, src.1, scaled)
            .ok_or_else(|| {
                FrameError::Resample(format!("plane buffer does not match {}x{}", src.0, src.1))
            })?;

        let resized = imageops::resize(&buffer, dst.0, dst.1, self.filter);
        Ok(resized.into_raw().into_iter().map(|s| s * range + min).collect())
    }
}

impl Resampler for BicubicResampler {
    fn resample(
        &self,
        frame: &VideoFrame,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<VideoFrame, FrameError> {
        if !format.is_rgb_float() {
            return Err(FrameError::Unsupported(format!(
                "resample target must be RGB float, got {:?}",
                format
            )));
        }
        if width == 0 || height == 0 {
            return Err(FrameError::Resample(format!(
                "invalid target size {}x{}",
                width, height
            )));
        }

        let src_format = frame.format();
        let dst = (width, height);

        // Normalize every plane to [0, 1] luma/RGB or [-0.5, 0.5] chroma, then resize
        let mut resized = Vec::with_capacity(frame.num_planes());
        for (i, plane) in frame.planes().iter().enumerate() {
            let raw = plane.data().to_f32();
            let chroma = src_format.is_yuv() && i > 0;
            let normalized: Vec<f32> = match src_format {
                PixelFormat::Yuv420P8 | PixelFormat::Yuv444P8 if chroma => {
                    raw.into_iter().map(|v| (v - 128.0) / 224.0).collect()
                }
                PixelFormat::Yuv420P8 | PixelFormat::Yuv444P8 => {
                    raw.into_iter().map(|v| (v - 16.0) / 219.0).collect()
                }
                PixelFormat::Gray8 | PixelFormat::Rgb24 => {
                    raw.into_iter().map(|v| v / 255.0).collect()
                }
                PixelFormat::RgbH | PixelFormat::RgbS => raw,
            };
            resized.push(self.resize_plane(normalized, (plane.width, plane.height), dst)?);
        }

        let rgb: [Vec<f32>; 3] = match src_format {
            PixelFormat::Gray8 => {
                let y = resized.swap_remove(0);
                [y.clone(), y.clone(), y]
            }
            PixelFormat::Yuv420P8 | PixelFormat::Yuv444P8 => {
                let (y, cb, cr) = (&resized[0], &resized[1], &resized[2]);
                let mut r = Vec::with_capacity(y.len());
                let mut g = Vec::with_capacity(y.len());
                let mut b = Vec::with_capacity(y.len());
                for ((&y, &cb), &cr) in y.iter().zip(cb).zip(cr) {
                    r.push(y + BT709_R_CR * cr);
                    g.push(y + BT709_G_CB * cb + BT709_G_CR * cr);
                    b.push(y + BT709_B_CB * cb);
                }
                [r, g, b]
            }
            PixelFormat::Rgb24 | PixelFormat::RgbH | PixelFormat::RgbS => {
                let b = resized.pop();
                let g = resized.pop();
                let r = resized.pop();
                match (r, g, b) {
                    (Some(r), Some(g), Some(b)) => [r, g, b],
                    _ => return Err(FrameError::Resample("RGB frame without three planes".into())),
                }
            }
        };

        let planes = rgb
            .into_iter()
            .map(|samples| match format {
                PixelFormat::RgbH => PlaneData::F16(samples.into_iter().map(f16::from_f32).collect()),
                _ => PlaneData::F32(samples),
            })
            .collect();

        trace!(
            from = ?src_format,
            to = ?format,
            width,
            height,
            "Resampled frame"
        );

        VideoFrame::new(format, width, height, planes)
    }
}
