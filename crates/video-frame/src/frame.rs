//! Planar video frame types and frame properties

use std::collections::BTreeMap;
use std::sync::Arc;

use half::f16;

use crate::FrameError;

/// Property written by the scene change evaluator (1 = a new scene starts at the next frame)
pub const SCENE_CHANGE_NEXT: &str = "_SceneChangeNext";

/// Sample storage type of a plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    F16,
    F32,
}

/// Planar pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Single 8-bit luma plane
    Gray8,
    /// Planar 8-bit RGB
    Rgb24,
    /// 8-bit YUV with 2x2 subsampled chroma
    Yuv420P8,
    /// 8-bit YUV without chroma subsampling
    Yuv444P8,
    /// Planar half-precision RGB
    RgbH,
    /// Planar single-precision RGB
    RgbS,
}

impl PixelFormat {
    /// Number of planes in a frame of this format
    pub fn num_planes(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            _ => 3,
        }
    }

    /// Storage type of every plane
    pub fn sample_type(&self) -> SampleType {
        match self {
            PixelFormat::RgbH => SampleType::F16,
            PixelFormat::RgbS => SampleType::F32,
            _ => SampleType::U8,
        }
    }

    /// True for the float RGB formats models consume
    pub fn is_rgb_float(&self) -> bool {
        matches!(self, PixelFormat::RgbH | PixelFormat::RgbS)
    }

    /// True for YUV formats
    pub fn is_yuv(&self) -> bool {
        matches!(self, PixelFormat::Yuv420P8 | PixelFormat::Yuv444P8)
    }

    /// Dimensions of `plane` for a frame of `width` x `height`
    pub fn plane_dims(&self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        match (self, plane) {
            (PixelFormat::Yuv420P8, 1 | 2) => (width.div_ceil(2), height.div_ceil(2)),
            _ => (width, height),
        }
    }

    /// Sample count of `plane`, computed in `usize`
    pub fn plane_len(&self, plane: usize, width: u32, height: u32) -> usize {
        let (w, h) = self.plane_dims(plane, width, height);
        w as usize * h as usize
    }
}

/// Typed sample buffer of one plane
#[derive(Debug, Clone, PartialEq)]
pub enum PlaneData {
    U8(Vec<u8>),
    F16(Vec<f16>),
    F32(Vec<f32>),
}

impl PlaneData {
    /// Zero-filled buffer of `len` samples
    pub fn zeros(sample: SampleType, len: usize) -> Self {
        match sample {
            SampleType::U8 => PlaneData::U8(vec![0; len]),
            SampleType::F16 => PlaneData::F16(vec![f16::ZERO; len]),
            SampleType::F32 => PlaneData::F32(vec![0.0; len]),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            PlaneData::U8(_) => SampleType::U8,
            PlaneData::F16(_) => SampleType::F16,
            PlaneData::F32(_) => SampleType::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PlaneData::U8(v) => v.len(),
            PlaneData::F16(v) => v.len(),
            PlaneData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples widened to f32 without rescaling
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            PlaneData::U8(v) => v.iter().map(|&s| s as f32).collect(),
            PlaneData::F16(v) => v.iter().map(|s| s.to_f32()).collect(),
            PlaneData::F32(v) => v.clone(),
        }
    }
}

/// One image plane. Sample buffers are shared between frame copies.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    data: Arc<PlaneData>,
}

impl Plane {
    pub fn new(width: u32, height: u32, data: PlaneData) -> Self {
        Self {
            width,
            height,
            data: Arc::new(data),
        }
    }

    pub fn data(&self) -> &PlaneData {
        &self.data
    }
}

/// Frame property value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropValue {
    Int(i64),
    Float(f64),
}

/// Per-frame property map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameProps(BTreeMap<String, PropValue>);

impl FrameProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<PropValue> {
        self.0.get(key).copied()
    }

    /// Numeric property as f64; integer properties are widened
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            PropValue::Float(v) => Some(v),
            PropValue::Int(v) => Some(v as f64),
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            PropValue::Int(v) => Some(v),
            PropValue::Float(_) => None,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: PropValue) {
        self.0.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Planar video frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    format: PixelFormat,
    width: u32,
    height: u32,
    planes: Vec<Plane>,
    props: FrameProps,
}

impl VideoFrame {
    /// Create a frame, checking plane count, sample types and plane sizes against the format
    pub fn new(
        format: PixelFormat,
        width: u32,
        height: u32,
        planes: Vec<PlaneData>,
    ) -> Result<Self, FrameError> {
        if planes.len() != format.num_planes() {
            return Err(FrameError::PlaneCount {
                format,
                expected: format.num_planes(),
                actual: planes.len(),
            });
        }

        let mut checked = Vec::with_capacity(planes.len());
        for (i, data) in planes.into_iter().enumerate() {
            if data.sample_type() != format.sample_type() {
                return Err(FrameError::Unsupported(format!(
                    "plane {} holds {:?} samples, {:?} requires {:?}",
                    i,
                    data.sample_type(),
                    format,
                    format.sample_type()
                )));
            }
            let (w, h) = format.plane_dims(i, width, height);
            let expected = format.plane_len(i, width, height);
            if data.len() != expected {
                return Err(FrameError::PlaneSize {
                    plane: i,
                    width: w,
                    height: h,
                    expected,
                    actual: data.len(),
                });
            }
            checked.push(Plane::new(w, h, data));
        }

        Ok(Self {
            format,
            width,
            height,
            planes: checked,
            props: FrameProps::new(),
        })
    }

    /// Zero-valued frame with no properties
    pub fn blank(format: PixelFormat, width: u32, height: u32) -> Self {
        let planes = (0..format.num_planes())
            .map(|i| {
                let (w, h) = format.plane_dims(i, width, height);
                let len = format.plane_len(i, width, height);
                Plane::new(w, h, PlaneData::zeros(format.sample_type(), len))
            })
            .collect();

        Self {
            format,
            width,
            height,
            planes,
            props: FrameProps::new(),
        }
    }

    /// Blank frame with this frame's format and size
    pub fn blank_like(&self) -> Self {
        Self::blank(self.format, self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn props(&self) -> &FrameProps {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut FrameProps {
        &mut self.props
    }

    /// Builder-style property setter
    pub fn with_prop(mut self, key: impl Into<String>, value: PropValue) -> Self {
        self.props.set(key, value);
        self
    }

    /// Copy of this frame carrying the scene change annotation. Plane data is shared.
    pub fn annotated(&self, scene_change_next: bool) -> Self {
        let mut copy = self.clone();
        copy.props
            .set(SCENE_CHANGE_NEXT, PropValue::Int(i64::from(scene_change_next)));
        copy
    }

    /// Scene change annotation, if the frame has been evaluated
    pub fn scene_change_next(&self) -> Option<bool> {
        self.props.get_int(SCENE_CHANGE_NEXT).map(|v| v != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_plane_count() {
        let err = VideoFrame::new(PixelFormat::Rgb24, 2, 2, vec![PlaneData::U8(vec![0; 4])])
            .unwrap_err();
        assert!(matches!(err, FrameError::PlaneCount { expected: 3, actual: 1, .. }));
    }

    #[test]
    fn test_new_validates_chroma_size() {
        let luma = PlaneData::U8(vec![0; 16]);
        let chroma = || PlaneData::U8(vec![128; 4]);
        let frame = VideoFrame::new(PixelFormat::Yuv420P8, 4, 4, vec![luma.clone(), chroma(), chroma()])
            .unwrap();
        assert_eq!(frame.plane(1).unwrap().width, 2);

        let err = VideoFrame::new(
            PixelFormat::Yuv420P8,
            4,
            4,
            vec![luma, PlaneData::U8(vec![128; 16]), chroma()],
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::PlaneSize { plane: 1, .. }));
    }

    #[test]
    fn test_new_rejects_wrong_sample_type() {
        let planes = vec![PlaneData::F32(vec![0.0; 4]); 3];
        assert!(VideoFrame::new(PixelFormat::RgbH, 2, 2, planes).is_err());
    }

    #[test]
    fn test_plane_len_does_not_wrap() {
        assert_eq!(PixelFormat::RgbS.plane_len(0, 70_000, 70_000), 4_900_000_000);
        assert_eq!(PixelFormat::Yuv420P8.plane_len(1, 70_001, 70_001), 35_001 * 35_001);
        assert_eq!(PixelFormat::Yuv420P8.plane_len(1, 5, 3), 6);
    }

    #[test]
    fn test_blank_is_zero() {
        let frame = VideoFrame::blank(PixelFormat::RgbH, 3, 2);
        assert_eq!(frame.num_planes(), 3);
        for plane in frame.planes() {
            assert_eq!(plane.data().len(), 6);
            assert!(plane.data().to_f32().iter().all(|&v| v == 0.0));
        }
        assert!(frame.props().is_empty());
    }

    #[test]
    fn test_annotated_copies_without_touching_original() {
        let original = VideoFrame::blank(PixelFormat::Gray8, 2, 2)
            .with_prop("float_ssim", PropValue::Float(0.5));
        let marked = original.annotated(true);

        assert_eq!(original.scene_change_next(), None);
        assert_eq!(marked.scene_change_next(), Some(true));
        assert_eq!(marked.props().get_float("float_ssim"), Some(0.5));
        assert_eq!(marked.planes(), original.planes());
        assert_eq!(original.annotated(false).props().get_int(SCENE_CHANGE_NEXT), Some(0));
    }
}
