//! Resampled frame cache
//!
//! Every source frame is resampled to model resolution at most once while it
//! stays cached, so overlapping windows share the same backing frames.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use video_frame::{FrameError, FrameSource, PixelFormat, Resampler, VideoFrame};

/// Default number of resampled frames kept (covers the windows of ~12 parallel evaluations)
pub const DEFAULT_CACHE_FRAMES: usize = 64;

/// Fixed-capacity ring of (index, frame) entries; a push overwrites the oldest entry
struct FrameRing {
    slots: Box<[Option<(usize, Arc<VideoFrame>)>]>,
    head: usize,
}

impl FrameRing {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
        }
    }

    fn get(&self, index: usize) -> Option<Arc<VideoFrame>> {
        self.slots.iter().find_map(|slot| match slot {
            Some((i, frame)) if *i == index => Some(frame.clone()),
            _ => None,
        })
    }

    fn push(&mut self, index: usize, frame: Arc<VideoFrame>) {
        self.slots[self.head] = Some((index, frame));
        self.head = (self.head + 1) % self.slots.len();
    }
}

/// A frame source viewed at model resolution and input format
pub struct ResampledClip {
    source: Arc<dyn FrameSource>,
    resampler: Arc<dyn Resampler>,
    width: u32,
    height: u32,
    format: PixelFormat,
    cache: Mutex<FrameRing>,
    resamples: AtomicUsize,
}

impl ResampledClip {
    pub fn new(
        source: Arc<dyn FrameSource>,
        resampler: Arc<dyn Resampler>,
        (width, height): (u32, u32),
        format: PixelFormat,
        capacity: usize,
    ) -> Self {
        Self {
            source,
            resampler,
            width,
            height,
            format,
            cache: Mutex::new(FrameRing::new(capacity.max(1))),
            resamples: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resampled frame at `index`
    pub fn frame(&self, index: usize) -> Result<Arc<VideoFrame>, FrameError> {
        if let Some(frame) = self.cache.lock().get(index) {
            return Ok(frame);
        }

        // Resample outside the lock; a concurrent duplicate loses to the first insert
        let original = self.source.frame(index)?;
        let resampled = Arc::new(
            self.resampler
                .resample(&original, self.width, self.height, self.format)?,
        );
        self.resamples.fetch_add(1, Ordering::Relaxed);
        trace!(index, "Resampled source frame");

        let mut cache = self.cache.lock();
        if let Some(existing) = cache.get(index) {
            return Ok(existing);
        }
        cache.push(index, resampled.clone());
        Ok(resampled)
    }

    /// Zero-valued frame in the resampled format
    pub fn blank(&self) -> VideoFrame {
        VideoFrame::blank(self.format, self.width, self.height)
    }

    /// Total resample operations performed (for statistics)
    pub fn resample_count(&self) -> usize {
        self.resamples.load(Ordering::Relaxed)
    }
}
