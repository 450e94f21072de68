//! Horizontal axis: timebase ranges and the visible slice of a window.

use crate::dsp::GRID_DIVISIONS_X;

/// Capture rate of the audio path.
pub const AUDIO_SAMPLE_RATE: f32 = 96_000.0;

// One JustFloat frame on the wire: 12 bytes of 10 bits each.
const BITS_PER_SERIAL_FRAME: u32 = 120;

/// Frames per second a serial link can deliver at `baud`.
pub fn estimated_serial_rate(baud: u32) -> f32 {
    (baud / BITS_PER_SERIAL_FRAME) as f32
}

/// Allowed ms/div range and its starting value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimebaseRange {
    pub min_ms: f32,
    pub max_ms: f32,
    pub default_ms: f32,
}

impl TimebaseRange {
    pub fn audio() -> Self {
        Self {
            min_ms: 1.0,
            max_ms: 34.0,
            default_ms: 5.0,
        }
    }

    /// Keeps at least 10 and at most ~500 samples per division, with a
    /// minimum 10x zoom span; starts at 50 samples per division.
    pub fn serial(sample_rate: f32) -> Self {
        let rate = sample_rate.max(1.0);
        let per_div = |samples: f32| samples / rate * 1_000.0;

        let min_ms = per_div(10.0).max(0.1);
        let max_ms = per_div(500.0).max(min_ms * 10.0);
        Self {
            min_ms,
            max_ms,
            default_ms: per_div(50.0).clamp(min_ms, max_ms),
        }
    }

    pub fn clamp(&self, ms_per_division: f32) -> f32 {
        ms_per_division.clamp(self.min_ms, self.max_ms)
    }
}

/// The slice of a sample window that maps onto the screen width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewWindow {
    /// Fractional window index at the left screen edge.
    pub start: f64,
    /// Samples across the full screen width.
    pub points: usize,
    /// Trigger index, or the window centre when untriggered.
    pub anchor: f64,
}

impl ViewWindow {
    pub fn points_to_show(ms_per_division: f32, sample_rate: f32) -> usize {
        let per_div = f64::from(ms_per_division) * f64::from(sample_rate) / 1_000.0;
        (per_div * f64::from(GRID_DIVISIONS_X)).floor().max(1.0) as usize
    }

    /// `horizontal_percent` of 50 centres the anchor; 0 and 100 shift the view
    /// by half a window either way.
    pub fn new(
        trigger: Option<f64>,
        horizontal_percent: f32,
        window_len: usize,
        points: usize,
    ) -> Self {
        let len = window_len as f64;
        let anchor = trigger.unwrap_or(len / 2.0);
        let center = anchor + (f64::from(horizontal_percent) / 100.0 - 0.5) * len;
        let points = points.max(1);
        Self {
            start: center - points as f64 / 2.0,
            points,
            anchor,
        }
    }

    /// Integer sample range covering the view, extended by one sample on the
    /// right so the last segment reaches the screen edge. May fall outside
    /// the window; callers clamp.
    pub fn index_range(&self) -> (isize, isize) {
        let first = self.start.floor() as isize;
        let end = (self.start + self.points as f64).ceil() as isize + 1;
        (first, end)
    }

    /// Horizontal NDC coordinate of a (fractional) window index.
    #[inline]
    pub fn to_ndc(&self, index: f64) -> f32 {
        ((index - self.start) / self.points as f64 * 2.0 - 1.0) as f32
    }

    /// Where the anchor falls on screen, in NDC.
    pub fn anchor_ndc(&self) -> f32 {
        self.to_ndc(self.anchor)
    }
}
