//! Triangulated trace geometry for the coverage shader.

use crate::timebase::ViewWindow;
use bytemuck::{Pod, Zeroable};

/// Trailing samples paired up in XY mode.
pub const XY_WINDOW: usize = 16_384;
// Age fade exponent and the cut-off below which XY samples are skipped.
const FADE_EXPONENT: i32 = 30;
const FADE_CUTOFF: f32 = 0.02;
const MIN_SEGMENT: f32 = 1e-6;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TraceVertex {
    pub position: [f32; 2],
    /// Along/across offset from the segment start, in NDC.
    pub local: [f32; 2],
    pub length: f32,
}

/// Opacity by age over the XY window: `(i / N)^30`, newest samples brightest.
#[derive(Debug, Clone)]
pub struct FadeLut {
    alpha: Box<[f32]>,
}

impl FadeLut {
    pub fn new(len: usize) -> Self {
        let n = len.max(1) as f32;
        Self {
            alpha: (0..len).map(|i| (i as f32 / n).powi(FADE_EXPONENT)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.alpha.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alpha.is_empty()
    }

    #[inline]
    pub fn alpha(&self, index: usize) -> f32 {
        self.alpha.get(index).copied().unwrap_or(0.0)
    }
}

impl Default for FadeLut {
    fn default() -> Self {
        Self::new(XY_WINDOW)
    }
}

/// Accumulates six vertices per segment into a reusable buffer.
#[derive(Debug, Clone)]
pub struct GeometryBuilder {
    half_width: f32,
    vertices: Vec<TraceVertex>,
}

impl GeometryBuilder {
    pub fn new(half_width: f32) -> Self {
        Self {
            half_width,
            vertices: Vec::new(),
        }
    }

    pub fn half_width(&self) -> f32 {
        self.half_width
    }

    pub fn set_half_width(&mut self, half_width: f32) {
        self.half_width = half_width;
    }

    pub fn vertices(&self) -> &[TraceVertex] {
        &self.vertices
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Appends the quad for one segment, extended by the half-width on every
    /// side. A zero-length segment renders as a dot facing +x.
    pub fn push_segment(&mut self, p0: [f32; 2], p1: [f32; 2]) {
        let w = self.half_width;
        let (dx, dy) = (p1[0] - p0[0], p1[1] - p0[1]);
        let len = (dx * dx + dy * dy).sqrt();
        let (ux, uy) = if len > MIN_SEGMENT {
            (dx / len, dy / len)
        } else {
            (1.0, 0.0)
        };
        let (ax, ay) = (ux * w, uy * w);
        let (nx, ny) = (-ay, ax);

        let vertex = |x: f32, y: f32, along: f32, across: f32| TraceVertex {
            position: [x, y],
            local: [along, across],
            length: len,
        };
        let start_right = vertex(p0[0] - ax - nx, p0[1] - ay - ny, -w, -w);
        let start_left = vertex(p0[0] - ax + nx, p0[1] - ay + ny, -w, w);
        let end_right = vertex(p1[0] + ax - nx, p1[1] + ay - ny, len + w, -w);
        let end_left = vertex(p1[0] + ax + nx, p1[1] + ay + ny, len + w, w);

        self.vertices.extend([
            start_right,
            start_left,
            end_right,
            start_left,
            end_right,
            end_left,
        ]);
    }

    pub fn build_polyline<I>(&mut self, points: I) -> &[TraceVertex]
    where
        I: IntoIterator<Item = [f32; 2]>,
    {
        self.clear();
        let mut points = points.into_iter();
        if let Some(mut prev) = points.next() {
            for point in points {
                self.push_segment(prev, point);
                prev = point;
            }
        }
        &self.vertices
    }

    /// Connects consecutive samples across the visible slice of `data`.
    /// Indices outside the window repeat the edge sample.
    pub fn build_time_domain(&mut self, data: &[f32], view: &ViewWindow) -> &[TraceVertex] {
        self.clear();
        let Some(last) = data.len().checked_sub(1) else {
            return &self.vertices;
        };

        let clamp = |i: isize| i.clamp(0, last as isize) as usize;
        let (first, end) = view.index_range();
        self.vertices.reserve((end - first).max(0) as usize * 6);
        for i in first..end - 1 {
            let p0 = [view.to_ndc(i as f64), data[clamp(i)]];
            let p1 = [view.to_ndc((i + 1) as f64), data[clamp(i + 1)]];
            self.push_segment(p0, p1);
        }
        &self.vertices
    }

    /// Lissajous trace of `x` against `y` over their trailing samples.
    ///
    /// `aspect` (height / width) keeps the figure square on screen.
    pub fn build_xy(&mut self, x: &[f32], y: &[f32], aspect: f32, lut: &FadeLut) -> &[TraceVertex] {
        self.clear();
        let len = x.len().min(y.len()) as isize;
        let span = lut.len();
        // Windows shorter than the LUT keep their newest sample at full brightness.
        let origin = len - span as isize - 1;

        for i in 1..span.saturating_sub(1) {
            let a = origin + i as isize;
            if a < 0 || lut.alpha(i) < FADE_CUTOFF {
                continue;
            }
            let (a, b) = (a as usize, a as usize + 1);
            self.push_segment([x[a] * aspect, y[a]], [x[b] * aspect, y[b]]);
        }
        &self.vertices
    }
}

impl Default for GeometryBuilder {
    fn default() -> Self {
        Self::new(super::LINE_HALF_WIDTH)
    }
}
