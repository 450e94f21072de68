//! Trace geometry and the coverage shader it is drawn with.

pub mod coverage;
pub mod geometry;
#[cfg(feature = "gpu")]
pub mod pipeline;

pub use coverage::{TRACE_SHADER_WGSL, TraceStyle, TraceUniforms};
pub use geometry::{FadeLut, GeometryBuilder, TraceVertex, XY_WINDOW};

/// Default trace half-width in NDC.
pub const LINE_HALF_WIDTH: f32 = 0.002;
