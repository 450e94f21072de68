//! Analytic line coverage: a Gaussian-blurred segment integrated with `erf`.
//!
//! The CPU functions here mirror `shaders/trace.wgsl` term for term so the
//! shader's behaviour can be checked without a GPU.

use bytemuck::{Pod, Zeroable};
use std::f32::consts::SQRT_2;

pub const TRACE_SHADER_WGSL: &str = include_str!("shaders/trace.wgsl");

const EPS: f32 = 1e-6;
/// Trace intensity for serial captures.
pub const SERIAL_INTENSITY: f32 = 1.5;
pub const AUDIO_INTENSITY: f32 = 0.4;

/// Polynomial `erf` approximation (Abramowitz–Stegun 7.1.27).
pub fn erf_approx(x: f32) -> f32 {
    let s = x.signum();
    let a = x.abs();
    let mut t = 1.0 + (0.278_393 + (0.230_389 + (0.000_972 + 0.078_108 * a) * a) * a) * a;
    t *= t;
    s - s / (t * t)
}

/// Standard deviation of the blur for a given half-width.
pub fn sigma(half_width: f32) -> f32 {
    half_width / (2.0 + 2.0 * 1_000.0 * half_width / 50.0)
}

/// Raw coverage at local coordinates `(along, across)` of a segment of
/// `length`; degenerate segments use a radial Gaussian.
pub fn coverage(local: [f32; 2], length: f32, half_width: f32) -> f32 {
    let sigma = sigma(half_width);
    let two_var = 2.0 * sigma * sigma;
    let [x, y] = local;
    if length < EPS {
        (-(x * x + y * y) / two_var).exp() / 2.0 / half_width.sqrt()
    } else {
        let along = erf_approx(x / SQRT_2 / sigma) - erf_approx((x - length) / SQRT_2 / sigma);
        along * (-y * y / two_var).exp() / 2.0 / length * half_width
    }
}

/// Tone curve applied to raw coverage.
pub fn shade(alpha: f32, half_width: f32, intensity: f32) -> f32 {
    let boost = (intensity - 0.4).max(0.0) * 0.7 - 1_000.0 * half_width / 500.0;
    alpha.max(0.0).powf(1.0 - boost) * (0.01 + (intensity * 3.0).min(0.99))
}

/// Per-trace drawing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceStyle {
    pub color: [f32; 3],
    pub half_width: f32,
    pub intensity: f32,
}

impl TraceStyle {
    pub fn new(color: [f32; 3], serial: bool) -> Self {
        Self {
            color,
            half_width: super::LINE_HALF_WIDTH,
            intensity: if serial { SERIAL_INTENSITY } else { AUDIO_INTENSITY },
        }
    }

    pub fn uniforms(&self) -> TraceUniforms {
        TraceUniforms {
            color: self.color,
            half_width: self.half_width,
            intensity: self.intensity,
            _padding: [0.0; 3],
        }
    }
}

/// Uniform block layout shared with `trace.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TraceUniforms {
    pub color: [f32; 3],
    pub half_width: f32,
    pub intensity: f32,
    _padding: [f32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: f32 = 0.002;

    #[test]
    fn erf_matches_reference_points() {
        assert_eq!(erf_approx(0.0), 0.0);
        assert!((erf_approx(0.5) - 0.520_5).abs() < 5e-4);
        assert!((erf_approx(1.0) - 0.842_7).abs() < 5e-4);
        assert!((erf_approx(-1.0) + 0.842_7).abs() < 5e-4);
        assert!((erf_approx(4.0) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn coverage_peaks_on_the_centre_line() {
        let length = 0.1;
        let centre = coverage([0.05, 0.0], length, W);
        let off_axis = coverage([0.05, W], length, W);
        let past_end = coverage([length + W, 0.0], length, W);
        assert!(centre > off_axis && off_axis > 0.0);
        assert!(past_end < centre * 0.05);
    }

    #[test]
    fn dot_coverage_is_radial() {
        let a = coverage([W * 0.3, 0.0], 0.0, W);
        let b = coverage([0.0, W * 0.3], 0.0, W);
        assert!((a - b).abs() < 1e-6);
        assert!(coverage([0.0, 0.0], 0.0, W) > a);
    }

    #[test]
    fn shorter_segments_are_brighter() {
        // Same energy spread over less length.
        let short = coverage([0.005, 0.0], 0.01, W);
        let long = coverage([0.05, 0.0], 0.1, W);
        assert!(short > long);
    }

    #[test]
    fn shade_is_monotonic_and_bounded() {
        let style = TraceStyle::new([0.2, 1.0, 0.3], true);
        let lo = shade(0.01, style.half_width, style.intensity);
        let hi = shade(0.5, style.half_width, style.intensity);
        assert!(lo < hi && hi <= 1.0);
        assert_eq!(shade(-1.0, W, AUDIO_INTENSITY), 0.0);
    }

    #[test]
    fn uniforms_match_the_shader_block() {
        assert_eq!(std::mem::size_of::<TraceUniforms>(), 32);
        let uniforms = TraceStyle::new([1.0, 0.5, 0.0], false).uniforms();
        assert_eq!(uniforms.intensity, AUDIO_INTENSITY);
        assert_eq!(uniforms.half_width, W);
        assert!(TRACE_SHADER_WGSL.contains("fn fs_main"));
    }
}
