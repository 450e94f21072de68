//! Radix-2 magnitude spectrum of a channel's trailing window.

use super::Reconfigurable;
use rustfft::num_complex::Complex32;

pub const DEFAULT_TRANSFORM_SIZE: usize = 8_192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectrumConfig {
    /// Rounded up to a power of two (at least 2).
    pub transform_size: usize,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            transform_size: DEFAULT_TRANSFORM_SIZE,
        }
    }
}

/// In-place decimation-in-time transform with precomputed tables.
pub struct SpectrumAnalyzer {
    size: usize,
    reverse: Vec<u32>,
    // twiddles[j] = exp(-2πi·j/size) for j in 0..size/2
    twiddles: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl SpectrumAnalyzer {
    pub fn new(config: SpectrumConfig) -> Self {
        let mut analyzer = Self {
            size: 0,
            reverse: Vec::new(),
            twiddles: Vec::new(),
            scratch: Vec::new(),
        };
        analyzer.rebuild(config.transform_size);
        analyzer
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bin_count(&self) -> usize {
        self.size / 2
    }

    /// Frequency of bin `k` for a given sample rate.
    pub fn bin_frequency(&self, bin: usize, sample_rate: f32) -> f32 {
        bin as f32 * sample_rate / self.size as f32
    }

    fn rebuild(&mut self, requested: usize) {
        let size = requested.max(2).next_power_of_two();
        if size == self.size {
            return;
        }
        let bits = size.trailing_zeros();

        self.size = size;
        self.reverse = (0..size as u32)
            .map(|i| i.reverse_bits() >> (u32::BITS - bits))
            .collect();
        self.twiddles = (0..size / 2)
            .map(|j| {
                let angle = -std::f64::consts::TAU * j as f64 / size as f64;
                Complex32::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect();
        self.scratch = vec![Complex32::default(); size];
    }

    /// Writes `size / 2` magnitudes into `out`.
    ///
    /// Uses the trailing `size` samples of `window`; a shorter window is
    /// zero padded at the end. `out` is only resized when its length differs.
    pub fn analyze(&mut self, window: &[f32], out: &mut Vec<f32>) {
        let n = self.size;
        let tail = &window[window.len().saturating_sub(n)..];

        for (i, &rev) in self.reverse.iter().enumerate() {
            let re = tail.get(rev as usize).copied().unwrap_or(0.0);
            self.scratch[i] = Complex32::new(re, 0.0);
        }

        let mut half = 1;
        while half < n {
            let stride = n / (half * 2);
            for block in self.scratch.chunks_exact_mut(half * 2) {
                let (lo, hi) = block.split_at_mut(half);
                for (j, (a, b)) in lo.iter_mut().zip(hi.iter_mut()).enumerate() {
                    let t = *b * self.twiddles[j * stride];
                    *b = *a - t;
                    *a += t;
                }
            }
            half *= 2;
        }

        let bins = n / 2;
        if out.len() != bins {
            out.resize(bins, 0.0);
        }
        let scale = 1.0 / n as f32;
        for (dst, value) in out.iter_mut().zip(&self.scratch) {
            *dst = value.norm() * scale;
        }
    }
}

impl Reconfigurable<SpectrumConfig> for SpectrumAnalyzer {
    fn update_config(&mut self, config: SpectrumConfig) {
        self.rebuild(config.transform_size);
    }
}

/// Index and magnitude of the strongest non-DC bin.
pub fn peak_bin(magnitudes: &[f32]) -> Option<(usize, f32)> {
    magnitudes
        .iter()
        .copied()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}
