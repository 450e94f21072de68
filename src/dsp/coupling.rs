//! AC coupling: a one-pole DC-blocking high-pass applied ahead of the AC rings.

use super::Reconfigurable;

/// Corner frequency of the AC coupling filter.
pub const AC_CORNER_HZ: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct AcCoupler {
    sample_rate: f32,
    alpha: f32,
    prev_input: f32,
    prev_output: f32,
}

impl AcCoupler {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            alpha: Self::alpha_for(sample_rate),
            prev_input: 0.0,
            prev_output: 0.0,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn alpha_for(sample_rate: f32) -> f32 {
        if sample_rate <= 0.0 {
            return 1.0;
        }
        let rc = 1.0 / (core::f32::consts::TAU * AC_CORNER_HZ);
        let dt = 1.0 / sample_rate;
        rc / (rc + dt)
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.alpha * (self.prev_output + input - self.prev_input);
        self.prev_input = input;
        self.prev_output = output;
        output
    }

    pub fn reset(&mut self) {
        self.prev_input = 0.0;
        self.prev_output = 0.0;
    }
}

impl Reconfigurable<f32> for AcCoupler {
    fn update_config(&mut self, sample_rate: f32) {
        if (self.sample_rate - sample_rate).abs() > f32::EPSILON {
            self.sample_rate = sample_rate;
            self.alpha = Self::alpha_for(sample_rate);
            self.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    #[test]
    fn removes_dc_offset() {
        let mut coupler = AcCoupler::new(48_000.0);
        let mut last = 0.0;
        for _ in 0..48_000 {
            last = coupler.process(1.0);
        }
        assert!(last.abs() < 1e-3, "residual DC {last}");
    }

    #[test]
    fn passes_audio_band_signal() {
        let rate = 48_000.0;
        let mut coupler = AcCoupler::new(rate);
        let samples: Vec<f32> = (0..rate as usize)
            .map(|n| (TAU * 1_000.0 * n as f32 / rate).sin() + 0.5)
            .map(|x| coupler.process(x))
            .collect();
        let tail = &samples[samples.len() - 4_800..];
        let peak = tail.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
        let mean = tail.iter().sum::<f32>() / tail.len() as f32;
        assert!((peak - 1.0).abs() < 0.02, "peak {peak}");
        assert!(mean.abs() < 0.01, "mean {mean}");
    }

    #[test]
    fn reconfigure_resets_state() {
        let mut coupler = AcCoupler::new(1_000.0);
        coupler.process(1.0);
        coupler.update_config(2_000.0);
        assert_eq!(coupler.sample_rate(), 2_000.0);
        assert_eq!(coupler.process(0.0), 0.0);
    }
}
