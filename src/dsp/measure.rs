//! Peak-to-peak and zero-crossing frequency readouts.

use super::normalizer::Coupling;
use super::{GRID_DIVISIONS_X, UNITS_PER_DIVISION};

/// Number of leading window samples inspected per measurement.
pub const SCAN_LEN: usize = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement {
    /// Peak-to-peak amplitude in raw units.
    pub vpp: f32,
    /// `None` when fewer than two rising zero crossings were seen.
    pub frequency_hz: Option<f32>,
}

/// Measures the first [`SCAN_LEN`] samples of a raw window.
///
/// AC coupling removes the mean before crossings are counted.
pub fn measure(raw: &[f32], coupling: Coupling, sample_rate: f32) -> Measurement {
    let scan = &raw[..raw.len().min(SCAN_LEN)];
    if scan.is_empty() {
        return Measurement::default();
    }

    let offset = match coupling {
        Coupling::Ac => scan.iter().sum::<f32>() / scan.len() as f32,
        Coupling::Dc | Coupling::Ground => 0.0,
    };

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut crossings = 0usize;
    let mut prev = scan[0] - offset;
    for &sample in scan {
        let value = sample - offset;
        min = min.min(value);
        max = max.max(value);
        if prev < 0.0 && value >= 0.0 {
            crossings += 1;
        }
        prev = value;
    }

    let frequency_hz = (crossings > 1 && sample_rate > 0.0)
        .then(|| crossings as f32 * sample_rate / scan.len() as f32);

    Measurement {
        vpp: max - min,
        frequency_hz,
    }
}

/// Cursor positions in NDC: two voltage lines and two time lines.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cursors {
    pub v1: f32,
    pub v2: f32,
    pub t1: f32,
    pub t2: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorReadout {
    /// Voltage difference in raw units.
    pub delta_v: f32,
    pub delta_t_ms: f32,
    /// `None` when both time cursors coincide.
    pub inverse_hz: Option<f32>,
}

impl Cursors {
    pub fn readout(&self, scale: f32, ms_per_division: f32) -> CursorReadout {
        let delta_v = (self.v1 - self.v2).abs() / UNITS_PER_DIVISION / scale.max(f32::EPSILON);
        let delta_t_ms = (self.t1 - self.t2).abs() / (2.0 / GRID_DIVISIONS_X) * ms_per_division;
        CursorReadout {
            delta_v,
            delta_t_ms,
            inverse_hz: (delta_t_ms > 0.0).then(|| 1_000.0 / delta_t_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    #[test]
    fn measures_sine_amplitude_and_frequency() {
        let rate = 96_000.0;
        let freq = 1_200.0;
        let raw: Vec<f32> = (0..SCAN_LEN * 2)
            .map(|n| 0.8 * (TAU * freq * n as f32 / rate).sin())
            .collect();
        let m = measure(&raw, Coupling::Dc, rate);
        assert!((m.vpp - 1.6).abs() < 0.01, "vpp {}", m.vpp);
        let hz = m.frequency_hz.expect("frequency");
        // 8000 samples hold exactly 100 periods; the first crossing sits on sample 0.
        assert!((hz - freq).abs() <= 2.0 * rate / SCAN_LEN as f32, "hz {hz}");
    }

    #[test]
    fn ac_coupling_ignores_offset() {
        let rate = 8_000.0;
        let raw: Vec<f32> = (0..SCAN_LEN)
            .map(|n| 2.0 + 0.5 * (TAU * 100.0 * n as f32 / rate).sin())
            .collect();
        assert!(measure(&raw, Coupling::Dc, rate).frequency_hz.is_none());
        let ac = measure(&raw, Coupling::Ac, rate);
        assert!(ac.frequency_hz.is_some());
        assert!((ac.vpp - 1.0).abs() < 0.01);
    }

    #[test]
    fn empty_and_flat_windows() {
        assert_eq!(measure(&[], Coupling::Dc, 1_000.0), Measurement::default());
        let flat = measure(&[0.25; 100], Coupling::Dc, 1_000.0);
        assert_eq!(flat.vpp, 0.0);
        assert!(flat.frequency_hz.is_none());
    }

    #[test]
    fn cursor_deltas_follow_scale_and_timebase() {
        let cursors = Cursors {
            v1: 0.5,
            v2: -0.5,
            t1: -0.2,
            t2: 0.2,
        };
        let readout = cursors.readout(2.0, 5.0);
        // One NDC unit is four divisions; at 2x scale that is two raw units.
        assert!((readout.delta_v - 2.0).abs() < 1e-6);
        // 0.4 NDC is two horizontal divisions.
        assert!((readout.delta_t_ms - 10.0).abs() < 1e-5);
        assert!((readout.inverse_hz.unwrap() - 100.0).abs() < 1e-3);

        let coincident = Cursors::default().readout(1.0, 1.0);
        assert_eq!(coincident.delta_t_ms, 0.0);
        assert!(coincident.inverse_hz.is_none());
    }
}
