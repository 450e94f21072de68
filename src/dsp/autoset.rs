//! One-shot vertical, timebase and trigger setup from a raw window.

use super::measure::SCAN_LEN;
use super::trigger::{Edge, TriggerConfig};
use super::UNITS_PER_DIVISION;

/// Signals smaller than this peak-to-peak are left alone.
pub const MIN_VPP: f32 = 0.02;
/// Target span of the signal in vertical divisions.
const TARGET_DIVISIONS: f32 = 4.0;
/// Periods shown across the screen after autoset.
const TARGET_PERIODS: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Autoset {
    pub scale: f32,
    pub position_offset: f32,
    /// `None` when no periodicity was detected; keep the current timebase.
    pub ms_per_division: Option<f32>,
    pub trigger: TriggerConfig,
}

pub fn autoset(raw: &[f32], channel: usize, sample_rate: f32) -> Option<Autoset> {
    let scan = &raw[..raw.len().min(SCAN_LEN)];
    if scan.is_empty() {
        return None;
    }

    let dc = scan.iter().sum::<f32>() / scan.len() as f32;
    let (min, max) = scan
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let vpp = max - min;
    if vpp < MIN_VPP {
        return None;
    }

    let scale = (TARGET_DIVISIONS / vpp).clamp(0.01, 1_000.0);
    let crossings = scan
        .windows(2)
        .filter(|pair| pair[0] - dc < 0.0 && pair[1] - dc >= 0.0)
        .count();
    let ms_per_division = (crossings > 1 && sample_rate > 0.0).then(|| {
        let frequency = crossings as f32 * sample_rate / scan.len() as f32;
        (1_000.0 / frequency * TARGET_PERIODS / 10.0).clamp(0.1, 1_000.0)
    });

    Some(Autoset {
        scale,
        position_offset: -dc * scale * UNITS_PER_DIVISION,
        ms_per_division,
        trigger: TriggerConfig {
            source_channel: channel,
            edge: Edge::Rising,
            level: dc,
            enabled: true,
        },
    })
}
