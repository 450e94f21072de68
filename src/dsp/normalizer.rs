//! Maps raw channel samples into display coordinates.

use super::UNITS_PER_DIVISION;
use serde::{Deserialize, Serialize};

/// Channel input coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coupling {
    #[default]
    Dc,
    /// High-pass filtered before the ring buffer; see [`super::coupling`].
    Ac,
    #[serde(alias = "GND")]
    Ground,
}

/// Per-channel vertical settings for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    pub id: usize,
    pub enabled: bool,
    /// Vertical offset in display units.
    pub position_offset: f32,
    /// Divisions per raw unit.
    pub scale: f32,
    pub coupling: Coupling,
}

impl ChannelConfig {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            enabled: true,
            position_offset: 0.0,
            scale: 4.0,
            coupling: Coupling::Dc,
        }
    }

    #[inline]
    fn gain(&self) -> f32 {
        self.scale * UNITS_PER_DIVISION
    }

    /// Maps a raw level (e.g. a trigger level) into display units.
    #[inline]
    pub fn to_display(&self, raw: f32) -> f32 {
        raw * self.gain() + self.position_offset
    }

    /// Inverse of [`to_display`](Self::to_display); `None` for a zero scale.
    pub fn to_raw(&self, display: f32) -> Option<f32> {
        let gain = self.gain();
        (gain.abs() > f32::EPSILON).then(|| (display - self.position_offset) / gain)
    }
}

/// Writes the normalized form of `raw` into `out`, reusing its allocation.
///
/// Ground coupling yields zeros of the same length.
pub fn normalize_into(raw: &[f32], channel: &ChannelConfig, out: &mut Vec<f32>) {
    out.clear();
    if channel.coupling == Coupling::Ground {
        out.resize(raw.len(), 0.0);
        return;
    }

    let gain = channel.gain();
    let offset = channel.position_offset;
    out.extend(raw.iter().map(|&sample| sample * gain + offset));
}

pub fn normalize(raw: &[f32], channel: &ChannelConfig) -> Vec<f32> {
    let mut out = Vec::with_capacity(raw.len());
    normalize_into(raw, channel, &mut out);
    out
}
