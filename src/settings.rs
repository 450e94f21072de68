//! Persisted scope settings (`settings.json`) and their per-frame snapshot.

use crate::dsp::normalizer::{ChannelConfig, Coupling};
use crate::dsp::spectrum::DEFAULT_TRANSFORM_SIZE;
use crate::dsp::trigger::TriggerConfig;
use crate::frame::{DisplayMode, FrameConfig};
use crate::protocol::ProtocolKind;
use crate::source::serial::DEFAULT_BAUD;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::PathBuf};
use tracing::{debug, warn};

const MIN_TRANSFORM: usize = 256;
const MAX_TRANSFORM: usize = 65_536;

pub fn config_dir() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("openscope")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub enabled: bool,
    pub position: f32,
    pub scale: f32,
    pub coupling: Coupling,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        let channel = ChannelConfig::new(0);
        Self {
            enabled: channel.enabled,
            position: channel.position_offset,
            scale: channel.scale,
            coupling: channel.coupling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub port: Option<String>,
    pub baud: u32,
    pub protocol: ProtocolKind,
    /// 0..=100 knob; see [`crate::source::wav::playback_speed`].
    pub wav_speed: f32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud: DEFAULT_BAUD,
            protocol: ProtocolKind::Binary,
            wav_speed: 90.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    pub channels: Vec<ChannelSettings>,
    pub trigger: TriggerConfig,
    pub ms_per_division: f32,
    pub horizontal_percent: f32,
    pub spectrum_enabled: bool,
    pub transform_size: usize,
    pub mode: DisplayMode,
    pub math: bool,
    pub source: SourceSettings,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            channels: vec![ChannelSettings::default(); 2],
            trigger: TriggerConfig::default(),
            ms_per_division: 5.0,
            horizontal_percent: 50.0,
            spectrum_enabled: false,
            transform_size: DEFAULT_TRANSFORM_SIZE,
            mode: DisplayMode::Time,
            math: false,
            source: SourceSettings::default(),
        }
    }
}

impl ScopeSettings {
    /// Repairs values a hand-edited file may carry.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        for channel in &mut self.channels {
            if !(channel.scale.is_finite() && channel.scale > 0.0) {
                channel.scale = ChannelSettings::default().scale;
            }
            if !channel.position.is_finite() {
                channel.position = 0.0;
            }
        }
        if !self.trigger.level.is_finite() {
            self.trigger.level = 0.0;
        }
        if !(self.ms_per_division.is_finite() && self.ms_per_division > 0.0) {
            self.ms_per_division = defaults.ms_per_division;
        }
        self.horizontal_percent = if self.horizontal_percent.is_finite() {
            self.horizontal_percent.clamp(0.0, 100.0)
        } else {
            defaults.horizontal_percent
        };
        self.transform_size = self
            .transform_size
            .clamp(MIN_TRANSFORM, MAX_TRANSFORM)
            .next_power_of_two();
        if self.source.baud == 0 {
            self.source.baud = DEFAULT_BAUD;
        }
        self.source.wav_speed = self.source.wav_speed.clamp(0.0, 100.0);
    }

    pub fn to_frame_config(&self, sample_rate: f32, running: bool) -> FrameConfig {
        let channels = self
            .channels
            .iter()
            .enumerate()
            .map(|(id, channel)| ChannelConfig {
                id,
                enabled: channel.enabled,
                position_offset: channel.position,
                scale: channel.scale,
                coupling: channel.coupling,
            })
            .collect();

        FrameConfig {
            channels,
            trigger: self.trigger,
            ms_per_division: self.ms_per_division,
            horizontal_percent: self.horizontal_percent,
            spectrum_enabled: self.spectrum_enabled,
            transform_size: self.transform_size,
            running,
            sample_rate,
            mode: self.mode,
            math: self.math,
            ..FrameConfig::default()
        }
    }
}

#[derive(Debug)]
pub struct SettingsManager {
    path: PathBuf,
    data: ScopeSettings,
}

impl SettingsManager {
    pub fn load_or_default() -> Self {
        Self::load_from(config_dir().join("settings.json"))
    }

    pub fn load_from(path: PathBuf) -> Self {
        let mut data: ScopeSettings = fs::read_to_string(&path)
            .ok()
            .and_then(|s| {
                serde_json::from_str(&s)
                    .map_err(|e| warn!("[settings] parse error {path:?}: {e}"))
                    .ok()
            })
            .unwrap_or_default();
        data.sanitize();
        Self { path, data }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn settings(&self) -> &ScopeSettings {
        &self.data
    }

    pub fn update<F: FnOnce(&mut ScopeSettings) -> R, R>(&mut self, mutate: F) -> R {
        let result = mutate(&mut self.data);
        self.data.sanitize();
        result
    }

    /// Writes a sibling temp file, then renames it over the target.
    pub fn save(&self) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.data).map_err(io::Error::other)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &json).and_then(|()| fs::rename(&temp_path, &self.path))?;
        debug!("[settings] saved {:?}", self.path);
        Ok(())
    }
}
