//! Per-frame pipeline: pull windows, normalize, trigger, analyse, triangulate.

use crate::dsp::Reconfigurable;
use crate::dsp::measure::{Measurement, measure};
use crate::dsp::normalizer::{ChannelConfig, normalize_into};
use crate::dsp::spectrum::{DEFAULT_TRANSFORM_SIZE, SpectrumAnalyzer, SpectrumConfig};
use crate::dsp::trigger::{TriggerConfig, TriggerHold, TriggerLocator, TriggerStatus};
use crate::render::{FadeLut, GeometryBuilder, TraceVertex};
use crate::source::CaptureDevice;
use crate::timebase::ViewWindow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Amplitude against time (Y-T).
    #[default]
    Time,
    /// First channel against second (X-Y).
    Xy,
}

/// Everything the frame pipeline reads; the core never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameConfig {
    pub channels: Vec<ChannelConfig>,
    pub trigger: TriggerConfig,
    pub ms_per_division: f32,
    pub horizontal_percent: f32,
    pub spectrum_enabled: bool,
    pub transform_size: usize,
    pub running: bool,
    pub sample_rate: f32,
    pub mode: DisplayMode,
    /// Adds a CH1 + CH2 trace in time mode.
    pub math: bool,
    /// Canvas height / width, for square XY figures.
    pub aspect: f32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            channels: vec![ChannelConfig::new(0), ChannelConfig::new(1)],
            trigger: TriggerConfig::default(),
            ms_per_division: 5.0,
            horizontal_percent: 50.0,
            spectrum_enabled: false,
            transform_size: DEFAULT_TRANSFORM_SIZE,
            running: true,
            sample_rate: crate::timebase::AUDIO_SAMPLE_RATE,
            mode: DisplayMode::Time,
            math: false,
            aspect: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelFrame {
    pub id: usize,
    pub enabled: bool,
    /// Latest raw window, oldest first.
    pub raw: Vec<f32>,
    /// `raw` in display units.
    pub display: Vec<f32>,
    /// Empty while the spectrum is disabled.
    pub spectrum: Vec<f32>,
    pub measurement: Measurement,
    pub vertices: Vec<TraceVertex>,
}

/// Output of one frame, owned by the processor and reused between frames.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub status: TriggerStatus,
    pub trigger_index: Option<f64>,
    pub view: ViewWindow,
    pub channels: Vec<ChannelFrame>,
    pub math: Vec<TraceVertex>,
    pub xy: Vec<TraceVertex>,
}

impl FrameSnapshot {
    fn empty(window_len: usize) -> Self {
        Self {
            status: TriggerStatus::Stop,
            trigger_index: None,
            view: ViewWindow::new(None, 50.0, window_len, window_len),
            channels: Vec::new(),
            math: Vec::new(),
            xy: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct FrameProcessor {
    window_len: usize,
    locator: TriggerLocator,
    hold: TriggerHold,
    builder: GeometryBuilder,
    lut: FadeLut,
    analyzers: Vec<SpectrumAnalyzer>,
    math_display: Vec<f32>,
    captured: bool,
    snapshot: FrameSnapshot,
}

impl FrameProcessor {
    pub fn new(window_len: usize) -> Self {
        let window_len = window_len.max(1);
        Self {
            window_len,
            locator: TriggerLocator::new(),
            hold: TriggerHold::default(),
            builder: GeometryBuilder::default(),
            lut: FadeLut::default(),
            analyzers: Vec::new(),
            math_display: Vec::new(),
            captured: false,
            snapshot: FrameSnapshot::empty(window_len),
        }
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    pub fn set_half_width(&mut self, half_width: f32) {
        self.builder.set_half_width(half_width);
    }

    /// Runs the pipeline once. While stopped the last captured windows are
    /// re-rendered with the current vertical settings.
    pub fn process<D>(&mut self, device: &D, config: &FrameConfig) -> &FrameSnapshot
    where
        D: CaptureDevice + ?Sized,
    {
        let refresh = config.running || !self.captured;
        self.sync_channels(config);

        for (frame, channel) in self.snapshot.channels.iter_mut().zip(&config.channels) {
            frame.id = channel.id;
            frame.enabled = channel.enabled;
            if refresh {
                frame.raw.resize(self.window_len, 0.0);
                if !device.pull(channel.id, channel.coupling, &mut frame.raw) {
                    frame.raw.fill(0.0);
                }
            }
            normalize_into(&frame.raw, channel, &mut frame.display);
        }
        self.captured = true;

        let trigger = &config.trigger;
        let (locator, snapshot) = (&self.locator, &self.snapshot);
        let index = self.hold.update(trigger.enabled, config.running, || {
            let (frame, channel) = snapshot
                .channels
                .iter()
                .zip(&config.channels)
                .find(|(_, channel)| channel.id == trigger.source_channel)?;
            locator.locate(&frame.display, trigger.edge, channel.to_display(trigger.level))
        });

        let points = ViewWindow::points_to_show(config.ms_per_division, config.sample_rate);
        let view = ViewWindow::new(index, config.horizontal_percent, self.window_len, points);
        self.snapshot.trigger_index = index;
        self.snapshot.status = TriggerStatus::resolve(config.running, trigger.enabled, index);
        self.snapshot.view = view;

        self.analyse(config);
        self.triangulate(config);
        &self.snapshot
    }

    fn sync_channels(&mut self, config: &FrameConfig) {
        let count = config.channels.len();
        if self.snapshot.channels.len() != count {
            self.snapshot.channels.resize_with(count, ChannelFrame::default);
            self.captured = false;
        }
        let spectrum = SpectrumConfig {
            transform_size: config.transform_size,
        };
        self.analyzers
            .resize_with(count, || SpectrumAnalyzer::new(spectrum));
        for analyzer in &mut self.analyzers {
            analyzer.update_config(spectrum);
        }
    }

    fn analyse(&mut self, config: &FrameConfig) {
        for ((frame, channel), analyzer) in self
            .snapshot
            .channels
            .iter_mut()
            .zip(&config.channels)
            .zip(&mut self.analyzers)
        {
            frame.measurement = if channel.enabled {
                measure(&frame.raw, channel.coupling, config.sample_rate)
            } else {
                Measurement::default()
            };
            if config.spectrum_enabled && channel.enabled {
                analyzer.analyze(&frame.raw, &mut frame.spectrum);
            } else {
                frame.spectrum.clear();
            }
        }
    }

    fn triangulate(&mut self, config: &FrameConfig) {
        let snapshot = &mut self.snapshot;
        let builder = &mut self.builder;
        snapshot.math.clear();
        snapshot.xy.clear();

        match config.mode {
            DisplayMode::Time => {
                let view = snapshot.view;
                for frame in &mut snapshot.channels {
                    frame.vertices.clear();
                    if frame.enabled {
                        frame
                            .vertices
                            .extend_from_slice(builder.build_time_domain(&frame.display, &view));
                    }
                }
                if let (true, [first, second, ..]) = (config.math, snapshot.channels.as_slice()) {
                    self.math_display.clear();
                    self.math_display
                        .extend(first.display.iter().zip(&second.display).map(|(a, b)| a + b));
                    snapshot
                        .math
                        .extend_from_slice(builder.build_time_domain(&self.math_display, &view));
                }
            }
            DisplayMode::Xy => {
                for frame in &mut snapshot.channels {
                    frame.vertices.clear();
                }
                if let [first, second, ..] = snapshot.channels.as_slice() {
                    let verts = builder.build_xy(&first.display, &second.display, config.aspect, &self.lut);
                    snapshot.xy.extend_from_slice(verts);
                }
            }
        }
    }
}

impl Reconfigurable<usize> for FrameProcessor {
    /// Changes the window length; the next frame re-pulls every channel.
    fn update_config(&mut self, window_len: usize) {
        self.window_len = window_len.max(1);
        self.captured = false;
        self.hold = TriggerHold::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::normalizer::Coupling;
    use crate::dsp::trigger::Edge;
    use crate::source::ChannelBank;
    use std::f32::consts::TAU;

    const WINDOW: usize = 8_192;

    fn filled_bank(period: f32) -> ChannelBank {
        let bank = ChannelBank::new(2, WINDOW);
        for n in 0..WINDOW {
            let phase = TAU * n as f32 / period;
            bank.push(0, 0.5 * phase.sin(), 0.5 * phase.sin());
            bank.push(1, 0.25 * phase.cos() + 1.0, 0.25 * phase.cos());
        }
        bank
    }

    fn triggered_config() -> FrameConfig {
        FrameConfig {
            trigger: TriggerConfig {
                source_channel: 0,
                edge: Edge::Rising,
                level: 0.0,
                enabled: true,
            },
            ms_per_division: 1.0,
            sample_rate: 48_000.0,
            ..FrameConfig::default()
        }
    }

    #[test]
    fn triggered_frame_anchors_view_on_crossing() {
        let bank = filled_bank(200.0);
        let mut processor = FrameProcessor::new(WINDOW);
        let snapshot = processor.process(&bank, &triggered_config());

        assert_eq!(snapshot.status, TriggerStatus::Triggered);
        let index = snapshot.trigger_index.expect("trigger");
        // Rising zero crossings of the sine sit on multiples of the period.
        assert!((index / 200.0 - (index / 200.0).round()).abs() < 1e-3, "index {index}");
        assert!(snapshot.view.anchor_ndc().abs() < 1e-6);
        assert_eq!(snapshot.view.points, 480);
        assert!(snapshot.channels.iter().all(|c| !c.vertices.is_empty()));
        assert!(snapshot.math.is_empty() && snapshot.xy.is_empty());
    }

    #[test]
    fn trigger_level_follows_channel_scaling() {
        let bank = filled_bank(200.0);
        let mut config = triggered_config();
        config.channels[0].scale = 2.0;
        config.channels[0].position_offset = 0.3;
        config.trigger.level = 0.25;
        let mut processor = FrameProcessor::new(WINDOW);
        let snapshot = processor.process(&bank, &config);

        let index = snapshot.trigger_index.expect("trigger");
        let before = snapshot.channels[0].raw[index.floor() as usize];
        let after = snapshot.channels[0].raw[index.ceil() as usize];
        assert!(before <= 0.25 + 1e-3 && after >= 0.25 - 1e-3);
    }

    #[test]
    fn unreachable_level_reports_auto() {
        let bank = filled_bank(200.0);
        let mut config = triggered_config();
        config.trigger.level = 5.0;
        let mut processor = FrameProcessor::new(WINDOW);
        let snapshot = processor.process(&bank, &config);
        assert_eq!(snapshot.status, TriggerStatus::Auto);
        assert_eq!(snapshot.view.anchor, WINDOW as f64 / 2.0);
    }

    #[test]
    fn stopped_frames_keep_the_captured_window() {
        let bank = filled_bank(200.0);
        let mut processor = FrameProcessor::new(WINDOW);
        let mut config = triggered_config();
        let first = processor.process(&bank, &config).trigger_index;

        config.running = false;
        bank.push(0, 9.0, 9.0);
        let snapshot = processor.process(&bank, &config);
        assert_eq!(snapshot.status, TriggerStatus::Stop);
        assert_eq!(snapshot.trigger_index, first);
        assert!(snapshot.channels[0].raw.iter().all(|&s| s < 1.0));

        config.running = true;
        let snapshot = processor.process(&bank, &config);
        assert_eq!(snapshot.channels[0].raw[WINDOW - 1], 9.0);
    }

    #[test]
    fn ground_and_disabled_channels() {
        let bank = filled_bank(200.0);
        let mut config = FrameConfig {
            sample_rate: 48_000.0,
            ..FrameConfig::default()
        };
        config.channels[0].coupling = Coupling::Ground;
        config.channels[1].enabled = false;
        let mut processor = FrameProcessor::new(WINDOW);
        let snapshot = processor.process(&bank, &config);

        assert_eq!(snapshot.status, TriggerStatus::Free);
        assert!(snapshot.channels[0].display.iter().all(|&s| s == 0.0));
        assert!(snapshot.channels[1].vertices.is_empty());
        assert_eq!(snapshot.channels[1].measurement, Measurement::default());
    }

    #[test]
    fn ac_coupling_reads_the_filtered_ring() {
        let bank = filled_bank(200.0);
        let mut config = triggered_config();
        config.channels[1].coupling = Coupling::Ac;
        let mut processor = FrameProcessor::new(WINDOW);
        let snapshot = processor.process(&bank, &config);
        let mean: f32 = snapshot.channels[1].raw.iter().sum::<f32>() / WINDOW as f32;
        assert!(mean.abs() < 0.01, "mean {mean}");
    }

    #[test]
    fn spectrum_and_measurements() {
        let bank = filled_bank(64.0);
        let config = FrameConfig {
            spectrum_enabled: true,
            transform_size: 1_024,
            ..triggered_config()
        };
        let mut processor = FrameProcessor::new(WINDOW);
        let snapshot = processor.process(&bank, &config);
        let channel = &snapshot.channels[0];

        assert_eq!(channel.spectrum.len(), 512);
        let (bin, _) = crate::dsp::spectrum::peak_bin(&channel.spectrum).expect("peak");
        assert_eq!(bin, 16);
        assert!((channel.measurement.vpp - 1.0).abs() < 0.01);
        let hz = channel.measurement.frequency_hz.expect("frequency");
        assert!((hz - 750.0).abs() < 15.0, "hz {hz}");
    }

    #[test]
    fn math_and_xy_traces() {
        let bank = filled_bank(200.0);
        let mut config = FrameConfig {
            math: true,
            sample_rate: 48_000.0,
            ms_per_division: 1.0,
            ..FrameConfig::default()
        };
        let mut processor = FrameProcessor::new(WINDOW);
        let math_len = processor.process(&bank, &config).math.len();
        assert_eq!(math_len, processor.snapshot().channels[0].vertices.len());

        config.mode = DisplayMode::Xy;
        let snapshot = processor.process(&bank, &config);
        assert!(!snapshot.xy.is_empty());
        assert!(snapshot.channels.iter().all(|c| c.vertices.is_empty()));
    }

    #[test]
    fn missing_device_channel_reads_silence() {
        let bank = ChannelBank::new(1, WINDOW);
        let mut config = FrameConfig::default();
        config.channels[1].id = 7;
        let mut processor = FrameProcessor::new(1_024);
        let snapshot = processor.process(&bank, &config);
        assert!(snapshot.channels[1].raw.iter().all(|&s| s == 0.0));
        assert_eq!(snapshot.channels[1].raw.len(), 1_024);
    }
}
