use super::ChannelBank;
use crate::audio::monitor::MonitorTap;
use crate::dsp::Reconfigurable;
use crate::dsp::coupling::AcCoupler;
use crate::protocol::{FrameSink, channel_value};
use std::sync::Arc;

/// Fans decoded frames out to the channel rings and, optionally, the monitor.
///
/// Owned by the read thread; it is the only writer of its bank.
#[derive(Debug)]
pub struct FrameRouter {
    bank: Arc<ChannelBank>,
    couplers: Vec<AcCoupler>,
    monitor: Option<MonitorTap>,
    frames: u64,
}

impl FrameRouter {
    pub fn new(bank: Arc<ChannelBank>, sample_rate: f32) -> Self {
        let couplers = (0..bank.channel_count())
            .map(|_| AcCoupler::new(sample_rate))
            .collect();
        Self {
            bank,
            couplers,
            monitor: None,
            frames: 0,
        }
    }

    pub fn with_monitor(mut self, monitor: MonitorTap) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn bank(&self) -> &Arc<ChannelBank> {
        &self.bank
    }

    pub fn frames_routed(&self) -> u64 {
        self.frames
    }

    /// Retunes the AC filters, e.g. after a baud rate change.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        for coupler in &mut self.couplers {
            coupler.update_config(sample_rate);
        }
    }

    /// Clears history and filter state before a new source starts writing.
    pub fn reset(&mut self) {
        self.bank.clear();
        for coupler in &mut self.couplers {
            coupler.reset();
        }
    }
}

impl FrameSink for FrameRouter {
    fn push_frame(&mut self, values: &[f32]) {
        for (channel, coupler) in self.couplers.iter_mut().enumerate() {
            let raw = channel_value(values, channel);
            self.bank.push(channel, raw, coupler.process(raw));
        }
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.offer(values);
        }
        self.frames += 1;
    }
}
