//! Device-side rendering of scheduled blocks.

use super::output::OutputCommand;
use super::scheduler::AudioBlock;
use async_channel::Receiver;
use std::collections::VecDeque;

/// Exponential approach of the output gain to a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    from: f32,
    target: f32,
    start: f64,
    time_constant: f64,
}

impl GainRamp {
    pub fn constant(gain: f32) -> Self {
        Self {
            from: gain,
            target: gain,
            start: 0.0,
            time_constant: 0.0,
        }
    }

    pub fn value_at(&self, time: f64) -> f32 {
        if time <= self.start {
            return self.from;
        }
        if self.time_constant <= 0.0 {
            return self.target;
        }
        let decay = (-(time - self.start) / self.time_constant).exp() as f32;
        self.target + (self.from - self.target) * decay
    }

    /// Starts a new ramp from wherever the current one is at `at`.
    pub fn retarget(&mut self, target: f32, at: f64, time_constant: f64) {
        *self = Self {
            from: self.value_at(at),
            target,
            start: at,
            time_constant,
        };
    }
}

/// Gain ramps waiting for their start time, applied in `at` order.
#[derive(Debug, Clone)]
pub struct GainSchedule {
    current: GainRamp,
    pending: VecDeque<GainRamp>,
}

impl GainSchedule {
    pub fn new(gain: f32) -> Self {
        Self {
            current: GainRamp::constant(gain),
            pending: VecDeque::new(),
        }
    }

    /// Queues a ramp; ramps sharing a start time keep arrival order.
    pub fn push(&mut self, target: f32, at: f64, time_constant: f64) {
        let ramp = GainRamp {
            from: target,
            target,
            start: at,
            time_constant,
        };
        let index = self
            .pending
            .iter()
            .position(|queued| queued.start > at)
            .unwrap_or(self.pending.len());
        self.pending.insert(index, ramp);
    }

    pub fn value_at(&self, time: f64) -> f32 {
        let mut ramp = self.current;
        for next in self.pending.iter().take_while(|next| next.start <= time) {
            ramp.retarget(next.target, next.start, next.time_constant);
        }
        ramp.value_at(time)
    }

    /// Folds every ramp that has started by `time` into the current one.
    pub fn advance(&mut self, time: f64) {
        while let Some(next) = self.pending.front().copied().filter(|n| n.start <= time) {
            self.current
                .retarget(next.target, next.start, next.time_constant);
            self.pending.pop_front();
        }
    }
}

/// Renders queued blocks into device buffers by start time.
#[derive(Debug)]
pub struct PlaybackMixer {
    commands: Receiver<OutputCommand>,
    blocks: VecDeque<AudioBlock>,
    gain: GainSchedule,
}

impl PlaybackMixer {
    /// Output starts silent until the scheduler ramps it up.
    pub fn new(commands: Receiver<OutputCommand>) -> Self {
        Self {
            commands,
            blocks: VecDeque::new(),
            gain: GainSchedule::new(0.0),
        }
    }

    pub fn queued_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn gain_at(&self, time: f64) -> f32 {
        self.gain.value_at(time)
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                OutputCommand::Block(block) if !block.is_empty() => {
                    let at = self
                        .blocks
                        .iter()
                        .position(|queued| queued.start_time > block.start_time)
                        .unwrap_or(self.blocks.len());
                    self.blocks.insert(at, block);
                }
                OutputCommand::Block(_) => {}
                OutputCommand::Gain {
                    target,
                    at,
                    time_constant,
                } => self.gain.push(target, at, time_constant),
            }
        }
    }

    /// Fills `left`/`right` with audio starting at device time `start_time`.
    ///
    /// Gaps between blocks render as silence; samples are picked by nearest
    /// preceding index.
    pub fn render(
        &mut self,
        start_time: f64,
        device_rate: f32,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        self.drain_commands();
        let step = 1.0 / f64::from(device_rate.max(1.0));

        for (n, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let time = start_time + n as f64 * step;
            while self.blocks.front().is_some_and(|b| b.end_time() <= time) {
                self.blocks.pop_front();
            }

            self.gain.advance(time);
            let (mut out_l, mut out_r) = (0.0, 0.0);
            if let Some(block) = self.blocks.front().filter(|b| b.start_time <= time) {
                let index = ((time - block.start_time) * f64::from(block.sample_rate)) as usize;
                let index = index.min(block.len() - 1);
                let gain = self.gain.value_at(time);
                out_l = block.left[index] * gain;
                out_r = block.right[index] * gain;
            }
            *l = out_l;
            *r = out_r;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::output_queue;
    use crate::audio::scheduler::AudioOutput;

    // Binary-exact times keep block boundaries on sample edges.
    const RATE: f32 = 128.0;

    fn block(start_time: f64, value: f32) -> AudioBlock {
        AudioBlock {
            left: vec![value; 16],
            right: vec![-value; 16],
            sample_rate: RATE,
            start_time,
        }
    }

    #[test]
    fn gain_ramp_approaches_target() {
        let mut ramp = GainRamp::constant(1.0);
        ramp.retarget(0.0, 1.0, 0.02);
        assert_eq!(ramp.value_at(0.5), 1.0);
        assert!((ramp.value_at(1.02) - (-1.0f32).exp()).abs() < 1e-5);
        assert!(ramp.value_at(1.2) < 1e-4);

        // Retargeting mid-ramp continues from the current value.
        let midway = ramp.value_at(1.01);
        ramp.retarget(1.0, 1.01, 0.02);
        assert!((ramp.value_at(1.01) - midway).abs() < 1e-6);
    }

    #[test]
    fn schedule_hands_over_between_ramps() {
        let mut gain = GainSchedule::new(1.0);
        gain.push(1.0, 0.5, 0.1);
        gain.push(0.0, 0.1, 0.1);

        assert_eq!(gain.value_at(0.05), 1.0);
        assert!((gain.value_at(0.2) - (-1.0f32).exp()).abs() < 1e-5);
        let at_handover = gain.value_at(0.5);
        assert!(at_handover < 0.02);

        gain.advance(0.3);
        assert!((gain.value_at(0.2) - (-1.0f32).exp()).abs() < 1e-5);
        gain.advance(0.6);
        assert!((gain.value_at(0.5) - at_handover).abs() < 1e-6);
        assert!(gain.value_at(1.5) > 0.99);
    }

    #[test]
    fn renders_blocks_at_their_start_time() {
        let (mut output, receiver) = output_queue();
        output.ramp_gain(1.0, 0.0, 0.0);
        output.schedule(block(0.25, 0.5));
        output.schedule(block(0.125, 0.25));

        let mut mixer = PlaybackMixer::new(receiver);
        let mut left = [9.0; 64];
        let mut right = [9.0; 64];
        mixer.render(0.0, RATE, &mut left, &mut right);

        assert!(left[..16].iter().all(|&s| s == 0.0));
        assert!(left[16..32].iter().all(|&s| s == 0.25));
        assert!(left[32..48].iter().all(|&s| s == 0.5));
        assert_eq!(right[40], -0.5);
        assert!(left[48..].iter().all(|&s| s == 0.0));
        assert_eq!(mixer.queued_blocks(), 0);
    }

    #[test]
    fn fade_out_attenuates_playback() {
        let (mut output, receiver) = output_queue();
        output.ramp_gain(1.0, 0.0, 0.0);
        output.schedule(block(0.0, 1.0));
        output.ramp_gain(0.0, 0.02, 0.02);

        let mut mixer = PlaybackMixer::new(receiver);
        let mut left = [0.0; 16];
        let mut right = [0.0; 16];
        mixer.render(0.0, RATE, &mut left, &mut right);

        assert_eq!(left[1], 1.0);
        assert!(left[4] < left[3] && left[3] < left[2]);
        assert!(left[15] < 0.05);
    }

    #[test]
    fn ramps_in_one_batch_apply_in_time_order() {
        let (mut output, receiver) = output_queue();
        output.ramp_gain(1.0, 0.0, 0.0);
        output.schedule(block(0.0, 1.0));
        // Sent out of order: fade back in after a brief fade out.
        output.ramp_gain(1.0, 8.0 / 128.0, 0.01);
        output.ramp_gain(0.0, 2.0 / 128.0, 0.01);

        let mut mixer = PlaybackMixer::new(receiver);
        let mut left = [0.0; 16];
        let mut right = [0.0; 16];
        mixer.render(0.0, RATE, &mut left, &mut right);

        assert_eq!(left[1], 1.0);
        assert_eq!(left[2], 1.0);
        assert!((left[3] - (-0.78125f32).exp()).abs() < 1e-4, "{}", left[3]);
        assert!(left[7] < 0.05);
        assert!(left[10] > left[9] && left[9] > left[8]);
        assert!(left[15] > 0.95);
    }
}
