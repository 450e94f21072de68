//! Turns a serial frame stream into timed audio blocks.
//!
//! Blocks are scheduled against the output's clock. A late stream snaps
//! forward by a small slack instead of bursting; a stream running ahead of
//! playback is thinned by dropping whole blocks once the lookahead is full.

use std::iter;
use tracing::{debug, trace};

/// Frames accumulated before a block is emitted.
pub const CHUNK_SIZE: usize = 2_048;
/// Slower sources are repeated sample-wise until they reach this rate.
pub const MIN_PLAYBACK_RATE: f32 = 8_000.0;
/// Seconds added to `now` when the schedule has fallen behind.
pub const UNDERRUN_SLACK: f64 = 0.050;
/// Blocks starting further than this many seconds ahead are dropped.
pub const MAX_LOOKAHEAD: f64 = 0.400;
/// Gain ramp time constant used when monitoring toggles.
pub const FADE_TIME_CONSTANT: f64 = 0.020;

/// Monotonic time of the audio device, in seconds.
pub trait AudioClock {
    fn now(&self) -> f64;
}

/// Destination for scheduled blocks.
pub trait AudioOutput {
    fn schedule(&mut self, block: AudioBlock);
    /// Moves the output gain towards `target` from time `at` onward.
    fn ramp_gain(&mut self, target: f32, at: f64, time_constant: f64);
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: f32,
    /// Device clock time of the first sample.
    pub start_time: f64,
}

impl AudioBlock {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.left.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Still accumulating, or monitoring is off.
    Pending,
    Scheduled,
    /// Scheduled after snapping a stale start time forward.
    Resynced,
    /// Discarded: the schedule is already a full lookahead ahead.
    Dropped,
}

pub struct AudioPlaybackScheduler<C, O> {
    clock: C,
    output: O,
    source_rate: f32,
    left: Vec<f32>,
    right: Vec<f32>,
    next_scheduled_time: f64,
    monitoring: bool,
    dropped_blocks: u64,
}

impl<C, O> std::fmt::Debug for AudioPlaybackScheduler<C, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPlaybackScheduler")
            .field("source_rate", &self.source_rate)
            .field("pending", &self.left.len())
            .field("next_scheduled_time", &self.next_scheduled_time)
            .field("monitoring", &self.monitoring)
            .finish_non_exhaustive()
    }
}

impl<C: AudioClock, O: AudioOutput> AudioPlaybackScheduler<C, O> {
    /// Starts with monitoring off.
    pub fn new(clock: C, output: O, source_rate: f32) -> Self {
        Self {
            clock,
            output,
            source_rate: source_rate.max(1.0),
            left: Vec::with_capacity(CHUNK_SIZE),
            right: Vec::with_capacity(CHUNK_SIZE),
            next_scheduled_time: 0.0,
            monitoring: false,
            dropped_blocks: 0,
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    pub fn pending_frames(&self) -> usize {
        self.left.len()
    }

    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks
    }

    pub fn next_scheduled_time(&self) -> f64 {
        self.next_scheduled_time
    }

    pub fn set_next_scheduled_time(&mut self, time: f64) {
        self.next_scheduled_time = time;
    }

    pub fn set_source_rate(&mut self, sample_rate: f32) {
        self.source_rate = sample_rate.max(1.0);
    }

    /// Output rate and the per-sample repetition factor that reaches it.
    pub fn playback_rate(&self) -> (f32, usize) {
        let factor = (MIN_PLAYBACK_RATE / self.source_rate).ceil().max(1.0) as usize;
        (self.source_rate * factor as f32, factor)
    }

    pub fn set_monitoring(&mut self, enabled: bool) {
        if enabled == self.monitoring {
            return;
        }
        self.monitoring = enabled;
        let now = self.clock.now();
        if enabled {
            self.output.ramp_gain(1.0, now, FADE_TIME_CONSTANT);
        } else {
            self.left.clear();
            self.right.clear();
            self.next_scheduled_time = 0.0;
            self.output.ramp_gain(0.0, now, FADE_TIME_CONSTANT);
        }
        debug!("[scheduler] monitoring {}", if enabled { "on" } else { "off" });
    }

    pub fn push(&mut self, left: f32, right: f32) -> ScheduleOutcome {
        if !self.monitoring {
            return ScheduleOutcome::Pending;
        }
        self.left.push(left);
        self.right.push(right);
        if self.left.len() >= CHUNK_SIZE {
            self.emit()
        } else {
            ScheduleOutcome::Pending
        }
    }

    /// Emits whatever has accumulated as one block.
    pub fn emit(&mut self) -> ScheduleOutcome {
        if self.left.is_empty() {
            return ScheduleOutcome::Pending;
        }

        let (sample_rate, factor) = self.playback_rate();
        let left = repeat_samples(&self.left, factor);
        let right = repeat_samples(&self.right, factor);
        self.left.clear();
        self.right.clear();

        let now = self.clock.now();
        let mut outcome = ScheduleOutcome::Scheduled;
        if self.next_scheduled_time < now {
            trace!(
                "[scheduler] behind by {:.1} ms, resyncing",
                (now - self.next_scheduled_time) * 1_000.0
            );
            self.next_scheduled_time = now + UNDERRUN_SLACK;
            outcome = ScheduleOutcome::Resynced;
        } else if self.next_scheduled_time - now > MAX_LOOKAHEAD {
            self.dropped_blocks += 1;
            trace!(
                "[scheduler] {:.1} ms ahead, dropping block",
                (self.next_scheduled_time - now) * 1_000.0
            );
            return ScheduleOutcome::Dropped;
        }

        let block = AudioBlock {
            left,
            right,
            sample_rate,
            start_time: self.next_scheduled_time,
        };
        self.next_scheduled_time += block.duration();
        self.output.schedule(block);
        outcome
    }
}

fn repeat_samples(samples: &[f32], factor: usize) -> Vec<f32> {
    samples
        .iter()
        .flat_map(|&sample| iter::repeat_n(sample, factor))
        .collect()
}
