//! Making a serial stream audible: frame handoff, block scheduling and output.

pub mod monitor;
pub mod output;
pub mod playback;
pub mod scheduler;

pub use monitor::{MonitorEvent, MonitorHandle, MonitorTap, monitor_channel};
pub use output::{OutputCommand, QueueOutput, SystemClock, output_queue};
pub use playback::{GainRamp, GainSchedule, PlaybackMixer};
pub use scheduler::{AudioBlock, AudioClock, AudioOutput, AudioPlaybackScheduler, ScheduleOutcome};
