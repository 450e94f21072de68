//! Bounded handoff from the read thread to the playback scheduler.

use super::scheduler::{AudioClock, AudioOutput, AudioPlaybackScheduler};
use crate::protocol::channel_value;
use crate::source::SourceError;
use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Roughly a second of serial frames at 921600 baud.
pub const MONITOR_QUEUE_CAPACITY: usize = 8_192;
const DROP_LOG_INTERVAL: u64 = 4_096;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorEvent {
    Frame { left: f32, right: f32 },
    Enabled(bool),
    SourceRate(f32),
}

/// Creates the producer and consumer ends for the given stereo channel pair.
pub fn monitor_channel(left: usize, right: usize) -> (MonitorTap, MonitorHandle) {
    let (sender, receiver) = async_channel::bounded(MONITOR_QUEUE_CAPACITY);
    let enabled = Arc::new(AtomicBool::new(false));
    let tap = MonitorTap {
        sender: sender.clone(),
        enabled: Arc::clone(&enabled),
        left,
        right,
        dropped: 0,
    };
    let handle = MonitorHandle {
        sender,
        receiver,
        enabled,
    };
    (tap, handle)
}

/// Producer side, owned by the frame router.
#[derive(Debug)]
pub struct MonitorTap {
    sender: Sender<MonitorEvent>,
    enabled: Arc<AtomicBool>,
    left: usize,
    right: usize,
    dropped: u64,
}

impl MonitorTap {
    /// Never blocks; frames are dropped while the queue is full.
    pub fn offer(&mut self, values: &[f32]) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        let event = MonitorEvent::Frame {
            left: channel_value(values, self.left),
            right: channel_value(values, self.right),
        };
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped % DROP_LOG_INTERVAL == 1 {
                    debug!("[monitor] queue full, {} frames dropped", self.dropped);
                }
            }
            Err(TrySendError::Closed(_)) => {
                self.enabled.store(false, Ordering::Release);
            }
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

/// Control and consumer side.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    sender: Sender<MonitorEvent>,
    receiver: Receiver<MonitorEvent>,
    enabled: Arc<AtomicBool>,
}

impl MonitorHandle {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable is announced before frames flow; disable stops frames first.
    /// Never blocks: a toggle that finds the queue full is logged and
    /// dropped, and an undelivered enable leaves the tap off.
    pub fn set_enabled(&self, enabled: bool) {
        if enabled {
            if self.announce(MonitorEvent::Enabled(true)) {
                self.enabled.store(true, Ordering::Release);
            }
        } else {
            self.enabled.store(false, Ordering::Release);
            self.announce(MonitorEvent::Enabled(false));
        }
    }

    pub fn set_source_rate(&self, sample_rate: f32) {
        self.announce(MonitorEvent::SourceRate(sample_rate));
    }

    fn announce(&self, event: MonitorEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("[monitor] queue full; {event:?} not delivered");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("[monitor] scheduler has gone away; {event:?} not delivered");
                false
            }
        }
    }

    pub fn try_recv(&self) -> Option<MonitorEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    /// Drives `scheduler` from the queue on a dedicated thread until every
    /// sender is gone.
    pub fn spawn_scheduler<C, O>(
        &self,
        mut scheduler: AudioPlaybackScheduler<C, O>,
    ) -> Result<JoinHandle<AudioPlaybackScheduler<C, O>>, SourceError>
    where
        C: AudioClock + Send + 'static,
        O: AudioOutput + Send + 'static,
    {
        let receiver = self.receiver.clone();
        thread::Builder::new()
            .name("openscope-audio-monitor".into())
            .spawn(move || {
                while let Ok(event) = receiver.recv_blocking() {
                    apply_event(&mut scheduler, event);
                }
                info!(
                    "[monitor] queue closed; {} blocks dropped for lookahead",
                    scheduler.dropped_blocks()
                );
                scheduler
            })
            .map_err(|source| SourceError::Spawn {
                name: "audio monitor",
                source,
            })
    }
}

pub fn apply_event<C: AudioClock, O: AudioOutput>(
    scheduler: &mut AudioPlaybackScheduler<C, O>,
    event: MonitorEvent,
) {
    match event {
        MonitorEvent::Frame { left, right } => {
            scheduler.push(left, right);
        }
        MonitorEvent::Enabled(enabled) => scheduler.set_monitoring(enabled),
        MonitorEvent::SourceRate(rate) => scheduler.set_source_rate(rate),
    }
}
