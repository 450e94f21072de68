use super::scheduler::{AudioBlock, AudioClock, AudioOutput};
use async_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Enough for the lookahead window even with small blocks.
pub const OUTPUT_QUEUE_CAPACITY: usize = 64;

/// Wall clock shared by the scheduler and the device that renders its blocks.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Arc<Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Arc::new(Instant::now()),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputCommand {
    Block(AudioBlock),
    Gain {
        target: f32,
        at: f64,
        time_constant: f64,
    },
}

/// [`AudioOutput`] that enqueues commands for a device thread.
#[derive(Debug)]
pub struct QueueOutput {
    sender: Sender<OutputCommand>,
    rejected: u64,
}

pub fn output_queue() -> (QueueOutput, Receiver<OutputCommand>) {
    let (sender, receiver) = async_channel::bounded(OUTPUT_QUEUE_CAPACITY);
    (
        QueueOutput {
            sender,
            rejected: 0,
        },
        receiver,
    )
}

impl QueueOutput {
    pub fn rejected_commands(&self) -> u64 {
        self.rejected
    }

    fn enqueue(&mut self, command: OutputCommand) {
        match self.sender.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.rejected += 1;
                warn!("[output] device queue full; command discarded");
            }
            Err(TrySendError::Closed(_)) => {
                self.rejected += 1;
            }
        }
    }
}

impl AudioOutput for QueueOutput {
    fn schedule(&mut self, block: AudioBlock) {
        self.enqueue(OutputCommand::Block(block));
    }

    fn ramp_gain(&mut self, target: f32, at: f64, time_constant: f64) {
        self.enqueue(OutputCommand::Gain {
            target,
            at,
            time_constant,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_arrive_in_order() {
        let (mut output, receiver) = output_queue();
        output.ramp_gain(1.0, 0.5, 0.02);
        output.schedule(AudioBlock {
            left: vec![0.0; 4],
            right: vec![0.0; 4],
            sample_rate: 8_000.0,
            start_time: 0.55,
        });

        assert!(matches!(
            receiver.try_recv(),
            Ok(OutputCommand::Gain { target, .. }) if target == 1.0
        ));
        assert!(matches!(receiver.try_recv(), Ok(OutputCommand::Block(b)) if b.len() == 4));
    }

    #[test]
    fn closed_device_counts_rejections() {
        let (mut output, receiver) = output_queue();
        drop(receiver);
        output.ramp_gain(0.0, 0.0, 0.02);
        assert_eq!(output.rejected_commands(), 1);
    }

    #[test]
    fn system_clock_is_monotonic_and_shared() {
        let clock = SystemClock::new();
        let copy = clock.clone();
        let first = clock.now();
        assert!(copy.now() >= first);
    }
}
