//! Pull-side view of a capture source.

use super::ChannelBank;
use crate::dsp::normalizer::Coupling;
use std::sync::Arc;

/// Anything the frame loop can pull a channel window from.
///
/// Push-fed sources land in a [`ChannelBank`]; devices with their own
/// analysers (including their own AC path) implement this directly.
pub trait CaptureDevice {
    fn channel_count(&self) -> usize;

    /// Fills `out` with the latest samples of `channel`, oldest first.
    /// Returns `false` if the channel does not exist.
    fn pull(&self, channel: usize, coupling: Coupling, out: &mut [f32]) -> bool;
}

impl CaptureDevice for ChannelBank {
    fn channel_count(&self) -> usize {
        ChannelBank::channel_count(self)
    }

    fn pull(&self, channel: usize, coupling: Coupling, out: &mut [f32]) -> bool {
        match self.ring(channel, coupling) {
            Some(ring) => {
                ring.read_window_into(out);
                true
            }
            None => false,
        }
    }
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for Arc<D> {
    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn pull(&self, channel: usize, coupling: Coupling, out: &mut [f32]) -> bool {
        (**self).pull(channel, coupling, out)
    }
}
