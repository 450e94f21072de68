use crate::dsp::normalizer::Coupling;
use crate::dsp::ring_buffer::RingBuffer;

/// Default history per channel; two full 16k views fit.
pub const DEFAULT_CAPACITY: usize = 32_768;

/// DC and AC-coupled history for a fixed number of channels.
///
/// Both rings of a channel advance together so the view can switch coupling
/// between frames without losing history.
#[derive(Debug)]
pub struct ChannelBank {
    dc: Box<[RingBuffer]>,
    ac: Box<[RingBuffer]>,
}

impl ChannelBank {
    pub fn new(channels: usize, capacity: usize) -> Self {
        let rings = || {
            (0..channels)
                .map(|_| RingBuffer::with_capacity(capacity))
                .collect::<Box<[_]>>()
        };
        Self {
            dc: rings(),
            ac: rings(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.dc.len()
    }

    pub fn capacity(&self) -> usize {
        self.dc.first().map_or(0, RingBuffer::capacity)
    }

    /// Ground-coupled channels read the DC ring; the normalizer zeroes them.
    pub fn ring(&self, channel: usize, coupling: Coupling) -> Option<&RingBuffer> {
        match coupling {
            Coupling::Ac => self.ac.get(channel),
            Coupling::Dc | Coupling::Ground => self.dc.get(channel),
        }
    }

    #[inline]
    pub(crate) fn push(&self, channel: usize, dc: f32, ac: f32) {
        if let (Some(dc_ring), Some(ac_ring)) = (self.dc.get(channel), self.ac.get(channel)) {
            dc_ring.push(dc);
            ac_ring.push(ac);
        }
    }

    /// Writer-side reset, e.g. when switching sources.
    pub fn clear(&self) {
        for ring in self.dc.iter().chain(self.ac.iter()) {
            ring.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rings_are_selected_by_coupling() {
        let bank = ChannelBank::new(2, 8);
        bank.push(1, 3.0, -1.0);

        assert_eq!(bank.ring(1, Coupling::Dc).unwrap().read_window(1), vec![3.0]);
        assert_eq!(bank.ring(1, Coupling::Ground).unwrap().read_window(1), vec![3.0]);
        assert_eq!(bank.ring(1, Coupling::Ac).unwrap().read_window(1), vec![-1.0]);
        assert!(bank.ring(2, Coupling::Dc).is_none());
    }

    #[test]
    fn out_of_range_push_is_ignored() {
        let bank = ChannelBank::new(1, 4);
        bank.push(5, 1.0, 1.0);
        assert_eq!(bank.ring(0, Coupling::Dc).unwrap().write_head(), 0);
        assert_eq!(bank.capacity(), 4);
        assert_eq!(ChannelBank::new(0, 4).capacity(), 0);
    }

    #[test]
    fn clear_resets_every_ring() {
        let bank = ChannelBank::new(2, 4);
        bank.push(0, 1.0, 1.0);
        bank.push(1, 1.0, 1.0);
        bank.clear();
        for coupling in [Coupling::Dc, Coupling::Ac] {
            for channel in 0..2 {
                assert_eq!(bank.ring(channel, coupling).unwrap().write_head(), 0);
            }
        }
    }
}
