//! Lock-free circular sample store shared by one writer and one reader.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Fixed-capacity ring of `f32` samples.
///
/// Samples are stored as raw bits in atomics so the read loop can push while
/// the frame loop reads without a lock. Exactly one thread may push; a reader
/// racing the writer can observe one boundary sample from the previous lap,
/// which is overwritten on the next frame.
#[derive(Debug)]
pub struct RingBuffer {
    slots: Box<[AtomicU32]>,
    mask: usize,
    // Total number of pushes; the slot index is `write_head & mask`.
    write_head: AtomicUsize,
}

impl RingBuffer {
    /// Capacity is rounded up to the next power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect();
        Self {
            slots,
            mask: capacity - 1,
            write_head: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of samples pushed since creation or the last [`clear`](Self::clear).
    #[inline]
    pub fn write_head(&self) -> usize {
        self.write_head.load(Ordering::Acquire)
    }

    #[inline]
    pub fn push(&self, sample: f32) {
        let head = self.write_head.load(Ordering::Relaxed);
        self.slots[head & self.mask].store(sample.to_bits(), Ordering::Relaxed);
        self.write_head
            .store(head.wrapping_add(1), Ordering::Release);
    }

    pub fn extend(&self, samples: &[f32]) {
        for &sample in samples {
            self.push(sample);
        }
    }

    /// Returns the most recent `count` samples, oldest first.
    ///
    /// Asking for more than [`capacity`](Self::capacity) samples wraps around
    /// and repeats older data.
    pub fn read_window(&self, count: usize) -> Vec<f32> {
        let mut out = vec![0.0; count];
        self.read_window_into(&mut out);
        out
    }

    /// Fills `out` with the most recent `out.len()` samples, oldest first.
    pub fn read_window_into(&self, out: &mut [f32]) {
        let head = self.write_head.load(Ordering::Acquire);
        let start = head.wrapping_sub(out.len());
        for (offset, dst) in out.iter_mut().enumerate() {
            let slot = start.wrapping_add(offset) & self.mask;
            *dst = f32::from_bits(self.slots[slot].load(Ordering::Relaxed));
        }
    }

    /// Zeroes the storage and rewinds the head. Must be called by the writer.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(0.0f32.to_bits(), Ordering::Relaxed);
        }
        self.write_head.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        assert_eq!(RingBuffer::with_capacity(1000).capacity(), 1024);
        assert_eq!(RingBuffer::with_capacity(0).capacity(), 1);
        assert_eq!(RingBuffer::with_capacity(64).capacity(), 64);
    }

    #[test]
    fn window_holds_latest_samples_after_wrap() {
        let ring = RingBuffer::with_capacity(8);
        for value in 0..13 {
            ring.push(value as f32);
        }
        let expected: Vec<f32> = (5..13).map(|v| v as f32).collect();
        assert_eq!(ring.read_window(8), expected);
        assert_eq!(ring.read_window(3), vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn short_history_pads_with_zeros() {
        let ring = RingBuffer::with_capacity(4);
        ring.extend(&[1.0, 2.0]);
        assert_eq!(ring.read_window(4), vec![0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn oversized_window_repeats_old_data() {
        let ring = RingBuffer::with_capacity(4);
        ring.extend(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            ring.read_window(6),
            vec![3.0, 4.0, 1.0, 2.0, 3.0, 4.0],
            "reading past capacity wraps onto the same slots"
        );
    }

    #[test]
    fn clear_rewinds_head() {
        let ring = RingBuffer::with_capacity(4);
        ring.extend(&[1.0, 2.0, 3.0]);
        ring.clear();
        assert_eq!(ring.write_head(), 0);
        assert_eq!(ring.read_window(4), vec![0.0; 4]);
    }

    #[test]
    fn reader_sees_final_window_from_writer_thread() {
        let ring = Arc::new(RingBuffer::with_capacity(256));
        let writer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for value in 0..10_000 {
                    ring.push(value as f32);
                }
            })
        };
        writer.join().expect("writer thread panicked");

        let window = ring.read_window(256);
        let expected: Vec<f32> = (10_000 - 256..10_000).map(|v| v as f32).collect();
        assert_eq!(window, expected);
    }
}
