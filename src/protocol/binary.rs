use super::FrameSink;
use tracing::trace;

/// Frame separator: the little-endian encoding of `f32::INFINITY`.
pub const FRAME_MARKER: [u8; 4] = [0x00, 0x00, 0x80, 0x7F];

// Smallest span worth scanning: marker, one value, marker.
const MIN_PENDING: usize = 12;
const VALUE_BYTES: usize = 4;

/// Marker-delimited `f32` frame decoder.
#[derive(Debug, Default)]
pub struct BinaryDecoder {
    pending: Vec<u8>,
    values: Vec<f32>,
    dropped: u64,
}

impl BinaryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Marker-delimited spans rejected for a bad length since construction.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }

    pub fn feed<S: FrameSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) -> usize {
        self.pending.extend_from_slice(bytes);

        let mut cursor = 0;
        let mut frames = 0;
        while self.pending.len() - cursor >= MIN_PENDING {
            let Some(first) = find_marker(&self.pending, cursor) else {
                trace!(
                    "[decoder] no frame marker in {} bytes, discarding",
                    self.pending.len() - cursor
                );
                cursor = self.pending.len();
                break;
            };
            let body = first + FRAME_MARKER.len();
            let Some(second) = find_marker(&self.pending, body) else {
                cursor = first;
                break;
            };

            let payload = &self.pending[body..second];
            if !payload.is_empty() && payload.len() % VALUE_BYTES == 0 {
                self.values.clear();
                self.values.extend(
                    payload
                        .chunks_exact(VALUE_BYTES)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
                );
                sink.push_frame(&self.values);
                frames += 1;
            } else {
                self.dropped += 1;
                trace!("[decoder] dropped {}-byte binary frame", payload.len());
            }
            cursor = second;
        }

        self.pending.drain(..cursor);
        frames
    }
}

fn find_marker(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(FRAME_MARKER.len())
        .position(|window| window == FRAME_MARKER)
        .map(|offset| from + offset)
}
