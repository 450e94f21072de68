//! Byte-stream decoders for serial instruments.
//!
//! Both wire formats turn an arbitrary chunking of bytes into whole frames of
//! channel values. Malformed input is dropped locally; decoders never fail.

pub mod binary;
pub mod text;

pub use binary::{BinaryDecoder, FRAME_MARKER};
pub use text::TextDecoder;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    /// Little-endian `f32` payloads separated by [`FRAME_MARKER`].
    #[default]
    #[serde(alias = "justfloat")]
    Binary,
    /// Comma-separated decimal lines with an optional `label:` prefix.
    #[serde(alias = "firewater")]
    Text,
}

impl ProtocolKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "binary" | "justfloat" => Some(Self::Binary),
            "text" | "firewater" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Receives each decoded frame, in stream order.
pub trait FrameSink {
    fn push_frame(&mut self, values: &[f32]);
}

impl FrameSink for Vec<Vec<f32>> {
    fn push_frame(&mut self, values: &[f32]) {
        self.push(values.to_vec());
    }
}

/// Value for `channel` in a frame; short frames repeat their first value.
#[inline]
pub fn channel_value(values: &[f32], channel: usize) -> f32 {
    values
        .get(channel)
        .or_else(|| values.first())
        .copied()
        .unwrap_or(0.0)
}

#[derive(Debug)]
pub enum ProtocolDecoder {
    Binary(BinaryDecoder),
    Text(TextDecoder),
}

impl ProtocolDecoder {
    pub fn new(kind: ProtocolKind) -> Self {
        match kind {
            ProtocolKind::Binary => Self::Binary(BinaryDecoder::default()),
            ProtocolKind::Text => Self::Text(TextDecoder::default()),
        }
    }

    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::Binary(_) => ProtocolKind::Binary,
            Self::Text(_) => ProtocolKind::Text,
        }
    }

    /// Consumes `bytes` and returns the number of frames pushed to `sink`.
    pub fn feed<S: FrameSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) -> usize {
        match self {
            Self::Binary(decoder) => decoder.feed(bytes, sink),
            Self::Text(decoder) => decoder.feed(bytes, sink),
        }
    }

    /// Drops buffered partial input, e.g. after a reconnect.
    pub fn reset(&mut self) {
        match self {
            Self::Binary(decoder) => decoder.reset(),
            Self::Text(decoder) => decoder.reset(),
        }
    }

    /// Replaces the decoder when the protocol changes; leaves it untouched otherwise.
    pub fn switch(&mut self, kind: ProtocolKind) {
        if self.kind() != kind {
            *self = Self::new(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_frames_fill_from_first_value() {
        let frame = [0.25, -1.0];
        assert_eq!(channel_value(&frame, 1), -1.0);
        assert_eq!(channel_value(&frame, 3), 0.25);
        assert_eq!(channel_value(&[], 0), 0.0);
    }

    #[test]
    fn protocol_names_include_wire_aliases() {
        assert_eq!(ProtocolKind::parse("JustFloat"), Some(ProtocolKind::Binary));
        assert_eq!(ProtocolKind::parse("firewater"), Some(ProtocolKind::Text));
        assert_eq!(ProtocolKind::parse("modbus"), None);

        let kind: ProtocolKind = serde_json::from_str("\"firewater\"").unwrap();
        assert_eq!(kind, ProtocolKind::Text);
        assert_eq!(serde_json::to_string(&ProtocolKind::Binary).unwrap(), "\"binary\"");
    }

    #[test]
    fn switching_protocol_discards_state() {
        let mut decoder = ProtocolDecoder::new(ProtocolKind::Text);
        let mut frames: Vec<Vec<f32>> = Vec::new();
        decoder.feed(b"1.5,2", &mut frames);

        decoder.switch(ProtocolKind::Text);
        decoder.feed(b"\n", &mut frames);
        assert_eq!(frames, vec![vec![1.5, 2.0]]);

        decoder.feed(b"7", &mut frames);
        decoder.switch(ProtocolKind::Binary);
        assert_eq!(decoder.kind(), ProtocolKind::Binary);
        decoder.switch(ProtocolKind::Text);
        decoder.feed(b"\n", &mut frames);
        assert_eq!(frames.len(), 1);
    }
}
