use super::FrameSink;
use tracing::debug;

// A stream that never sends a newline is not a text instrument.
const MAX_RESIDUAL: usize = 64 * 1024;

/// Line-oriented CSV decoder: `[label:]v0,v1,...\n`.
#[derive(Debug, Default)]
pub struct TextDecoder {
    residual: String,
    // Trailing bytes of a UTF-8 sequence split across reads.
    partial_utf8: Vec<u8>,
    values: Vec<f32>,
}

impl TextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text received after the last line break.
    pub fn residual(&self) -> &str {
        &self.residual
    }

    pub fn reset(&mut self) {
        self.residual.clear();
        self.partial_utf8.clear();
    }

    pub fn feed<S: FrameSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) -> usize {
        self.decode_utf8(bytes);

        let Some(last_newline) = self.residual.rfind('\n') else {
            self.enforce_residual_limit();
            return 0;
        };

        let mut frames = 0;
        for line in self.residual[..last_newline].split('\n') {
            parse_line(line, &mut self.values);
            if !self.values.is_empty() {
                sink.push_frame(&self.values);
                frames += 1;
            }
        }
        self.residual.drain(..=last_newline);
        self.enforce_residual_limit();
        frames
    }

    fn decode_utf8(&mut self, bytes: &[u8]) {
        let joined;
        let mut rest = if self.partial_utf8.is_empty() {
            bytes
        } else {
            self.partial_utf8.extend_from_slice(bytes);
            joined = std::mem::take(&mut self.partial_utf8);
            &joined[..]
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.residual.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    self.residual
                        .push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            self.residual.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            self.partial_utf8.extend_from_slice(tail);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn enforce_residual_limit(&mut self) {
        if self.residual.len() > MAX_RESIDUAL {
            debug!(
                "[decoder] discarding {} bytes of unterminated text",
                self.residual.len()
            );
            self.residual.clear();
        }
    }
}

/// Parses one line into `out`; leaves `out` empty when nothing numeric remains.
///
/// A labelled line keeps only the field after its first `:`, up to the next
/// one. Each comma-separated token contributes its leading numeric prefix, so
/// `1.5V` reads as 1.5.
fn parse_line(line: &str, out: &mut Vec<f32>) {
    out.clear();
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let body = line.split(':').nth(1).unwrap_or(line);
    out.extend(
        body.split(',')
            .filter_map(parse_number_prefix)
            .filter(|value| !value.is_nan()),
    );
}

/// Longest decimal literal at the start of `token`, after leading whitespace.
fn parse_number_prefix(token: &str) -> Option<f32> {
    let token = token.trim_start();
    let bytes = token.as_bytes();
    let digits_from = |mut at: usize| {
        while bytes.get(at).is_some_and(u8::is_ascii_digit) {
            at += 1;
        }
        at
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    if token[end..].starts_with("Infinity") {
        return token[..end + "Infinity".len()].parse().ok();
    }
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - end - 1;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp_end = digits_from(end + 1 + sign);
        if exp_end > end + 1 + sign {
            end = exp_end;
        }
    }
    token[..end].parse().ok()
}
