//! Looping audio-file source.

use super::SourceError;
use crate::protocol::FrameSink;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const PLAYBACK_TICK: Duration = Duration::from_millis(10);
// Frames older than this are skipped instead of replayed after a stall.
const MAX_CATCH_UP: Duration = Duration::from_millis(250);

/// Decoded, de-interleaved clip.
#[derive(Debug, Clone, PartialEq)]
pub struct WavClip {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl WavClip {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, hound::Error> {
        Self::decode(hound::WavReader::new(reader)?)
    }

    fn decode<R: Read>(reader: hound::WavReader<R>) -> Result<Self, hound::Error> {
        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let count = usize::from(spec.channels.max(1));
        let mut channels = vec![Vec::with_capacity(interleaved.len() / count); count];
        for frame in interleaved.chunks_exact(count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Ok(Self {
            sample_rate: spec.sample_rate,
            channels,
        })
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate.max(1)))
    }
}

pub fn load_wav(path: &Path) -> Result<WavClip, SourceError> {
    let clip = hound::WavReader::open(path)
        .and_then(WavClip::decode)
        .map_err(|source| SourceError::File {
            path: path.to_path_buf(),
            source,
        })?;
    if clip.frames() == 0 {
        return Err(SourceError::EmptyClip {
            path: path.to_path_buf(),
        });
    }
    info!(
        "[wav] loaded {} ({} ch, {} Hz, {:.1}s)",
        path.display(),
        clip.channels.len(),
        clip.sample_rate,
        clip.duration().as_secs_f32()
    );
    Ok(clip)
}

/// Maps a 0..=100 speed knob onto 0.001x..2x, snapping near 1x to exactly 1x.
pub fn playback_speed(knob: f32) -> f32 {
    let speed = 0.001 * (2.0f32 / 0.001).powf(knob / 100.0);
    if speed > 0.97 && speed < 1.03 { 1.0 } else { speed }
}

/// Position in a looping clip, advanced in output frames.
#[derive(Debug, Clone)]
pub struct ClipCursor {
    clip: Arc<WavClip>,
    position: f64,
    frame: Vec<f32>,
}

impl ClipCursor {
    pub fn new(clip: Arc<WavClip>) -> Self {
        let frame = vec![0.0; clip.channels.len()];
        Self {
            clip,
            position: 0.0,
            frame,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Pushes `count` frames into `sink`, stepping `speed` source frames each.
    pub fn advance<S: FrameSink + ?Sized>(&mut self, count: usize, speed: f32, sink: &mut S) {
        let len = self.clip.frames();
        if len == 0 {
            return;
        }
        let step = f64::from(speed.max(0.0));
        for _ in 0..count {
            let index = (self.position as usize).min(len - 1);
            for (dst, channel) in self.frame.iter_mut().zip(&self.clip.channels) {
                *dst = channel[index];
            }
            sink.push_frame(&self.frame);
            self.position = (self.position + step) % len as f64;
        }
    }
}

/// Plays a clip into a sink at the clip's own rate on a dedicated thread.
#[derive(Debug)]
pub struct WavPlayer {
    handle: Option<JoinHandle<()>>,
    keep_playing: Arc<AtomicBool>,
    speed: Arc<AtomicU32>,
}

impl WavPlayer {
    pub fn spawn<S>(clip: Arc<WavClip>, speed: f32, mut sink: S) -> Result<Self, SourceError>
    where
        S: FrameSink + Send + 'static,
    {
        let keep_playing = Arc::new(AtomicBool::new(true));
        let speed = Arc::new(AtomicU32::new(speed.to_bits()));
        let (flag, shared_speed) = (Arc::clone(&keep_playing), Arc::clone(&speed));

        let handle = thread::Builder::new()
            .name("openscope-wav-player".into())
            .spawn(move || {
                let rate = f64::from(clip.sample_rate.max(1));
                let mut cursor = ClipCursor::new(clip);
                let mut clock = Instant::now();
                let mut owed = 0.0f64;

                while flag.load(Ordering::Acquire) {
                    thread::sleep(PLAYBACK_TICK);
                    let elapsed = clock.elapsed().min(MAX_CATCH_UP);
                    clock = Instant::now();

                    owed += elapsed.as_secs_f64() * rate;
                    let due = owed.floor();
                    owed -= due;
                    let speed = f32::from_bits(shared_speed.load(Ordering::Relaxed));
                    cursor.advance(due as usize, speed, &mut sink);
                }
            })
            .map_err(|source| SourceError::Spawn {
                name: "wav player",
                source,
            })?;

        Ok(Self {
            handle: Some(handle),
            keep_playing,
            speed,
        })
    }

    pub fn set_speed(&self, speed: f32) {
        self.speed.store(speed.to_bits(), Ordering::Relaxed);
    }

    pub fn speed(&self) -> f32 {
        f32::from_bits(self.speed.load(Ordering::Relaxed))
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.keep_playing.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("[wav] player thread panicked");
            }
        }
    }
}

impl Drop for WavPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
