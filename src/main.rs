use anyhow::{Context, Result, bail};
use openscope::audio::{
    AudioClock, AudioPlaybackScheduler, MonitorHandle, PlaybackMixer, QueueOutput, SystemClock,
    monitor_channel, output_queue,
};
use openscope::dsp::autoset::autoset;
use openscope::dsp::spectrum::peak_bin;
use openscope::dsp::trigger::TriggerStatus;
use openscope::frame::{FrameProcessor, FrameSnapshot};
use openscope::protocol::ProtocolKind;
use openscope::render::TraceStyle;
use openscope::settings::SettingsManager;
use openscope::source::bank::DEFAULT_CAPACITY;
use openscope::source::serial::{self, SerialConfig};
use openscope::source::wav::{self, playback_speed};
use openscope::source::{ChannelBank, FrameRouter, ReadLoop, WavPlayer};
use openscope::timebase::TimebaseRange;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const CHANNELS: usize = 2;
const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);
const LOG_EVERY: u64 = 60;
const DEVICE_RATE: f32 = 48_000.0;
const DEVICE_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct Args {
    serial: Option<String>,
    baud: Option<u32>,
    protocol: Option<ProtocolKind>,
    wav: Option<PathBuf>,
    frames: Option<u64>,
    monitor: bool,
    autoset: bool,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = Self::default();
        let mut iter = std::env::args().skip(1);
        while let Some(flag) = iter.next() {
            let mut value = || iter.next().with_context(|| format!("{flag} needs a value"));
            match flag.as_str() {
                "--serial" => args.serial = Some(value()?),
                "--baud" => args.baud = Some(value()?.parse().context("--baud")?),
                "--protocol" => {
                    let name = value()?;
                    args.protocol = Some(
                        ProtocolKind::parse(&name)
                            .with_context(|| format!("unknown protocol {name:?}"))?,
                    );
                }
                "--wav" => args.wav = Some(PathBuf::from(value()?)),
                "--frames" => args.frames = Some(value()?.parse().context("--frames")?),
                "--monitor" => args.monitor = true,
                "--autoset" => args.autoset = true,
                "-h" | "--help" => {
                    println!(
                        "usage: openscope [--serial PORT] [--baud N] [--protocol justfloat|firewater] \
                         [--wav FILE] [--frames N] [--monitor] [--autoset]"
                    );
                    std::process::exit(0);
                }
                other => bail!("unrecognised argument {other:?}"),
            }
        }
        Ok(args)
    }
}

/// Keeps whichever producer thread is running alive.
enum Source {
    Serial(ReadLoop),
    Wav(WavPlayer),
}

impl Source {
    fn is_finished(&self) -> bool {
        match self {
            Self::Serial(read_loop) => read_loop.is_finished(),
            Self::Wav(_) => false,
        }
    }

    fn stop(self) {
        match self {
            Self::Serial(read_loop) => {
                let stats = read_loop.stop();
                info!("[serial] read {} bytes, {} frames", stats.bytes, stats.frames);
            }
            Self::Wav(player) => player.stop(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse()?;
    let mut settings = SettingsManager::load_or_default();
    settings.update(|s| {
        if let Some(port) = &args.serial {
            s.source.port = Some(port.clone());
        }
        if let Some(baud) = args.baud {
            s.source.baud = baud;
        }
        if let Some(protocol) = args.protocol {
            s.source.protocol = protocol;
        }
    });

    let bank = Arc::new(ChannelBank::new(CHANNELS, DEFAULT_CAPACITY));
    let (tap, monitor) = monitor_channel(0, 1);

    let (source, sample_rate, timebase) = if let Some(path) = &args.wav {
        let clip = Arc::new(wav::load_wav(path)?);
        let rate = clip.sample_rate as f32;
        let router = FrameRouter::new(Arc::clone(&bank), rate).with_monitor(tap);
        let speed = playback_speed(settings.settings().source.wav_speed);
        let player = WavPlayer::spawn(clip, speed, router)?;
        (Source::Wav(player), rate, TimebaseRange::audio())
    } else if let Some(port) = settings.settings().source.port.clone() {
        let source = &settings.settings().source;
        let config = SerialConfig {
            port,
            baud: source.baud,
            protocol: source.protocol,
        };
        let rate = config.estimated_sample_rate();
        let router = FrameRouter::new(Arc::clone(&bank), rate).with_monitor(tap);
        let read_loop = serial::open_serial(&config, router)?;
        (Source::Serial(read_loop), rate, TimebaseRange::serial(rate))
    } else {
        let ports = serial::available_ports();
        bail!(
            "no source given; pass --serial PORT or --wav FILE (ports found: {})",
            if ports.is_empty() { "none".to_string() } else { ports.join(", ") }
        );
    };
    let serial_mode = matches!(source, Source::Serial(_));
    let style = TraceStyle::new([0.1, 1.0, 0.2], serial_mode);
    info!(
        "[scope] {} source at {sample_rate:.0} Hz, trace intensity {}",
        if serial_mode { "serial" } else { "wav" },
        style.intensity
    );

    let audio = if args.monitor {
        Some(start_monitor(&monitor, sample_rate)?)
    } else {
        None
    };

    let mut processor = FrameProcessor::new(bank.capacity());
    let mut frame: u64 = 0;
    let mut next_frame = Instant::now();
    while args.frames.is_none_or(|limit| frame < limit) && !source.is_finished() {
        let mut config = settings.settings().to_frame_config(sample_rate, true);
        config.ms_per_division = timebase.clamp(config.ms_per_division);
        let snapshot = processor.process(&*bank, &config);

        if frame % LOG_EVERY == 0 {
            log_snapshot(frame, snapshot, sample_rate, config.transform_size);
        }
        if args.autoset && frame == LOG_EVERY / 2 {
            apply_autoset(&mut settings, snapshot, sample_rate);
        }

        frame += 1;
        next_frame += FRAME_INTERVAL;
        thread::sleep(next_frame.saturating_duration_since(Instant::now()));
    }

    source.stop();
    if let Some(audio) = audio {
        audio.stop(monitor);
    }
    if let Err(err) = settings.save() {
        warn!("[settings] could not save {:?}: {err}", settings.path());
    }
    Ok(())
}

fn log_snapshot(frame: u64, snapshot: &FrameSnapshot, sample_rate: f32, transform_size: usize) {
    let trigger = match (snapshot.status, snapshot.trigger_index) {
        (TriggerStatus::Triggered, Some(index)) => format!("{} @ {index:.2}", snapshot.status.label()),
        (status, _) => status.label().to_string(),
    };
    info!("[scope] frame {frame}: {trigger}");

    for channel in snapshot.channels.iter().filter(|c| c.enabled) {
        let freq = channel
            .measurement
            .frequency_hz
            .map_or_else(|| "--".to_string(), |hz| format!("{hz:.1} Hz"));
        let peak = peak_bin(&channel.spectrum)
            .map(|(bin, mag)| {
                format!(
                    ", peak {:.1} Hz ({mag:.3})",
                    bin as f32 * sample_rate / transform_size as f32
                )
            })
            .unwrap_or_default();
        info!(
            "[scope]   CH{}: Vpp {:.3}, {freq}{peak}, {} vertices",
            channel.id + 1,
            channel.measurement.vpp,
            channel.vertices.len()
        );
    }
}

fn apply_autoset(settings: &mut SettingsManager, snapshot: &FrameSnapshot, sample_rate: f32) {
    let Some(first) = snapshot.channels.first() else {
        return;
    };
    match autoset(&first.raw, first.id, sample_rate) {
        Some(result) => {
            settings.update(|s| {
                if let Some(channel) = s.channels.get_mut(first.id) {
                    channel.scale = result.scale;
                    channel.position = result.position_offset;
                }
                if let Some(ms) = result.ms_per_division {
                    s.ms_per_division = ms;
                }
                s.trigger = result.trigger;
            });
            info!(
                "[scope] autoset: scale {:.2}, ms/div {:?}",
                result.scale, result.ms_per_division
            );
        }
        None => info!("[scope] autoset: signal too small"),
    }
}

/// Scheduler thread plus a device thread that renders into a null sink.
struct AudioMonitor {
    scheduler: JoinHandle<AudioPlaybackScheduler<SystemClock, QueueOutput>>,
    device: JoinHandle<()>,
    keep_rendering: Arc<AtomicBool>,
}

impl AudioMonitor {
    /// Fades out, then closes the queue so the scheduler thread can exit.
    /// The source must already be stopped.
    fn stop(self, monitor: MonitorHandle) {
        monitor.set_enabled(false);
        drop(monitor);
        match self.scheduler.join() {
            Ok(scheduler) => info!(
                "[monitor] stopped; {} blocks dropped, {} frames pending",
                scheduler.dropped_blocks(),
                scheduler.pending_frames()
            ),
            Err(_) => warn!("[monitor] scheduler thread panicked"),
        }
        self.keep_rendering.store(false, Ordering::Release);
        if self.device.join().is_err() {
            warn!("[output] device thread panicked");
        }
    }
}

fn start_monitor(monitor: &MonitorHandle, sample_rate: f32) -> Result<AudioMonitor> {
    let clock = SystemClock::new();
    let (output, commands) = output_queue();
    let scheduler = monitor.spawn_scheduler(AudioPlaybackScheduler::new(
        clock.clone(),
        output,
        sample_rate,
    ))?;

    let keep_rendering = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&keep_rendering);
    let device = thread::Builder::new()
        .name("openscope-null-device".into())
        .spawn(move || {
            let frames = (DEVICE_RATE * DEVICE_PERIOD.as_secs_f32()) as usize;
            let (mut left, mut right) = (vec![0.0; frames], vec![0.0; frames]);
            let mut mixer = PlaybackMixer::new(commands);
            let mut time = clock.now();
            while flag.load(Ordering::Acquire) {
                mixer.render(time, DEVICE_RATE, &mut left, &mut right);
                let peak = left.iter().chain(&right).fold(0.0f32, |m, s| m.max(s.abs()));
                debug!("[output] rendered {frames} frames at {time:.3}s, peak {peak:.3}");
                time += DEVICE_PERIOD.as_secs_f64();
                thread::sleep(DEVICE_PERIOD);
            }
        })
        .context("spawning null audio device")?;

    monitor.set_enabled(true);
    info!("[monitor] audible monitoring on ({sample_rate:.0} Hz source, device {DEVICE_RATE} Hz)");
    Ok(AudioMonitor {
        scheduler,
        device,
        keep_rendering,
    })
}
