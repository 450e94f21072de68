//! Serial port transport and the generic blocking read loop.

use super::SourceError;
use crate::protocol::{FrameSink, ProtocolDecoder, ProtocolKind};
use crate::timebase::estimated_serial_rate;
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const READ_CHUNK: usize = 4_096;
/// Upper bound on how long a stop request waits for a blocked read.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_BAUD: u32 = 115_200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud: u32,
    pub protocol: ProtocolKind,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud: DEFAULT_BAUD,
            protocol: ProtocolKind::Binary,
        }
    }

    pub fn estimated_sample_rate(&self) -> f32 {
        estimated_serial_rate(self.baud)
    }
}

/// Names of the serial ports the OS reports; empty if enumeration fails.
pub fn available_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(err) => {
            warn!("[serial] port enumeration failed: {err}");
            Vec::new()
        }
    }
}

/// Opens the port and starts decoding into `sink`.
pub fn open_serial<S>(config: &SerialConfig, sink: S) -> Result<ReadLoop, SourceError>
where
    S: FrameSink + Send + 'static,
{
    let port = serialport::new(&config.port, config.baud)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|source| SourceError::PortOpen {
            port: config.port.clone(),
            source,
        })?;

    info!(
        "[serial] opened {} at {} baud ({:?}, ~{:.0} frames/s)",
        config.port,
        config.baud,
        config.protocol,
        config.estimated_sample_rate()
    );
    spawn_read_loop(port, ProtocolDecoder::new(config.protocol), sink)
}

/// A running reader thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct ReadLoop {
    handle: Option<JoinHandle<ReadStats>>,
    keep_reading: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub bytes: u64,
    pub frames: u64,
}

impl ReadLoop {
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Requests a stop and waits for the thread to exit.
    pub fn stop(mut self) -> ReadStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> ReadStats {
        self.keep_reading.store(false, Ordering::Release);
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                warn!("[serial] read thread panicked");
                ReadStats::default()
            }
            None => ReadStats::default(),
        }
    }
}

impl Drop for ReadLoop {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

/// Runs `decoder` over everything `reader` yields on a dedicated thread.
///
/// Timeouts are how the loop notices a stop request; end of stream and hard
/// I/O errors end it. Buffered partial frames are discarded on exit.
pub fn spawn_read_loop<R, S>(
    reader: R,
    decoder: ProtocolDecoder,
    sink: S,
) -> Result<ReadLoop, SourceError>
where
    R: Read + Send + 'static,
    S: FrameSink + Send + 'static,
{
    let keep_reading = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&keep_reading);
    let handle = thread::Builder::new()
        .name("openscope-serial-reader".into())
        .spawn(move || read_loop(reader, decoder, sink, &flag))
        .map_err(|source| SourceError::Spawn {
            name: "serial reader",
            source,
        })?;

    Ok(ReadLoop {
        handle: Some(handle),
        keep_reading,
    })
}

fn read_loop<R: Read, S: FrameSink>(
    mut reader: R,
    mut decoder: ProtocolDecoder,
    mut sink: S,
    keep_reading: &AtomicBool,
) -> ReadStats {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut stats = ReadStats::default();

    while keep_reading.load(Ordering::Acquire) {
        match reader.read(&mut buf) {
            Ok(0) => {
                info!("[serial] stream closed by device");
                break;
            }
            Ok(n) => {
                stats.bytes += n as u64;
                stats.frames += decoder.feed(&buf[..n], &mut sink) as u64;
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(err) => {
                warn!("[serial] read failed: {err}");
                break;
            }
        }
    }

    decoder.reset();
    debug!(
        "[serial] reader exiting after {} bytes, {} frames",
        stats.bytes, stats.frames
    );
    stats
}
