//! Sample acquisition: shared channel rings and the threads that fill them.

pub mod bank;
pub mod device;
pub mod router;
pub mod serial;
pub mod wav;

pub use bank::ChannelBank;
pub use device::CaptureDevice;
pub use router::FrameRouter;
pub use serial::{ReadLoop, SerialConfig};
pub use wav::{WavClip, WavPlayer};

use std::path::PathBuf;

/// Failures that stop a source from starting. Streaming faults never surface here.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("could not open serial port {port}: {source}")]
    PortOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("could not read audio file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("audio file {} contains no samples", path.display())]
    EmptyClip { path: PathBuf },

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
