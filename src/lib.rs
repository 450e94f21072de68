//! Virtual oscilloscope core: capture, decode, trigger, analyse and
//! triangulate multichannel sample streams.

pub mod audio;
pub mod dsp;
pub mod frame;
pub mod protocol;
pub mod render;
pub mod settings;
pub mod source;
pub mod timebase;
