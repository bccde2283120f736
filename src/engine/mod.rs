//! Audio Engine Module
//!
//! Mono signal container and WAV file I/O.

pub mod buffer;
pub mod io;

pub use buffer::AudioSignal;
pub use io::{generate_tone, generate_tone_bursts, import_audio, write_wav, WavDecoder};
