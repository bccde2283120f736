//! Capability traits injected into the onset pipeline
//!
//! Each pipeline step is a trait so the pipeline itself stays a plain
//! function over its collaborators and can be tested with fakes.

use std::path::Path;

use crate::engine::AudioSignal;
use crate::error::Result;

/// Reads a file into a mono signal
pub trait AudioDecoder: Send + Sync {
    /// Decode the file at `path`
    ///
    /// Fails with `FileNotFound` or `InvalidAudio` when the file is missing
    /// or not decodable.
    fn decode(&self, path: &Path) -> Result<AudioSignal>;
}

/// Removes noise from a signal
pub trait NoiseReducer: Send + Sync {
    /// Return a denoised copy with the same length and sample rate
    fn reduce(&self, signal: &AudioSignal) -> Result<AudioSignal>;

    /// Short identifier used in log output
    fn name(&self) -> &'static str;
}

/// Finds onset events in a signal
pub trait OnsetDetector: Send + Sync {
    /// Onset times in seconds, ascending
    fn detect(&self, signal: &AudioSignal) -> Result<Vec<f64>>;

    /// Short identifier used in log output
    fn name(&self) -> &'static str;
}

/// Displays a waveform with onset markers
pub trait WaveformRenderer: Send + Sync {
    /// Draw `signal` with vertical markers at `onsets_secs`
    ///
    /// May block until the user dismisses the figure.
    fn render(&self, signal: &AudioSignal, onsets_secs: &[f64]) -> Result<()>;
}
