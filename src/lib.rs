//! Speech Onset - onset detection for WAV recordings
//!
//! A recording is decoded to mono, cleaned with a spectral gate, and scanned
//! for onsets with a log-mel spectral flux detector. The first three onsets
//! at or after a caller-supplied threshold are reported in milliseconds.
//!
//! # Example
//!
//! ```no_run
//! let onsets = speech_onset::find_speech_onset("take1.wav", 250.0, false)?;
//! for ms in onsets.iter() {
//!     println!("{ms}");
//! }
//! # Ok::<(), speech_onset::OnsetError>(())
//! ```

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod plot;

pub use error::{OnsetError, Result};
pub use pipeline::{find_speech_onset, OnsetPipeline, OnsetReport, OnsetSet, PipelineConfig};
