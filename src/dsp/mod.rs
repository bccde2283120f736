//! DSP Library
//!
//! Spectral building blocks for onset detection: STFT, mel filterbank,
//! spectral gating noise reduction, spectral flux and peak picking.

pub mod denoise;
pub mod mel;
pub mod onset;
pub mod peak_pick;
pub mod stft;

pub use denoise::{GateMode, SpectralGate, SpectralGateParams};
pub use onset::{OnsetParams, SpectralFluxDetector};
pub use peak_pick::{peak_pick, PeakWindows};
pub use stft::{hann_window, Spectrogram, Stft};
