//! Log-mel spectral flux onset detection
//!
//! The onset envelope is the mean over mel bands of the positive change in
//! log power between consecutive frames. It is shifted to line up with the
//! centre of the analysis window, normalized to 0..1, and handed to the
//! adaptive peak picker.

use log::debug;
use serde::{Deserialize, Serialize};

use super::mel::{power_to_db, MelFilterbank};
use super::peak_pick::{peak_pick, PeakWindows};
use super::stft::Stft;
use crate::engine::AudioSignal;
use crate::error::{OnsetError, Result};
use crate::pipeline::OnsetDetector;

/// Onset detector parameters
///
/// Peak-picking windows are given in seconds and converted to frames at the
/// signal's sample rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnsetParams {
    /// FFT size (even)
    pub n_fft: usize,
    /// Hop between frames in samples
    pub hop_length: usize,
    /// Number of mel bands
    pub n_mels: usize,
    /// Highest mel frequency in Hz, Nyquist when `None`
    pub fmax: Option<f64>,
    /// Frame distance for the flux difference
    pub lag: usize,
    pub pre_max_s: f64,
    pub post_max_s: f64,
    pub pre_avg_s: f64,
    pub post_avg_s: f64,
    /// Minimum gap between onsets in seconds
    pub wait_s: f64,
    /// Height above the local mean a normalized peak must reach
    pub delta: f32,
}

impl Default for OnsetParams {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            fmax: None,
            lag: 1,
            pre_max_s: 0.03,
            post_max_s: 0.0,
            pre_avg_s: 0.10,
            post_avg_s: 0.10,
            wait_s: 0.03,
            delta: 0.07,
        }
    }
}

impl OnsetParams {
    /// Validate parameters are within range
    pub fn validate(&self) -> Result<()> {
        if self.n_fft < 2 || self.n_fft % 2 != 0 {
            return Err(OnsetError::invalid_parameter(
                "n_fft",
                self.n_fft,
                "an even number >= 2",
            ));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(OnsetError::invalid_parameter(
                "hop_length",
                self.hop_length,
                "1..=n_fft",
            ));
        }
        if self.n_mels == 0 {
            return Err(OnsetError::invalid_parameter("n_mels", self.n_mels, ">= 1"));
        }
        if self.lag == 0 {
            return Err(OnsetError::invalid_parameter("lag", self.lag, ">= 1"));
        }
        let windows = [
            ("pre_max_s", self.pre_max_s),
            ("post_max_s", self.post_max_s),
            ("pre_avg_s", self.pre_avg_s),
            ("post_avg_s", self.post_avg_s),
            ("wait_s", self.wait_s),
        ];
        for (name, value) in windows {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(OnsetError::invalid_parameter(name, value, ">= 0 s"));
            }
        }
        if !(self.delta >= 0.0) {
            return Err(OnsetError::invalid_parameter("delta", self.delta, ">= 0"));
        }
        Ok(())
    }

    /// Peak-picking windows in frames at `sample_rate`
    ///
    /// `pre_max` and `wait` are held at one frame or more so a single rising
    /// edge is never reported twice at low sample rates.
    pub fn peak_windows(&self, sample_rate: u32) -> PeakWindows {
        let frames = |secs: f64| (secs * sample_rate as f64 / self.hop_length as f64).floor() as usize;
        PeakWindows {
            pre_max: frames(self.pre_max_s).max(1),
            post_max: frames(self.post_max_s) + 1,
            pre_avg: frames(self.pre_avg_s),
            post_avg: frames(self.post_avg_s) + 1,
            wait: frames(self.wait_s).max(1),
        }
    }
}

/// Spectral flux onset detector
#[derive(Debug, Clone, Default)]
pub struct SpectralFluxDetector {
    params: OnsetParams,
}

impl SpectralFluxDetector {
    /// Create a detector with default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detector with specified parameters
    pub fn with_params(params: OnsetParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &OnsetParams {
        &self.params
    }

    /// Onset strength per frame, aligned to frame centres
    pub fn onset_envelope(&self, signal: &AudioSignal) -> Result<Vec<f32>> {
        let p = &self.params;
        let sample_rate = signal.sample_rate();
        let nyquist = sample_rate as f64 / 2.0;
        let fmax = p.fmax.unwrap_or(nyquist).min(nyquist);

        let stft = Stft::new(p.n_fft, p.hop_length)?;
        let mel = MelFilterbank::new(sample_rate, p.n_fft, p.n_mels, 0.0, fmax);
        let mut bands: Vec<Vec<f32>> = stft
            .forward(signal.samples())
            .power()
            .iter()
            .map(|frame| mel.apply(frame))
            .collect();
        power_to_db(&mut bands, 1e-10, Some(80.0));

        let num_frames = bands.len();
        let flux = (p.lag..num_frames).map(|t| {
            let rising: f32 = bands[t]
                .iter()
                .zip(&bands[t - p.lag])
                .map(|(now, before)| (now - before).max(0.0))
                .sum();
            rising / p.n_mels as f32
        });

        // Shift by the lag and half a window so peaks sit on frame centres
        let pad = p.lag + p.n_fft / (2 * p.hop_length);
        let envelope: Vec<f32> = std::iter::repeat(0.0_f32)
            .take(pad)
            .chain(flux)
            .take(num_frames)
            .collect();
        Ok(envelope)
    }
}

impl OnsetDetector for SpectralFluxDetector {
    fn detect(&self, signal: &AudioSignal) -> Result<Vec<f64>> {
        if signal.is_empty() {
            return Err(OnsetError::ProcessingError {
                stage: "onset detection",
                reason: "signal contains no samples".to_string(),
            });
        }

        let mut envelope = self.onset_envelope(signal)?;
        if envelope.iter().any(|v| !v.is_finite()) {
            return Err(OnsetError::ProcessingError {
                stage: "onset detection",
                reason: "onset envelope contains NaN or infinite values".to_string(),
            });
        }

        let min = envelope.iter().copied().fold(f32::INFINITY, f32::min);
        envelope.iter_mut().for_each(|v| *v -= min);
        let max = envelope.iter().copied().fold(0.0_f32, f32::max);
        if max <= 0.0 {
            debug!("Onset envelope is flat, no onsets");
            return Ok(Vec::new());
        }
        envelope.iter_mut().for_each(|v| *v /= max);

        let sample_rate = signal.sample_rate();
        let windows = self.params.peak_windows(sample_rate);
        let frames = peak_pick(&envelope, windows, self.params.delta);
        debug!(
            "Spectral flux: {} frames, {} peaks ({:?})",
            envelope.len(),
            frames.len(),
            windows
        );

        let hop_secs = self.params.hop_length as f64 / sample_rate as f64;
        Ok(frames.into_iter().map(|f| f as f64 * hop_secs).collect())
    }

    fn name(&self) -> &'static str {
        "spectral-flux"
    }
}
