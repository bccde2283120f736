//! Spectral gating noise reduction
//!
//! The signal is its own noise reference. Two estimates are available:
//!
//! - `NonStationary` (default): the noise floor of every frequency bin is a
//!   zero-phase, time-smoothed copy of that bin's magnitude. Energy that
//!   rises well above the local floor passes, so onsets survive while long
//!   steady sounds are attenuated.
//! - `Stationary`: one floor per bin, `mean + n_std_thresh * std` of the
//!   bin's level in dB over the whole clip.
//!
//! The resulting 0..1 mask is smoothed across frequency and time with a
//! triangular kernel before it is applied to the STFT.

use log::debug;
use serde::{Deserialize, Serialize};

use super::mel::power_to_db;
use super::stft::Stft;
use crate::engine::AudioSignal;
use crate::error::{OnsetError, Result};
use crate::pipeline::NoiseReducer;

/// How the noise floor is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    Stationary,
    NonStationary,
}

/// Spectral gate parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralGateParams {
    pub mode: GateMode,
    /// FFT size (even, >= 16)
    pub n_fft: usize,
    /// Hop between frames in samples (1..=n_fft)
    pub hop_length: usize,
    /// Stationary: std-devs above the mean a bin must rise to pass
    pub n_std_thresh: f32,
    /// Non-stationary: time constant of the noise floor in seconds
    pub time_constant_s: f32,
    /// Non-stationary: multiples above the floor where the mask is half open
    pub thresh_n_mult: f32,
    /// Non-stationary: steepness of the mask sigmoid
    pub sigmoid_slope: f32,
    /// Fraction of the detected noise to remove (0 to 1)
    pub prop_decrease: f32,
    /// Mask smoothing width across frequency in Hz
    pub freq_mask_smooth_hz: f32,
    /// Mask smoothing width across time in ms
    pub time_mask_smooth_ms: f32,
}

impl Default for SpectralGateParams {
    fn default() -> Self {
        Self {
            mode: GateMode::NonStationary,
            n_fft: 1024,
            hop_length: 256,
            n_std_thresh: 1.5,
            time_constant_s: 2.0,
            thresh_n_mult: 2.0,
            sigmoid_slope: 10.0,
            prop_decrease: 1.0,
            freq_mask_smooth_hz: 500.0,
            time_mask_smooth_ms: 50.0,
        }
    }
}

impl SpectralGateParams {
    /// Validate parameters are within range
    pub fn validate(&self) -> Result<()> {
        if self.n_fft < 16 || self.n_fft % 2 != 0 {
            return Err(OnsetError::invalid_parameter(
                "n_fft",
                self.n_fft,
                "an even number >= 16",
            ));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(OnsetError::invalid_parameter(
                "hop_length",
                self.hop_length,
                "1..=n_fft",
            ));
        }
        if !(0.0..=1.0).contains(&self.prop_decrease) {
            return Err(OnsetError::invalid_parameter(
                "prop_decrease",
                self.prop_decrease,
                "0 to 1",
            ));
        }
        if !(self.time_constant_s > 0.0) {
            return Err(OnsetError::invalid_parameter(
                "time_constant_s",
                self.time_constant_s,
                "> 0 s",
            ));
        }
        if !(self.freq_mask_smooth_hz > 0.0) || !(self.time_mask_smooth_ms > 0.0) {
            return Err(OnsetError::invalid_parameter(
                "mask_smoothing",
                format!("{} Hz / {} ms", self.freq_mask_smooth_hz, self.time_mask_smooth_ms),
                "> 0",
            ));
        }
        Ok(())
    }
}

/// Spectral gate noise reducer
#[derive(Debug, Clone, Default)]
pub struct SpectralGate {
    params: SpectralGateParams,
}

impl SpectralGate {
    /// Create a gate with default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gate with specified parameters
    pub fn with_params(params: SpectralGateParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &SpectralGateParams {
        &self.params
    }

    /// Half-widths of the mask smoothing kernel in (time frames, freq bins)
    fn smoothing_extent(&self, sample_rate: u32) -> Result<(usize, usize)> {
        let p = &self.params;
        let bin_hz = sample_rate as f32 / (p.n_fft / 2) as f32;
        let n_grad_freq = (p.freq_mask_smooth_hz / bin_hz) as usize;
        let frame_ms = p.hop_length as f32 / sample_rate as f32 * 1000.0;
        let n_grad_time = (p.time_mask_smooth_ms / frame_ms) as usize;

        if n_grad_freq < 1 {
            return Err(OnsetError::ProcessingError {
                stage: "denoise",
                reason: format!(
                    "freq_mask_smooth_hz must be at least {:.1} Hz at {} Hz",
                    bin_hz, sample_rate
                ),
            });
        }
        if n_grad_time < 1 {
            return Err(OnsetError::ProcessingError {
                stage: "denoise",
                reason: format!(
                    "time_mask_smooth_ms must be at least {:.1} ms at {} Hz",
                    frame_ms, sample_rate
                ),
            });
        }
        Ok((n_grad_time, n_grad_freq))
    }

    fn stationary_mask(&self, magnitudes: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let mut db: Vec<Vec<f32>> = magnitudes
            .iter()
            .map(|frame| frame.iter().map(|m| m * m).collect())
            .collect();
        power_to_db(&mut db, 1e-20, Some(80.0));

        let num_frames = db.len() as f32;
        let num_bins = db.first().map_or(0, |f| f.len());
        let thresholds: Vec<f32> = (0..num_bins)
            .map(|k| {
                let mean = db.iter().map(|f| f[k]).sum::<f32>() / num_frames;
                let var = db.iter().map(|f| (f[k] - mean).powi(2)).sum::<f32>() / num_frames;
                mean + var.sqrt() * self.params.n_std_thresh
            })
            .collect();

        db.iter()
            .map(|frame| {
                frame
                    .iter()
                    .zip(&thresholds)
                    .map(|(v, t)| if v > t { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect()
    }

    fn nonstationary_mask(&self, magnitudes: &[Vec<f32>], sample_rate: u32) -> Vec<Vec<f32>> {
        let p = &self.params;
        let t_frames = p.time_constant_s * sample_rate as f32 / p.hop_length as f32;
        let b = ((1.0 + 4.0 * t_frames * t_frames).sqrt() - 1.0) / (2.0 * t_frames * t_frames);

        let num_frames = magnitudes.len();
        let num_bins = magnitudes.first().map_or(0, |f| f.len());
        let mut mask = vec![vec![0.0_f32; num_bins]; num_frames];
        let mut track = vec![0.0_f32; num_frames];

        for k in 0..num_bins {
            for (t, frame) in magnitudes.iter().enumerate() {
                track[t] = frame[k];
            }
            smooth_zero_phase(&mut track, b);

            for t in 0..num_frames {
                let level = magnitudes[t][k];
                let floor = track[t];
                let above = if floor > 1e-10 {
                    (level - floor) / floor
                } else if level > 1e-10 {
                    f32::MAX
                } else {
                    0.0
                };
                mask[t][k] = sigmoid(above - p.thresh_n_mult, p.sigmoid_slope);
            }
        }
        mask
    }
}

impl NoiseReducer for SpectralGate {
    fn reduce(&self, signal: &AudioSignal) -> Result<AudioSignal> {
        if signal.is_empty() {
            return Err(OnsetError::ProcessingError {
                stage: "denoise",
                reason: "signal contains no samples".to_string(),
            });
        }

        let p = &self.params;
        let (n_grad_time, n_grad_freq) = self.smoothing_extent(signal.sample_rate())?;
        let stft = Stft::new(p.n_fft, p.hop_length)?;
        let mut spec = stft.forward(signal.samples());
        let magnitudes = spec.magnitudes();

        let mut mask = match p.mode {
            GateMode::Stationary => self.stationary_mask(&magnitudes),
            GateMode::NonStationary => self.nonstationary_mask(&magnitudes, signal.sample_rate()),
        };
        smooth_mask(&mut mask, n_grad_time, n_grad_freq);

        let keep = 1.0 - p.prop_decrease;
        for (frame, gains) in spec.frames.iter_mut().zip(&mask) {
            for (bin, &m) in frame.iter_mut().zip(gains) {
                *bin *= m * p.prop_decrease + keep;
            }
        }

        let samples = stft.inverse(&spec, signal.len());
        debug!(
            "Spectral gate ({:?}): {} frames, smoothing {}x{}",
            p.mode,
            spec.num_frames(),
            2 * n_grad_time + 1,
            2 * n_grad_freq + 1
        );
        Ok(signal.with_samples(samples))
    }

    fn name(&self) -> &'static str {
        "spectral-gate"
    }
}

// ============================================================================
// Internal helpers
// ============================================================================

fn sigmoid(x: f32, slope: f32) -> f32 {
    1.0 / (1.0 + (-x * slope).exp())
}

/// One-pole low-pass run forward then backward, seeded with the edge values
fn smooth_zero_phase(track: &mut [f32], b: f32) {
    let Some(&first) = track.first() else {
        return;
    };
    let mut state = first;
    for v in track.iter_mut() {
        state = b * *v + (1.0 - b) * state;
        *v = state;
    }
    let mut state = *track.last().unwrap_or(&first);
    for v in track.iter_mut().rev() {
        state = b * *v + (1.0 - b) * state;
        *v = state;
    }
}

/// Triangle of `2n + 1` taps summing to 1
fn triangle_kernel(n: usize) -> Vec<f32> {
    let taps: Vec<f32> = (1..=2 * n + 1)
        .map(|i| {
            let d = (i as isize - (n as isize + 1)).unsigned_abs();
            (n + 1 - d) as f32 / (n + 1) as f32
        })
        .collect();
    let sum: f32 = taps.iter().sum();
    taps.into_iter().map(|t| t / sum).collect()
}

/// Separable zero-padded "same" convolution of the mask over time and frequency
fn smooth_mask(mask: &mut [Vec<f32>], n_grad_time: usize, n_grad_freq: usize) {
    let freq_kernel = triangle_kernel(n_grad_freq);
    for frame in mask.iter_mut() {
        *frame = convolve_same(frame, &freq_kernel);
    }

    let time_kernel = triangle_kernel(n_grad_time);
    let num_bins = mask.first().map_or(0, |f| f.len());
    let mut column = vec![0.0_f32; mask.len()];
    for k in 0..num_bins {
        for (t, frame) in mask.iter().enumerate() {
            column[t] = frame[k];
        }
        let smoothed = convolve_same(&column, &time_kernel);
        for (frame, v) in mask.iter_mut().zip(smoothed) {
            frame[k] = v;
        }
    }
}

fn convolve_same(input: &[f32], kernel: &[f32]) -> Vec<f32> {
    let half = (kernel.len() / 2) as isize;
    (0..input.len() as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(j, &w)| {
                    let idx = i + half - j as isize;
                    (idx >= 0 && (idx as usize) < input.len()).then(|| input[idx as usize] * w)
                })
                .sum()
        })
        .collect()
}
