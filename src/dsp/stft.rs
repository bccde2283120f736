//! Short-time Fourier transform
//!
//! Centered framing: the signal is zero-padded by `n_fft / 2` on both sides
//! so frame `t` is centred on sample `t * hop_length`. The inverse uses
//! weighted overlap-add and trims the padding, giving back the original
//! length.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{OnsetError, Result};

/// Periodic Hann window of length `n`
pub fn hann_window(n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos()))
        .collect()
}

/// Complex spectrogram, one row of `n_fft / 2 + 1` bins per frame
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frames: Vec<Vec<Complex<f32>>>,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Magnitude of every bin
    pub fn magnitudes(&self) -> Vec<Vec<f32>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect()
    }

    /// Squared magnitude of every bin
    pub fn power(&self) -> Vec<Vec<f32>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm_sqr()).collect())
            .collect()
    }
}

/// Forward/inverse STFT with cached FFT plans
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop_length: usize) -> Result<Self> {
        if n_fft < 2 || n_fft % 2 != 0 {
            return Err(OnsetError::invalid_parameter(
                "n_fft",
                n_fft,
                "an even number >= 2",
            ));
        }
        if hop_length == 0 || hop_length > n_fft {
            return Err(OnsetError::invalid_parameter(
                "hop_length",
                hop_length,
                "1..=n_fft",
            ));
        }

        let mut planner = FftPlanner::new();
        Ok(Self {
            n_fft,
            hop_length,
            window: hann_window(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        })
    }

    /// Number of frames produced for a signal of `len` samples
    pub fn num_frames(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    pub fn forward(&self, samples: &[f32]) -> Spectrogram {
        let pad = self.n_fft / 2;
        let num_frames = self.num_frames(samples.len());
        let num_bins = self.n_fft / 2 + 1;
        let mut frames = Vec::with_capacity(num_frames);
        let mut buffer = vec![Complex::new(0.0_f32, 0.0); self.n_fft];

        for t in 0..num_frames {
            let origin = (t * self.hop_length) as isize - pad as isize;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let idx = origin + i as isize;
                let sample = if idx >= 0 && (idx as usize) < samples.len() {
                    samples[idx as usize]
                } else {
                    0.0
                };
                *slot = Complex::new(sample * self.window[i], 0.0);
            }
            self.forward.process(&mut buffer);
            frames.push(buffer[..num_bins].to_vec());
        }

        Spectrogram {
            frames,
            n_fft: self.n_fft,
            hop_length: self.hop_length,
        }
    }

    /// Weighted overlap-add back to `length` samples
    pub fn inverse(&self, spec: &Spectrogram, length: usize) -> Vec<f32> {
        let pad = self.n_fft / 2;
        let total = pad + length + self.n_fft;
        let mut output = vec![0.0_f32; total];
        let mut norm = vec![0.0_f32; total];
        let mut buffer = vec![Complex::new(0.0_f32, 0.0); self.n_fft];
        let scale = 1.0 / self.n_fft as f32;

        for (t, frame) in spec.frames.iter().enumerate() {
            // Rebuild the full Hermitian spectrum from the positive bins
            for (k, slot) in buffer.iter_mut().enumerate() {
                *slot = if k < frame.len() {
                    frame[k]
                } else {
                    frame[self.n_fft - k].conj()
                };
            }
            self.inverse.process(&mut buffer);

            let start = t * self.hop_length;
            for i in 0..self.n_fft {
                let pos = start + i;
                if pos >= total {
                    break;
                }
                let w = self.window[i];
                output[pos] += buffer[i].re * scale * w;
                norm[pos] += w * w;
            }
        }

        output
            .iter()
            .zip(norm.iter())
            .skip(pad)
            .take(length)
            .map(|(&y, &n)| if n > 1e-10 { y / n } else { y })
            .collect()
    }
}
