//! Mel filterbank and decibel conversion
//!
//! Slaney-style mel scale: linear below 1 kHz, logarithmic above, with
//! area-normalized triangular filters.

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4_f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filters over the `n_fft / 2 + 1` FFT bins
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    weights: Vec<Vec<f32>>,
}

impl MelFilterbank {
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f64, fmax: f64) -> Self {
        let num_bins = n_fft / 2 + 1;
        let fft_freqs: Vec<f64> = (0..num_bins)
            .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
            .collect();

        let mel_min = hz_to_mel(fmin);
        let mel_max = hz_to_mel(fmax);
        let mel_f: Vec<f64> = (0..n_mels + 2)
            .map(|i| {
                let mel = mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64;
                mel_to_hz(mel)
            })
            .collect();

        let weights = (0..n_mels)
            .map(|m| {
                let lower_width = mel_f[m + 1] - mel_f[m];
                let upper_width = mel_f[m + 2] - mel_f[m + 1];
                let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);
                fft_freqs
                    .iter()
                    .map(|&f| {
                        let lower = (f - mel_f[m]) / lower_width;
                        let upper = (mel_f[m + 2] - f) / upper_width;
                        (lower.min(upper).max(0.0) * enorm) as f32
                    })
                    .collect()
            })
            .collect();

        Self { weights }
    }

    pub fn num_mels(&self) -> usize {
        self.weights.len()
    }

    /// Project one power spectrum frame onto the mel bands
    pub fn apply(&self, power: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .map(|band| band.iter().zip(power).map(|(w, p)| w * p).sum())
            .collect()
    }
}

/// Power to decibels relative to 1.0, floored at `amin` and clipped to
/// `top_db` below the loudest value
pub fn power_to_db(frames: &mut [Vec<f32>], amin: f32, top_db: Option<f32>) {
    let mut peak = f32::NEG_INFINITY;
    for frame in frames.iter_mut() {
        for value in frame.iter_mut() {
            *value = 10.0 * value.max(amin).log10();
            peak = peak.max(*value);
        }
    }

    if let Some(top_db) = top_db {
        let floor = peak - top_db;
        for value in frames.iter_mut().flat_map(|f| f.iter_mut()) {
            *value = value.max(floor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mel_scale_roundtrips_at_boundaries() {
        assert_relative_eq!(hz_to_mel(1000.0), 15.0, epsilon = 1e-9);
        assert_relative_eq!(mel_to_hz(15.0), 1000.0, epsilon = 1e-9);
        assert_relative_eq!(hz_to_mel(500.0), 7.5, epsilon = 1e-9);
        assert_relative_eq!(mel_to_hz(hz_to_mel(4000.0)), 4000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_filterbank_dimensions() {
        let bank = MelFilterbank::new(22050, 2048, 128, 0.0, 11025.0);
        assert_eq!(bank.num_mels(), 128);
        let out = bank.apply(&vec![1.0; 1025]);
        assert_eq!(out.len(), 128);
        assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_tone_lands_in_matching_band() {
        let bank = MelFilterbank::new(16000, 512, 40, 0.0, 8000.0);
        let mut power = vec![0.0; 257];
        // 1 kHz is bin 32 at 16 kHz / 512
        power[32] = 1.0;
        let bands = bank.apply(&power);
        let loudest = bands
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let centre = mel_to_hz(
            hz_to_mel(0.0) + (hz_to_mel(8000.0) - hz_to_mel(0.0)) * (loudest + 1) as f64 / 41.0,
        );
        assert!((centre - 1000.0).abs() < 150.0, "band centre {}", centre);
    }

    #[test]
    fn test_power_to_db_clips_to_top_db() {
        let mut frames = vec![vec![1.0, 1e-12], vec![100.0, 0.0]];
        power_to_db(&mut frames, 1e-10, Some(80.0));
        assert_relative_eq!(frames[0][0], 0.0, epsilon = 1e-5);
        assert_relative_eq!(frames[1][0], 20.0, epsilon = 1e-5);
        // 1e-12 and 0 are floored to amin (-100 dB) then clipped to 20 - 80
        assert_relative_eq!(frames[0][1], -60.0, epsilon = 1e-4);
        assert_relative_eq!(frames[1][1], -60.0, epsilon = 1e-4);
    }
}
