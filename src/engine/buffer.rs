//! Audio Signal
//!
//! Mono floating-point signal plus its sample rate. Signals are immutable
//! once built; every processing step returns a new one.

use crate::error::{OnsetError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

/// Average interleaved frames down to a single channel
///
/// A trailing partial frame is dropped.
pub fn downmix_interleaved(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

// ============================================================================
// AudioSignal
// ============================================================================

/// Ordered samples at a fixed sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioSignal {
    /// Build a signal, rejecting a zero sample rate
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(OnsetError::invalid_parameter(
                "sample_rate",
                sample_rate,
                "> 0 Hz",
            ));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Derive a new signal at the same rate
    ///
    /// Used by processing steps whose output keeps the input's timing.
    pub fn with_samples(&self, samples: Vec<f32>) -> Self {
        Self {
            samples,
            sample_rate: self.sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Time of each sample in seconds (index / sample rate)
    pub fn time_axis(&self) -> Vec<f64> {
        let rate = self.sample_rate as f64;
        (0..self.samples.len()).map(|i| i as f64 / rate).collect()
    }

    /// Minimum and maximum amplitude, `None` for an empty signal
    pub fn amplitude_range(&self) -> Option<(f32, f32)> {
        if self.samples.is_empty() {
            return None;
        }
        let (lo, hi) = self
            .samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            });
        Some((lo, hi))
    }
}
