//! Onset Pipeline
//!
//! decode → denoise → detect → milliseconds → filter → first three.
//!
//! Milliseconds are the only unit that leaves this module; seconds are
//! used only when handing onsets to the waveform renderer.

pub mod capability;

use std::io::Write;
use std::ops::Deref;
use std::path::Path;
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::dsp::{SpectralFluxDetector, SpectralGate};
use crate::engine::WavDecoder;
use crate::error::{OnsetError, Result};
use crate::plot::TerminalPlot;

pub use capability::{AudioDecoder, NoiseReducer, OnsetDetector, WaveformRenderer};

/// Number of onsets reported per run
pub const MAX_REPORTED_ONSETS: usize = 3;

// ============================================================================
// Configuration
// ============================================================================

/// Caller-supplied run options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Onsets earlier than this many milliseconds are discarded
    pub nothing_before_ms: f64,
    /// Render the denoised waveform with onset markers
    pub plotted: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            nothing_before_ms: 0.0,
            plotted: false,
        }
    }
}

impl PipelineConfig {
    pub fn new(nothing_before_ms: f64, plotted: bool) -> Self {
        Self {
            nothing_before_ms,
            plotted,
        }
    }

    /// Validate the threshold is finite and non-negative
    pub fn validate(&self) -> Result<()> {
        if !self.nothing_before_ms.is_finite() || self.nothing_before_ms < 0.0 {
            return Err(OnsetError::invalid_parameter(
                "nothing_before_ms",
                self.nothing_before_ms,
                "a finite value >= 0 ms",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Results
// ============================================================================

/// Up to three onset times in milliseconds, ascending
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OnsetSet(Vec<f64>);

impl OnsetSet {
    /// Keep the first [`MAX_REPORTED_ONSETS`] of `onsets_ms`
    pub fn first_of(onsets_ms: &[f64]) -> Self {
        OnsetSet(onsets_ms.iter().copied().take(MAX_REPORTED_ONSETS).collect())
    }

    /// Human-readable summary printed after every successful run
    pub fn summary_line(&self, nothing_before_ms: f64) -> String {
        match self.0.as_slice() {
            [] => format!("No onsets found at or after {}ms", nothing_before_ms),
            [a] => format!("First onset is: {:.1}ms", a),
            [a, b] => format!("First two onsets are: {:.1}ms and {:.1}ms", a, b),
            [a, b, c, ..] => format!(
                "First three onsets are: {:.1}ms, {:.1}ms, and {:.1}ms",
                a, b, c
            ),
        }
    }
}

impl Deref for OnsetSet {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

/// Everything known about one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnsetReport {
    pub path: String,
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub nothing_before_ms: f64,
    /// Onsets found by the detector before filtering
    pub detected: usize,
    /// Every onset at or after the threshold, in milliseconds
    pub surviving_ms: Vec<f64>,
    /// The reported onsets
    pub onsets_ms: OnsetSet,
}

// ============================================================================
// Unit conversion and filtering
// ============================================================================

/// Seconds to milliseconds, rounded half-to-even at 0.1 ms
pub fn to_milliseconds(onsets_secs: &[f64]) -> Vec<f64> {
    onsets_secs
        .iter()
        .map(|s| (s * 1000.0 * 10.0).round_ties_even() / 10.0)
        .collect()
}

/// Keep onsets at or after `nothing_before_ms`, order preserved
pub fn filter_onsets(onsets_ms: &[f64], nothing_before_ms: f64) -> Vec<f64> {
    onsets_ms
        .iter()
        .copied()
        .filter(|&t| t >= nothing_before_ms)
        .collect()
}

// ============================================================================
// OnsetPipeline
// ============================================================================

/// Onset pipeline over injected collaborators
pub struct OnsetPipeline {
    decoder: Box<dyn AudioDecoder>,
    reducer: Box<dyn NoiseReducer>,
    detector: Box<dyn OnsetDetector>,
    renderer: Option<Box<dyn WaveformRenderer>>,
}

impl Default for OnsetPipeline {
    /// WAV decoding, spectral gating, spectral flux and a terminal plot
    fn default() -> Self {
        Self::new(
            Box::new(WavDecoder::new()),
            Box::new(SpectralGate::new()),
            Box::new(SpectralFluxDetector::new()),
        )
        .with_renderer(Box::new(TerminalPlot::new()))
    }
}

impl OnsetPipeline {
    /// Pipeline without a renderer; plotted runs fail until one is set
    pub fn new(
        decoder: Box<dyn AudioDecoder>,
        reducer: Box<dyn NoiseReducer>,
        detector: Box<dyn OnsetDetector>,
    ) -> Self {
        Self {
            decoder,
            reducer,
            detector,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn WaveformRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Run and print the summary line to stdout
    pub fn run(&self, path: &Path, config: &PipelineConfig) -> Result<OnsetReport> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.run_with_output(path, config, &mut out)
    }

    /// Run and write the summary line to `out`
    ///
    /// Nothing is written when any step fails.
    pub fn run_with_output<W: Write>(
        &self,
        path: &Path,
        config: &PipelineConfig,
        out: &mut W,
    ) -> Result<OnsetReport> {
        config.validate()?;
        info!("Detecting onsets in {}", path.display());

        let started = Instant::now();
        let signal = self.decoder.decode(path)?;
        debug!(
            "Decoded {} samples at {} Hz ({:.3}s) in {:.2?}",
            signal.len(),
            signal.sample_rate(),
            signal.duration_secs(),
            started.elapsed()
        );

        let step = Instant::now();
        let denoised = self.reducer.reduce(&signal)?;
        if denoised.len() != signal.len() || denoised.sample_rate() != signal.sample_rate() {
            return Err(OnsetError::ProcessingError {
                stage: "denoise",
                reason: format!(
                    "{} changed the signal shape ({} -> {} samples)",
                    self.reducer.name(),
                    signal.len(),
                    denoised.len()
                ),
            });
        }
        debug!("{} finished in {:.2?}", self.reducer.name(), step.elapsed());

        let step = Instant::now();
        let onsets_secs = self.detector.detect(&denoised)?;
        debug!(
            "{} found {} onsets in {:.2?}",
            self.detector.name(),
            onsets_secs.len(),
            step.elapsed()
        );

        let surviving_ms = filter_onsets(&to_milliseconds(&onsets_secs), config.nothing_before_ms);
        let onsets_ms = OnsetSet::first_of(&surviving_ms);
        if onsets_ms.len() < MAX_REPORTED_ONSETS {
            warn!(
                "Only {} onset(s) at or after {}ms in {}",
                onsets_ms.len(),
                config.nothing_before_ms,
                path.display()
            );
        }

        writeln!(out, "{}", onsets_ms.summary_line(config.nothing_before_ms))?;

        if config.plotted {
            let renderer = self.renderer.as_ref().ok_or_else(|| OnsetError::RenderError {
                reason: "no waveform renderer configured".to_string(),
                source: None,
            })?;
            let markers_secs: Vec<f64> = surviving_ms.iter().map(|ms| ms / 1000.0).collect();
            renderer.render(&denoised, &markers_secs)?;
        }

        Ok(OnsetReport {
            path: path.display().to_string(),
            sample_rate: signal.sample_rate(),
            duration_secs: signal.duration_secs(),
            nothing_before_ms: config.nothing_before_ms,
            detected: onsets_secs.len(),
            surviving_ms,
            onsets_ms,
        })
    }
}

/// Detect the first three onsets of a WAV file with the default pipeline
///
/// Prints a summary line, optionally shows the terminal plot, and returns
/// up to three onset times in milliseconds rounded to 0.1 ms.
pub fn find_speech_onset(
    path: impl AsRef<Path>,
    nothing_before_ms: f64,
    plotted: bool,
) -> Result<OnsetSet> {
    let config = PipelineConfig::new(nothing_before_ms, plotted);
    let report = OnsetPipeline::default().run(path.as_ref(), &config)?;
    Ok(report.onsets_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AudioSignal;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use test_case::test_case;

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    struct FakeDecoder {
        samples: usize,
    }

    impl AudioDecoder for FakeDecoder {
        fn decode(&self, path: &Path) -> Result<AudioSignal> {
            if path.to_string_lossy().contains("missing") {
                return Err(OnsetError::FileNotFound {
                    path: path.display().to_string(),
                    source: None,
                });
            }
            AudioSignal::new(vec![0.25; self.samples], 1000)
        }
    }

    struct Passthrough;

    impl NoiseReducer for Passthrough {
        fn reduce(&self, signal: &AudioSignal) -> Result<AudioSignal> {
            Ok(signal.clone())
        }

        fn name(&self) -> &'static str {
            "passthrough"
        }
    }

    struct Truncating;

    impl NoiseReducer for Truncating {
        fn reduce(&self, signal: &AudioSignal) -> Result<AudioSignal> {
            Ok(signal.with_samples(signal.samples()[1..].to_vec()))
        }

        fn name(&self) -> &'static str {
            "truncating"
        }
    }

    struct FixedOnsets(Vec<f64>);

    impl OnsetDetector for FixedOnsets {
        fn detect(&self, _signal: &AudioSignal) -> Result<Vec<f64>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[derive(Clone, Default)]
    struct RecordingRenderer {
        calls: Arc<Mutex<Vec<(usize, Vec<f64>)>>>,
    }

    impl WaveformRenderer for RecordingRenderer {
        fn render(&self, signal: &AudioSignal, onsets_secs: &[f64]) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((signal.len(), onsets_secs.to_vec()));
            Ok(())
        }
    }

    fn pipeline(onsets_secs: Vec<f64>) -> OnsetPipeline {
        OnsetPipeline::new(
            Box::new(FakeDecoder { samples: 3000 }),
            Box::new(Passthrough),
            Box::new(FixedOnsets(onsets_secs)),
        )
    }

    fn run(p: &OnsetPipeline, config: PipelineConfig) -> (Result<OnsetReport>, String) {
        let mut out = Vec::new();
        let result = p.run_with_output(&PathBuf::from("clip.wav"), &config, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    // ------------------------------------------------------------------
    // Conversion
    // ------------------------------------------------------------------

    #[test]
    fn test_to_milliseconds_rounds_to_tenth() {
        assert_eq!(
            to_milliseconds(&[0.0, 0.10004, 0.5, 1.23456]),
            vec![0.0, 100.0, 500.0, 1234.6]
        );
    }

    #[test_case(0.0, &[0.0, 100.0, 1000.0, 2500.0] ; "zero keeps everything")]
    #[test_case(100.0, &[100.0, 1000.0, 2500.0] ; "threshold is inclusive")]
    #[test_case(500.0, &[1000.0, 2500.0] ; "drops early onsets")]
    #[test_case(3000.0, &[] ; "drops everything")]
    fn test_filter_onsets(threshold: f64, expected: &[f64]) {
        let onsets = [0.0, 100.0, 1000.0, 2500.0];
        assert_eq!(filter_onsets(&onsets, threshold), expected.to_vec());
    }

    #[test]
    fn test_onset_set_caps_at_three() {
        let set = OnsetSet::first_of(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(set.to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(OnsetSet::first_of(&[7.5]).len(), 1);
    }

    #[test_case(&[], "No onsets found at or after 250ms" ; "none")]
    #[test_case(&[500.0], "First onset is: 500.0ms" ; "one")]
    #[test_case(&[500.0, 612.3], "First two onsets are: 500.0ms and 612.3ms" ; "two")]
    #[test_case(
        &[100.0, 1000.0, 2500.5],
        "First three onsets are: 100.0ms, 1000.0ms, and 2500.5ms" ;
        "three"
    )]
    fn test_summary_line(onsets: &[f64], expected: &str) {
        assert_eq!(OnsetSet::first_of(onsets).summary_line(250.0), expected);
    }

    // ------------------------------------------------------------------
    // Pipeline
    // ------------------------------------------------------------------

    #[test]
    fn test_returns_first_three_in_milliseconds() {
        let p = pipeline(vec![0.05, 0.1, 1.0, 2.5]);
        let (result, printed) = run(&p, PipelineConfig::new(0.0, false));
        let report = result.unwrap();

        assert_eq!(report.onsets_ms.to_vec(), vec![50.0, 100.0, 1000.0]);
        assert_eq!(report.detected, 4);
        assert_eq!(report.surviving_ms, vec![50.0, 100.0, 1000.0, 2500.0]);
        assert_eq!(
            printed,
            "First three onsets are: 50.0ms, 100.0ms, and 1000.0ms\n"
        );
    }

    #[test]
    fn test_threshold_filters_before_selection() {
        let p = pipeline(vec![0.1, 1.0, 2.5]);
        let (result, printed) = run(&p, PipelineConfig::new(500.0, false));

        assert_eq!(result.unwrap().onsets_ms.to_vec(), vec![1000.0, 2500.0]);
        assert_eq!(printed, "First two onsets are: 1000.0ms and 2500.0ms\n");
    }

    #[test]
    fn test_no_survivors_is_empty_not_error() {
        let p = pipeline(vec![0.1]);
        let (result, printed) = run(&p, PipelineConfig::new(200.0, false));
        assert!(result.unwrap().onsets_ms.is_empty());
        assert_eq!(printed, "No onsets found at or after 200ms\n");
    }

    #[test]
    fn test_decode_failure_prints_nothing() {
        let p = pipeline(vec![0.1]);
        let mut out = Vec::new();
        let result = p.run_with_output(
            &PathBuf::from("missing.wav"),
            &PipelineConfig::default(),
            &mut out,
        );
        assert!(matches!(result, Err(OnsetError::FileNotFound { .. })));
        assert!(out.is_empty());
    }

    #[test_case(-1.0 ; "negative")]
    #[test_case(f64::NAN ; "nan")]
    #[test_case(f64::INFINITY ; "infinite")]
    fn test_invalid_threshold_rejected(threshold: f64) {
        let p = pipeline(vec![0.1]);
        let (result, printed) = run(&p, PipelineConfig::new(threshold, false));
        assert!(matches!(result, Err(OnsetError::InvalidParameter { .. })));
        assert!(printed.is_empty());
    }

    #[test]
    fn test_reducer_changing_length_is_rejected() {
        let p = OnsetPipeline::new(
            Box::new(FakeDecoder { samples: 100 }),
            Box::new(Truncating),
            Box::new(FixedOnsets(vec![0.01])),
        );
        let (result, printed) = run(&p, PipelineConfig::default());
        assert_eq!(result.unwrap_err().error_code(), "PROCESSING_ERROR");
        assert!(printed.is_empty());
    }

    #[test]
    fn test_plot_receives_seconds_and_same_result() {
        let renderer = RecordingRenderer::default();
        let plotted = pipeline(vec![0.1, 1.0, 2.5, 2.9]).with_renderer(Box::new(renderer.clone()));

        let (with_plot, printed_plot) = run(&plotted, PipelineConfig::new(500.0, true));
        let (without_plot, printed_plain) = run(&plotted, PipelineConfig::new(500.0, false));

        assert_eq!(with_plot.unwrap(), without_plot.unwrap());
        assert_eq!(printed_plot, printed_plain);

        let calls = renderer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 3000);
        assert_eq!(calls[0].1, vec![1.0, 2.5, 2.9]);
    }

    #[test]
    fn test_plot_without_renderer_fails() {
        let p = pipeline(vec![0.1]);
        let (result, _) = run(&p, PipelineConfig::new(0.0, true));
        assert_eq!(result.unwrap_err().error_code(), "RENDER_ERROR");
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = PipelineConfig::new(120.5, true);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"nothing_before_ms":120.5,"plotted":true}"#);
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
