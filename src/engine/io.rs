//! Audio file I/O
//!
//! Reads WAV files into an [`AudioSignal`] and writes them back out for
//! fixtures. Samples are converted to f32 by type conversion only: integer
//! PCM keeps its native scale (16-bit spans ±32768), float WAVs are read
//! unchanged. Multi-channel files are averaged down to mono.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;
use num_traits::AsPrimitive;

use crate::engine::buffer::{downmix_interleaved, AudioSignal};
use crate::error::{OnsetError, Result};
use crate::pipeline::AudioDecoder;

/// WAV decoder backed by `hound`
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn new() -> Self {
        WavDecoder
    }
}

impl AudioDecoder for WavDecoder {
    fn decode(&self, path: &Path) -> Result<AudioSignal> {
        import_audio(path)
    }
}

/// Import a WAV file as a mono signal
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `InvalidAudio` - If the file is not a valid WAV file
/// * `UnsupportedFormat` - If the bit depth cannot be read
/// * `EmptyAudio` - If the file holds no sample frames
pub fn import_audio(path: &Path) -> Result<AudioSignal> {
    if !path.exists() {
        return Err(OnsetError::FileNotFound {
            path: path.display().to_string(),
            source: None,
        });
    }

    let reader = WavReader::open(path).map_err(|e| OnsetError::InvalidAudio {
        reason: format!("Failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(OnsetError::UnsupportedFormat {
            format: "0-channel audio".to_string(),
        });
    }

    debug!(
        "Decoding {}: {} Hz, {} ch, {}-bit {:?}",
        path.display(),
        spec.sample_rate,
        channels,
        spec.bits_per_sample,
        spec.sample_format
    );

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    let mono = downmix_interleaved(&interleaved, channels);

    if mono.is_empty() {
        return Err(OnsetError::EmptyAudio);
    }

    AudioSignal::new(mono, spec.sample_rate)
}

/// Write a mono signal as 16-bit PCM or 32-bit float WAV
///
/// Samples are written on the scale they carry: for 16-bit output they are
/// rounded and clamped to the i16 range, not rescaled.
pub fn write_wav(signal: &AudioSignal, path: &Path, bit_depth: u16) -> Result<()> {
    let sample_format = match bit_depth {
        16 => SampleFormat::Int,
        32 => SampleFormat::Float,
        _ => {
            return Err(OnsetError::UnsupportedFormat {
                format: format!("{}-bit output (only 16 and 32 supported)", bit_depth),
            })
        }
    };

    let spec = WavSpec {
        channels: 1,
        sample_rate: signal.sample_rate(),
        bits_per_sample: bit_depth,
        sample_format,
    };

    let mut writer = WavWriter::create(path, spec).map_err(hound_to_io)?;

    for &sample in signal.samples() {
        match sample_format {
            SampleFormat::Int => {
                let value = sample.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                writer.write_sample(value).map_err(hound_to_io)?;
            }
            SampleFormat::Float => writer.write_sample(sample).map_err(hound_to_io)?,
        }
    }

    writer.finalize().map_err(hound_to_io)?;
    Ok(())
}

/// Generate a sine tone that starts at `start_secs` and runs to the end
///
/// Samples before `start_secs` are zero. `total_secs` sets the clip length.
pub fn generate_tone(
    frequency: f32,
    amplitude: f32,
    start_secs: f32,
    total_secs: f32,
    sample_rate: u32,
) -> Result<AudioSignal> {
    generate_tone_bursts(
        &[(start_secs, total_secs - start_secs)],
        frequency,
        amplitude,
        total_secs,
        sample_rate,
    )
}

/// Release time of every generated burst
pub const BURST_RELEASE_SECS: f32 = 0.05;

/// Generate a clip of sine bursts, each given as `(start_secs, length_secs)`
///
/// The onset edge is left sharp. Each burst ends with a raised-cosine
/// release of [`BURST_RELEASE_SECS`]; a hard cut spreads energy into the
/// neighbouring mel bands and reads as a second onset.
pub fn generate_tone_bursts(
    bursts: &[(f32, f32)],
    frequency: f32,
    amplitude: f32,
    total_secs: f32,
    sample_rate: u32,
) -> Result<AudioSignal> {
    let rate = sample_rate;
    let num_samples = (total_secs * rate as f32) as usize;
    let mut samples = vec![0.0_f32; num_samples];
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / rate as f32;
    let release = ((BURST_RELEASE_SECS * rate as f32) as usize).max(1);

    for &(start, length) in bursts {
        let first = (start * rate as f32) as usize;
        let last = ((start + length) * rate as f32) as usize;
        let last = last.min(num_samples);
        for i in first..last {
            let remaining = last - i;
            let gain = if remaining < release {
                let x = remaining as f32 / release as f32;
                0.5 - 0.5 * (std::f32::consts::PI * x).cos()
            } else {
                1.0
            };
            samples[i] = amplitude * gain * (angular_freq * (i - first) as f32).sin();
        }
    }

    AudioSignal::new(samples, rate)
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn hound_to_io(e: hound::Error) -> OnsetError {
    match e {
        hound::Error::IoError(io) => OnsetError::Io(io),
        other => OnsetError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Collect samples of type `S`, converting each to f32 without rescaling
fn collect_as_f32<R, S>(reader: WavReader<R>, bits: u16) -> Result<Vec<f32>>
where
    R: std::io::Read,
    S: hound::Sample + AsPrimitive<f32>,
{
    let mut reader = reader;
    reader
        .samples::<S>()
        .map(|s| s.map(|v| v.as_()))
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(|e| OnsetError::InvalidAudio {
            reason: format!("Failed to read {}-bit samples: {}", bits, e),
            source: Some(Box::new(e)),
        })
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    match sample_format {
        SampleFormat::Float => collect_as_f32::<R, f32>(reader, bits_per_sample),
        SampleFormat::Int => match bits_per_sample {
            // hound yields 8-bit PCM already re-centred around zero
            8 => collect_as_f32::<R, i8>(reader, bits_per_sample),
            16 => collect_as_f32::<R, i16>(reader, bits_per_sample),
            // 24-bit stored as i32 in hound
            24 | 32 => collect_as_f32::<R, i32>(reader, bits_per_sample),
            _ => Err(OnsetError::UnsupportedFormat {
                format: format!("{}-bit integer audio", bits_per_sample),
            }),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn write_stereo_i16(path: &Path, frames: &[(i16, i16)], sample_rate: u32) {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &(l, r) in frames {
            writer.write_sample(l).unwrap();
            writer.write_sample(r).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_import_nonexistent_file() {
        let result = import_audio(Path::new("/nonexistent/path/audio.wav"));

        match result.unwrap_err() {
            OnsetError::FileNotFound { path, .. } => {
                assert!(path.contains("nonexistent"));
            }
            other => panic!("Expected FileNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_import_garbage_is_invalid_audio() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not_a_wav.wav");
        std::fs::write(&path, b"definitely not RIFF data").unwrap();

        let err = import_audio(&path).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_AUDIO");
    }

    #[test]
    fn test_int16_keeps_native_scale() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pcm16.wav");
        let signal = AudioSignal::new(vec![0.0, 1000.0, -32768.0, 32767.0], 8000).unwrap();

        write_wav(&signal, &path, 16).unwrap();
        let decoded = WavDecoder::new().decode(&path).unwrap();

        assert_eq!(decoded.sample_rate(), 8000);
        assert_eq!(decoded.samples(), &[0.0, 1000.0, -32768.0, 32767.0]);
    }

    #[test]
    fn test_float_wav_read_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let signal = generate_tone(440.0, 0.5, 0.0, 0.1, 16000).unwrap();

        write_wav(&signal, &path, 32).unwrap();
        let decoded = import_audio(&path).unwrap();

        assert_eq!(decoded.len(), signal.len());
        for (a, b) in decoded.samples().iter().zip(signal.samples()) {
            assert_relative_eq!(a, b);
        }
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo_i16(&path, &[(100, 300), (-200, 0), (10, 10)], 22050);

        let decoded = import_audio(&path).unwrap();
        assert_eq!(decoded.samples(), &[200.0, -100.0, 10.0]);
        assert_eq!(decoded.sample_rate(), 22050);
    }

    #[test]
    fn test_empty_wav_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_stereo_i16(&path, &[], 44100);

        assert!(matches!(import_audio(&path), Err(OnsetError::EmptyAudio)));
    }

    #[test]
    fn test_unsupported_output_depth() {
        let dir = tempdir().unwrap();
        let signal = generate_tone(440.0, 0.5, 0.0, 0.01, 8000).unwrap();
        let result = write_wav(&signal, &dir.path().join("x.wav"), 24);
        assert!(matches!(result, Err(OnsetError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_tone_bursts_are_silent_between() {
        let clip = generate_tone_bursts(&[(0.1, 0.1), (0.5, 0.1)], 1000.0, 1.0, 1.0, 8000).unwrap();
        assert_eq!(clip.len(), 8000);
        // Before first burst and in the gap
        assert!(clip.samples()[..800].iter().all(|&s| s == 0.0));
        assert!(clip.samples()[1700..4000].iter().all(|&s| s == 0.0));
        // Inside a burst
        assert!(clip.samples()[800..1600].iter().any(|s| s.abs() > 0.9));
    }

    #[test]
    fn test_burst_release_is_gradual() {
        let rate = 8000;
        let clip = generate_tone_bursts(&[(0.1, 0.3)], 1000.0, 1.0, 1.0, rate).unwrap();
        let end = 3200;
        let release = (BURST_RELEASE_SECS * rate as f32) as usize;
        let peak = |range: std::ops::Range<usize>| {
            clip.samples()[range].iter().fold(0.0_f32, |m, s| m.max(s.abs()))
        };

        // Full level before the release, fading through it, silent after
        assert!(peak(end - 2 * release..end - release) > 0.9);
        let early = peak(end - release..end - release / 2);
        let late = peak(end - release / 4..end);
        assert!(early > late, "{} vs {}", early, late);
        assert!(late < 0.2);
        assert!(clip.samples()[end..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_generate_tone_starts_late() {
        let clip = generate_tone(1000.0, 0.8, 0.5, 2.0, 8000).unwrap();
        assert_eq!(clip.len(), 16000);
        assert!(clip.samples()[..4000].iter().all(|&s| s == 0.0));
        assert!(clip.samples()[4000..].iter().any(|s| s.abs() > 0.7));
    }
}
