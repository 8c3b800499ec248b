//! WAV decoding and the in-memory audio buffer.

use candle_core::Tensor;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

use crate::{Error, Result};

/// Mono waveform with its sample rate.
///
/// Samples are 32-bit floats in the range \[-1.0, 1.0\]. Multi-channel input
/// is averaged down to one channel when loaded.
///
/// # Example
///
/// ```rust,ignore
/// let audio = AudioBuffer::load("speech.wav")?;
/// println!("Duration: {:.2}s", audio.duration());
/// ```
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Mono audio samples in \[-1.0, 1.0\] range
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new audio buffer
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Build a mono buffer from a `[samples]`, `[1, samples]` or
    /// `[channels, samples]` tensor. Several channels are averaged.
    pub fn from_tensor(tensor: &Tensor, sample_rate: u32) -> Result<Self> {
        let mono = match tensor.rank() {
            1 => tensor.clone(),
            2 => tensor.mean(0)?,
            rank => {
                return Err(Error::Audio(format!(
                    "expected a 1-D or 2-D waveform tensor, got rank {rank}"
                )))
            }
        };
        let samples: Vec<f32> = mono.to_dtype(candle_core::DType::F32)?.to_vec1()?;
        Ok(Self::new(samples, sample_rate))
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Save to WAV file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_wav(path, &self.samples, self.sample_rate)
    }

    /// Load from WAV file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_wav(path)
    }
}

/// Load a WAV file into a mono [`AudioBuffer`] at its native sample rate.
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let reader = WavReader::open(path)
        .map_err(|e| Error::Audio(format!("failed to open {}: {e}", path.display())))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let mono_samples = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    tracing::debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels,
        frames = mono_samples.len(),
        "decoded wav"
    );

    Ok(AudioBuffer::new(mono_samples, spec.sample_rate))
}

/// Save mono samples as a 16-bit PCM WAV file.
pub fn save_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use tempfile::tempdir;

    #[test]
    fn test_audio_buffer_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 16000], 16000);
        assert!((buffer.duration() - 1.0).abs() < 1e-6);
        assert_eq!(buffer.len(), 16000);
        assert!(!buffer.is_empty());
        assert!(AudioBuffer::new(vec![], 16000).is_empty());
    }

    #[test]
    fn test_from_tensor_averages_channels() {
        let device = Device::Cpu;
        let tensor = Tensor::new(&[[0.2f32, 0.4, 0.6], [0.0, 0.0, 0.2]], &device).unwrap();
        let buffer = AudioBuffer::from_tensor(&tensor, 22050).unwrap();
        assert_eq!(buffer.sample_rate, 22050);
        let expected = [0.1f32, 0.2, 0.4];
        for (a, b) in buffer.samples.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_from_tensor_rejects_rank_3() {
        let tensor = Tensor::zeros((1, 1, 4), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            AudioBuffer::from_tensor(&tensor, 16000),
            Err(Error::Audio(_))
        ));
    }

    #[test]
    fn test_save_and_load_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("speech.wav");

        let original = AudioBuffer::new(vec![0.1, 0.2, -0.3, 0.4, -0.5], 16000);
        original.save(&path).unwrap();

        let loaded = AudioBuffer::load(&path).unwrap();
        assert_eq!(loaded.sample_rate, 16000);
        assert_eq!(loaded.len(), 5);
        for (a, b) in original.samples.iter().zip(loaded.samples.iter()) {
            assert!((a - b).abs() < 1e-4, "sample mismatch: {a} vs {b}");
        }
    }

    #[test]
    fn test_load_stereo_downmixes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for s in [0.5f32, -0.5, 1.0, 0.0] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let loaded = load_wav(&path).unwrap();
        assert_eq!(loaded.sample_rate, 44100);
        assert_eq!(loaded.samples, vec![0.0, 0.5]);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_wav("/nonexistent/path/to/file.wav");
        assert!(matches!(result, Err(Error::Audio(_))));
    }
}
