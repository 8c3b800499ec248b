//! Decode + resample step run before every encoder call, and the
//! per-model waveform normalization.

use candle_core::{Device, Tensor};
use std::path::Path;

use super::{load_wav, resample_to_16k, AudioBuffer, SAMPLE_RATE};
use crate::models::config::PreprocessorConfig;
use crate::{Error, Result};

/// Variance floor used by the wav2vec2-style input normalization.
const NORMALIZE_EPS: f64 = 1e-7;

/// Audio handed to an extractor.
#[derive(Debug, Clone, Copy)]
pub enum AudioInput<'a> {
    /// WAV file on disk, decoded at its native rate.
    Path(&'a Path),
    /// Mono samples already in memory.
    Samples {
        samples: &'a [f32],
        sample_rate: u32,
    },
    /// Decoded buffer.
    Buffer(&'a AudioBuffer),
    /// Waveform tensor, `[samples]` or `[channels, samples]`.
    Tensor {
        waveform: &'a Tensor,
        sample_rate: u32,
    },
}

impl<'a> From<&'a Path> for AudioInput<'a> {
    fn from(path: &'a Path) -> Self {
        AudioInput::Path(path)
    }
}

impl<'a> From<&'a AudioBuffer> for AudioInput<'a> {
    fn from(buffer: &'a AudioBuffer) -> Self {
        AudioInput::Buffer(buffer)
    }
}

/// Decode `input` to mono and resample it to 16 kHz.
pub fn preprocess(input: AudioInput<'_>) -> Result<AudioBuffer> {
    let audio = match input {
        AudioInput::Path(path) => load_wav(path)?,
        AudioInput::Samples {
            samples,
            sample_rate,
        } => AudioBuffer::new(samples.to_vec(), sample_rate),
        AudioInput::Buffer(buffer) => buffer.clone(),
        AudioInput::Tensor {
            waveform,
            sample_rate,
        } => AudioBuffer::from_tensor(waveform, sample_rate)?,
    };

    if audio.sample_rate == SAMPLE_RATE {
        return Ok(audio);
    }
    resample_to_16k(&audio)
}

/// Turns a 16 kHz waveform into the `[1, N]` input tensor an encoder expects.
///
/// With `do_normalize` set, samples are shifted to zero mean and scaled to unit
/// variance (`(x - mean) / sqrt(var + 1e-7)`), matching the wav2vec2 feature
/// extractor most HuBERT checkpoints ship with.
#[derive(Debug, Clone, Copy)]
pub struct WaveformNormalizer {
    do_normalize: bool,
}

impl WaveformNormalizer {
    pub fn new(do_normalize: bool) -> Self {
        Self { do_normalize }
    }

    pub fn from_config(config: &PreprocessorConfig) -> Result<Self> {
        if config.sampling_rate != SAMPLE_RATE {
            return Err(Error::Config(format!(
                "preprocessor expects {} Hz input, only {} Hz is supported",
                config.sampling_rate, SAMPLE_RATE
            )));
        }
        Ok(Self::new(config.do_normalize))
    }

    pub fn do_normalize(&self) -> bool {
        self.do_normalize
    }

    /// Normalized samples, without building a tensor.
    pub fn normalize(&self, samples: &[f32]) -> Vec<f32> {
        if !self.do_normalize || samples.is_empty() {
            return samples.to_vec();
        }
        // Accumulate in f64; f32 sums drift by several percent on long clips.
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
        let var = samples
            .iter()
            .map(|&s| {
                let d = s as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let inv_std = 1.0 / (var + NORMALIZE_EPS).sqrt();
        samples
            .iter()
            .map(|&s| ((s as f64 - mean) * inv_std) as f32)
            .collect()
    }

    /// `[1, N]` f32 tensor on `device`.
    pub fn input_values(&self, audio: &AudioBuffer, device: &Device) -> Result<Tensor> {
        if audio.sample_rate != SAMPLE_RATE {
            return Err(Error::Audio(format!(
                "encoder input must be {SAMPLE_RATE} Hz, got {} Hz",
                audio.sample_rate
            )));
        }
        let values = self.normalize(&audio.samples);
        let len = values.len();
        Ok(Tensor::from_vec(values, (1, len), device)?)
    }
}

impl Default for WaveformNormalizer {
    fn default() -> Self {
        Self::new(true)
    }
}
