//! Sample-rate conversion using rubato
//!
//! Every encoder consumes 16 kHz audio; inputs at any other rate go through
//! [`resample`] first.

use rubato::{
    audioadapter::Adapter, Async, FixedAsync, Resampler as RubatoResampler,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::{AudioBuffer, SAMPLE_RATE};
use crate::{Error, Result};

const CHUNK_SIZE: usize = 1024;

/// Sinc filter length and oversampling factor
const SINC_TAPS: usize = 128;

/// Resample audio to `target_rate` with a 128-tap sinc filter.
///
/// The output holds `ceil(len * target_rate / source_rate)` samples with
/// the filter delay removed, so it stays time-aligned with the input.
pub fn resample(audio: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    if audio.sample_rate == target_rate {
        return Ok(audio.clone());
    }
    if audio.sample_rate == 0 || target_rate == 0 {
        return Err(Error::Audio(format!(
            "cannot resample {} Hz -> {} Hz",
            audio.sample_rate, target_rate
        )));
    }
    if audio.is_empty() {
        return Ok(AudioBuffer::new(Vec::new(), target_rate));
    }

    let ratio = target_rate as f64 / audio.sample_rate as f64;
    let expected =
        (audio.len() as u64 * target_rate as u64).div_ceil(audio.sample_rate as u64) as usize;

    let params = SincInterpolationParameters {
        sinc_len: SINC_TAPS,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: SINC_TAPS,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        Async::<f32>::new_sinc(ratio, 1.0, &params, CHUNK_SIZE, 1, FixedAsync::Input)
            .map_err(|e| Error::Audio(format!("failed to create sinc resampler: {e}")))?;
    let samples = process_chunks(&mut resampler, &audio.samples, expected)?;

    tracing::debug!(
        from = audio.sample_rate,
        to = target_rate,
        in_len = audio.len(),
        out_len = samples.len(),
        "resampled"
    );

    Ok(AudioBuffer::new(samples, target_rate))
}

/// Feed `samples` through `resampler` in fixed-size chunks, flushing with
/// silence until the delayed tail has been produced.
fn process_chunks<R: RubatoResampler<f32>>(
    resampler: &mut R,
    samples: &[f32],
    expected: usize,
) -> Result<Vec<f32>> {
    use audioadapter_buffers::direct::SequentialSliceOfVecs;

    let delay = resampler.output_delay();
    let wanted = expected + delay;

    let mut output = Vec::with_capacity(wanted + CHUNK_SIZE);
    let mut pos = 0;

    while output.len() < wanted {
        let mut chunk = vec![0.0f32; CHUNK_SIZE];
        if pos < samples.len() {
            let end = (pos + CHUNK_SIZE).min(samples.len());
            chunk[..end - pos].copy_from_slice(&samples[pos..end]);
        }
        pos += CHUNK_SIZE;

        let input_vecs = vec![chunk];
        let input = SequentialSliceOfVecs::new(&input_vecs, 1, CHUNK_SIZE)
            .map_err(|e| Error::Audio(format!("failed to create input adapter: {e}")))?;

        let result = resampler
            .process(&input, 0, None)
            .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;

        for i in 0..result.frames() {
            output.push(result.read_sample(0, i).unwrap_or(0.0));
        }
    }

    Ok(output[delay..wanted].to_vec())
}

/// Resample to the 16 kHz encoder rate
pub fn resample_to_16k(audio: &AudioBuffer) -> Result<AudioBuffer> {
    resample(audio, SAMPLE_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_no_resample_needed() {
        let audio = AudioBuffer::new(vec![0.25; 1000], 16000);
        let result = resample_to_16k(&audio).unwrap();
        assert_eq!(result.sample_rate, 16000);
        assert_eq!(result.samples, audio.samples);
    }

    #[test]
    fn test_downsample_length() {
        // 48kHz -> 16kHz (one third)
        let audio = AudioBuffer::new(vec![0.0; 4800], 48000);
        let result = resample_to_16k(&audio).unwrap();
        assert_eq!(result.sample_rate, 16000);
        assert_eq!(result.len(), 1600);
    }

    #[test]
    fn test_upsample_length() {
        // 8kHz -> 16kHz (double)
        let audio = AudioBuffer::new(vec![0.0; 800], 8000);
        let result = resample_to_16k(&audio).unwrap();
        assert_eq!(result.len(), 1600);
    }

    #[test]
    fn test_resample_22050_length() {
        let audio = AudioBuffer::new(vec![0.0; 2205], 22050);
        let result = resample(&audio, 16000).unwrap();
        assert_eq!(result.sample_rate, 16000);
        assert_eq!(result.len(), 1600);
    }

    #[test]
    fn test_resample_preserves_sine_wave() {
        let freq = 200.0;
        let audio = AudioBuffer::new(
            (0..44100)
                .map(|i| (2.0 * PI * freq * i as f32 / 44100.0).sin())
                .collect(),
            44100,
        );

        let result = resample_to_16k(&audio).unwrap();

        let max_val = result
            .samples
            .iter()
            .map(|s| s.abs())
            .fold(0.0f32, f32::max);
        assert!(max_val > 0.8, "peak after resampling = {max_val}");
    }

    #[test]
    fn test_resample_empty_audio() {
        let audio = AudioBuffer::new(vec![], 44100);
        let result = resample_to_16k(&audio).unwrap();
        assert_eq!(result.sample_rate, 16000);
        assert!(result.is_empty());
    }

    #[test]
    fn test_resample_zero_rate_is_error() {
        let audio = AudioBuffer::new(vec![0.1; 10], 0);
        assert!(resample_to_16k(&audio).is_err());
    }
}
