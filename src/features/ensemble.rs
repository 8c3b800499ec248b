//! Channel-wise ensembling of several encoders.

use candle_core::{DType, Tensor};

use super::resample::{resample_time, TemporalResampler};
use crate::audio::{AudioBuffer, WaveformNormalizer};
use crate::models::Encoder;
use crate::{Error, ExecutionContext, Result};

/// Concatenate `[B, C_i, T]` tensors along the channel axis, in list order.
///
/// Batch size and frame count must agree across members; the first
/// disagreeing member is named in the error.
pub fn concat_channels(features: &[Tensor]) -> Result<Tensor> {
    let Some(first) = features.first() else {
        return Err(Error::Config("cannot concatenate an empty feature list".into()));
    };
    let (batch, _, frames) = first.dims3()?;

    for (i, feature) in features.iter().enumerate().skip(1) {
        let (b, _, t) = feature.dims3()?;
        if b != batch || t != frames {
            return Err(Error::ShapeMismatch(format!(
                "ensemble member {i} has batch {b} and {t} frames, member 0 has batch {batch} and {frames} frames"
            )));
        }
    }

    if features.len() == 1 {
        return Ok(first.clone());
    }
    Ok(Tensor::cat(features, 1)?)
}

/// One encoder with the input normalization its checkpoint expects.
pub struct EnsembleMember {
    pub name: String,
    pub normalizer: WaveformNormalizer,
    pub encoder: Box<dyn Encoder>,
}

impl EnsembleMember {
    pub fn new(
        name: impl Into<String>,
        normalizer: WaveformNormalizer,
        encoder: Box<dyn Encoder>,
    ) -> Self {
        Self {
            name: name.into(),
            normalizer,
            encoder,
        }
    }

    /// `[B, C, T]` f32 features for 16 kHz `audio`.
    pub fn features(&self, audio: &AudioBuffer, ctx: &ExecutionContext) -> Result<Tensor> {
        let input_values = self.normalizer.input_values(audio, &ctx.device)?;
        let hidden = self.encoder.encode(&input_values, ctx)?;
        Ok(hidden.to_dtype(DType::F32)?.transpose(1, 2)?.contiguous()?)
    }
}

/// Runs every member over the same audio, stacks their channels and applies
/// the optional temporal resampling.
pub struct EnsembleCombiner {
    members: Vec<EnsembleMember>,
    resampler: Option<TemporalResampler>,
}

impl EnsembleCombiner {
    pub fn new(members: Vec<EnsembleMember>, resampler: Option<TemporalResampler>) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::Config("an ensemble needs at least one model".into()));
        }
        Ok(Self { members, resampler })
    }

    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    pub fn resampler(&self) -> Option<&TemporalResampler> {
        self.resampler.as_ref()
    }

    /// Sum of the members' embedding widths
    pub fn output_channels(&self) -> usize {
        self.members.iter().map(|m| m.encoder.hidden_size()).sum()
    }

    pub fn combine(&self, audio: &AudioBuffer, ctx: &ExecutionContext) -> Result<Tensor> {
        let mut features = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let feature = member.features(audio, ctx)?;
            tracing::debug!(member = %member.name, shape = ?feature.dims(), "ensemble member");
            features.push(feature);
        }
        let combined = concat_channels(&features)?;
        resample_time(&combined, self.resampler.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    /// Encoder emitting a constant per member, one frame per 320 samples.
    struct ConstEncoder {
        value: f32,
        channels: usize,
        device: Device,
    }

    impl Encoder for ConstEncoder {
        fn encode(&self, input_values: &Tensor, ctx: &ExecutionContext) -> Result<Tensor> {
            ctx.ensure_same_device(&self.device)?;
            let (batch, samples) = input_values.dims2()?;
            let frames = samples / 320;
            let ones = Tensor::ones((batch, frames, self.channels), DType::F32, &self.device)?;
            Ok((ones * self.value as f64)?)
        }

        fn hidden_size(&self) -> usize {
            self.channels
        }

        fn device(&self) -> &Device {
            &self.device
        }
    }

    fn member(name: &str, value: f32, channels: usize) -> EnsembleMember {
        EnsembleMember::new(
            name,
            WaveformNormalizer::new(false),
            Box::new(ConstEncoder {
                value,
                channels,
                device: Device::Cpu,
            }),
        )
    }

    #[test]
    fn test_concat_preserves_order() {
        let dev = Device::Cpu;
        let a = Tensor::zeros((1, 2, 5), DType::F32, &dev).unwrap();
        let b = Tensor::ones((1, 3, 5), DType::F32, &dev).unwrap();
        let out = concat_channels(&[a, b]).unwrap();
        assert_eq!(out.dims(), &[1, 5, 5]);
        let values = out.to_vec3::<f32>().unwrap();
        assert!(values[0][..2].iter().flatten().all(|v| *v == 0.0));
        assert!(values[0][2..].iter().flatten().all(|v| *v == 1.0));
    }

    #[test]
    fn test_concat_empty_list() {
        assert!(matches!(concat_channels(&[]), Err(Error::Config(_))));
    }

    #[test]
    fn test_concat_time_mismatch() {
        let dev = Device::Cpu;
        let a = Tensor::zeros((1, 2, 5), DType::F32, &dev).unwrap();
        let b = Tensor::zeros((1, 2, 6), DType::F32, &dev).unwrap();
        match concat_channels(&[a, b]) {
            Err(Error::ShapeMismatch(msg)) => assert!(msg.contains("member 1")),
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_concat_batch_mismatch() {
        let dev = Device::Cpu;
        let a = Tensor::zeros((1, 2, 5), DType::F32, &dev).unwrap();
        let b = Tensor::zeros((2, 2, 5), DType::F32, &dev).unwrap();
        assert!(matches!(
            concat_channels(&[a, b]),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_empty_combiner_rejected() {
        assert!(matches!(
            EnsembleCombiner::new(Vec::new(), None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_combine_channel_blocks() {
        let combiner =
            EnsembleCombiner::new(vec![member("a", 1.0, 3), member("b", 2.0, 4)], None).unwrap();
        assert_eq!(combiner.output_channels(), 7);

        let audio = AudioBuffer::new(vec![0.1; 3200], 16000);
        let out = combiner.combine(&audio, &ExecutionContext::cpu()).unwrap();
        assert_eq!(out.dims(), &[1, 7, 10]);

        let values = out.to_vec3::<f32>().unwrap();
        assert!(values[0][..3].iter().flatten().all(|v| *v == 1.0));
        assert!(values[0][3..].iter().flatten().all(|v| *v == 2.0));
    }

    #[test]
    fn test_combine_with_downsample() {
        let resampler = TemporalResampler::new(2).unwrap();
        let combiner =
            EnsembleCombiner::new(vec![member("a", 1.0, 2), member("b", 3.0, 2)], Some(resampler))
                .unwrap();
        let audio = AudioBuffer::new(vec![0.0; 3200], 16000);
        let out = combiner.combine(&audio, &ExecutionContext::cpu()).unwrap();
        assert_eq!(out.dims(), &[1, 4, 5]);
    }
}
