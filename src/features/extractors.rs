//! HuBERT feature extractors
//!
//! - [`ChineseHubertSoft`]: HuBERT base, 256-channel projection, top-k gate
//! - [`ChineseHubert`]: last hidden state of a single HuBERT model
//! - [`EnsembleHubert`]: channel concatenation of several HuBERT models
//!
//! All three share the same audio path: [`preprocess`] to 16 kHz mono, then
//! the checkpoint's [`WaveformNormalizer`], then the encoder.

use candle_core::{DType, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

use super::ensemble::{EnsembleCombiner, EnsembleMember};
use super::gate::TopKGate;
use super::resample::{resample_time, TemporalResampler};
use super::FeatureExtractor;
use crate::audio::{preprocess, AudioInput, WaveformNormalizer};
use crate::config::{
    ChineseHubertOptions, ChineseHubertSoftOptions, EnsembleHubertOptions, CHINESE_HUBERT_BASE,
    SOFT_CHECKPOINT_URL,
};
use crate::hub::{download_release_checkpoint, ModelPaths};
use crate::models::{load_weights, Encoder, HubertConfig, HubertModel, PreprocessorConfig};
use crate::{Error, ExecutionContext, Result};

/// Width of the soft-unit projection
pub const SOFT_UNIT_DIM: usize = 256;

/// Build a HuBERT model from a resolved model directory or hub id.
fn load_hubert(model_id: &str, ctx: &ExecutionContext) -> Result<(WaveformNormalizer, HubertModel)> {
    let paths = ModelPaths::resolve(model_id)?;
    let (config, preprocessor) = paths.load_configs()?;
    let normalizer = WaveformNormalizer::from_config(&preprocessor)?;
    let vb = load_weights(paths.weights_path()?, ctx)?;
    let model = HubertModel::load(&config, vb)?;
    tracing::info!(
        model = model_id,
        hidden_size = config.hidden_size,
        layers = config.num_hidden_layers,
        "Loaded HuBERT"
    );
    Ok((normalizer, model))
}

// ── ChineseHubertSoft ───────────────────────────────────────────────────────

/// Soft speech units: HuBERT base hidden states projected to 256 channels
/// and sparsified by a [`TopKGate`].
///
/// Output is `[B, 256, T]`; every frame has `gate_size` non-zero channels
/// summing to one.
pub struct ChineseHubertSoft {
    normalizer: WaveformNormalizer,
    encoder: HubertModel,
    proj: Linear,
    gate: TopKGate,
}

impl ChineseHubertSoft {
    /// Load the encoder layout from the HuBERT base config and every weight
    /// from the soft checkpoint.
    ///
    /// `checkpoint_path` wins over `pretrained`; with neither there are no
    /// projection weights and construction fails.
    pub fn new(options: &ChineseHubertSoftOptions, ctx: &ExecutionContext) -> Result<Self> {
        let gate = TopKGate::new(options.gate_size)?;
        if gate.gate_size() > SOFT_UNIT_DIM {
            return Err(Error::Config(format!(
                "gate size {} exceeds the {SOFT_UNIT_DIM} soft-unit channels",
                gate.gate_size()
            )));
        }

        let checkpoint = match (&options.checkpoint_path, options.pretrained) {
            (Some(path), _) => path.clone(),
            (None, true) => download_release_checkpoint(SOFT_CHECKPOINT_URL)?,
            (None, false) => {
                return Err(Error::Config(
                    "ChineseHubertSoft needs pretrained = true or a checkpoint_path".into(),
                ))
            }
        };

        let paths = ModelPaths::resolve_configs(CHINESE_HUBERT_BASE)?;
        let (config, preprocessor) = paths.load_configs()?;
        let vb = load_weights(&checkpoint, ctx)?;
        let extractor = Self::from_var_builder(&config, &preprocessor, gate, vb)?;
        tracing::info!(
            checkpoint = %checkpoint.display(),
            gate_size = options.gate_size,
            "Loaded ChineseHubertSoft"
        );
        Ok(extractor)
    }

    /// Build from checkpoint weights: encoder under `model.*`, projection
    /// under `proj.1.*`.
    pub fn from_var_builder(
        config: &HubertConfig,
        preprocessor: &PreprocessorConfig,
        gate: TopKGate,
        vb: VarBuilder,
    ) -> Result<Self> {
        let normalizer = WaveformNormalizer::from_config(preprocessor)?;
        let encoder = HubertModel::new(config, vb.pp("model"))?;
        let proj = linear(config.hidden_size, SOFT_UNIT_DIM, vb.pp("proj").pp(1))?;
        Ok(Self {
            normalizer,
            encoder,
            proj,
            gate,
        })
    }

    pub fn gate(&self) -> &TopKGate {
        &self.gate
    }
}

impl FeatureExtractor for ChineseHubertSoft {
    fn name(&self) -> &'static str {
        "ChineseHubertSoft"
    }

    fn output_channels(&self) -> usize {
        SOFT_UNIT_DIM
    }

    #[cfg_attr(feature = "profiling", tracing::instrument(name = "soft_extract", skip_all))]
    fn extract(&self, input: AudioInput<'_>, ctx: &ExecutionContext) -> Result<Tensor> {
        ctx.ensure_same_device(self.encoder.device())?;
        let audio = preprocess(input)?;
        let input_values = self.normalizer.input_values(&audio, &ctx.device)?;

        let hidden = self.encoder.encode(&input_values, ctx)?;
        let units = self.proj.forward(&hidden)?.to_dtype(DType::F32)?;
        let gated = self.gate.forward(&units, 2)?;

        let features = gated.transpose(1, 2)?.contiguous()?;
        tracing::debug!(shape = ?features.dims(), "soft units");
        Ok(features)
    }
}

// ── ChineseHubert ───────────────────────────────────────────────────────────

/// Last hidden state of one HuBERT model as `[B, C, T]`, optionally
/// resampled to `T / downsample` frames.
pub struct ChineseHubert {
    normalizer: WaveformNormalizer,
    encoder: Box<dyn Encoder>,
    resampler: Option<TemporalResampler>,
}

impl ChineseHubert {
    pub fn new(options: &ChineseHubertOptions, ctx: &ExecutionContext) -> Result<Self> {
        let resampler = TemporalResampler::from_option(options.downsample)?;
        let (normalizer, model) = load_hubert(&options.model, ctx)?;
        Ok(Self::from_encoder(Box::new(model), normalizer, resampler))
    }

    /// Wrap an already-built encoder.
    pub fn from_encoder(
        encoder: Box<dyn Encoder>,
        normalizer: WaveformNormalizer,
        resampler: Option<TemporalResampler>,
    ) -> Self {
        Self {
            normalizer,
            encoder,
            resampler,
        }
    }

    pub fn resampler(&self) -> Option<&TemporalResampler> {
        self.resampler.as_ref()
    }
}

impl FeatureExtractor for ChineseHubert {
    fn name(&self) -> &'static str {
        "ChineseHubert"
    }

    fn output_channels(&self) -> usize {
        self.encoder.hidden_size()
    }

    #[cfg_attr(feature = "profiling", tracing::instrument(name = "hubert_extract", skip_all))]
    fn extract(&self, input: AudioInput<'_>, ctx: &ExecutionContext) -> Result<Tensor> {
        ctx.ensure_same_device(self.encoder.device())?;
        let audio = preprocess(input)?;
        let input_values = self.normalizer.input_values(&audio, &ctx.device)?;

        let hidden = self.encoder.encode(&input_values, ctx)?;
        let features = hidden.to_dtype(DType::F32)?.transpose(1, 2)?.contiguous()?;
        resample_time(&features, self.resampler.as_ref())
    }
}

// ── EnsembleHubert ──────────────────────────────────────────────────────────

/// Several HuBERT models over the same audio, concatenated on channels in
/// model-list order.
pub struct EnsembleHubert {
    combiner: EnsembleCombiner,
}

impl EnsembleHubert {
    pub fn new(options: &EnsembleHubertOptions, ctx: &ExecutionContext) -> Result<Self> {
        if options.models.is_empty() {
            return Err(Error::Config("EnsembleHubert needs at least one model".into()));
        }
        let resampler = TemporalResampler::from_option(options.downsample)?;

        let members = options
            .models
            .iter()
            .map(|model_id| -> Result<EnsembleMember> {
                let (normalizer, model) = load_hubert(model_id, ctx)?;
                Ok(EnsembleMember::new(model_id.as_str(), normalizer, Box::new(model)))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_members(members, resampler)
    }

    pub fn from_members(
        members: Vec<EnsembleMember>,
        resampler: Option<TemporalResampler>,
    ) -> Result<Self> {
        Ok(Self {
            combiner: EnsembleCombiner::new(members, resampler)?,
        })
    }

    pub fn combiner(&self) -> &EnsembleCombiner {
        &self.combiner
    }
}

impl FeatureExtractor for EnsembleHubert {
    fn name(&self) -> &'static str {
        "EnsembleHubert"
    }

    fn output_channels(&self) -> usize {
        self.combiner.output_channels()
    }

    #[cfg_attr(feature = "profiling", tracing::instrument(name = "ensemble_extract", skip_all))]
    fn extract(&self, input: AudioInput<'_>, ctx: &ExecutionContext) -> Result<Tensor> {
        for member in self.combiner.members() {
            ctx.ensure_same_device(member.encoder.device())?;
        }
        let audio = preprocess(input)?;
        self.combiner.combine(&audio, ctx)
    }
}
