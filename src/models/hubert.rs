//! HuBERT encoder
//!
//! Layout and weight names follow the HuggingFace `HubertModel`:
//!
//! - **FeatureEncoder**: strided Conv1d stack over the raw waveform
//!   (`feature_extractor.conv_layers.{i}`), ~20 ms hop at 16 kHz
//! - **FeatureProjection**: optional LayerNorm + Linear up to `hidden_size`
//! - **PositionalConvEmbedding**: weight-normed grouped Conv1d + GELU
//! - **TransformerEncoder**: post-norm layers (base) or pre-norm "stable"
//!   layers (large) with a final LayerNorm

use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{
    conv1d, conv1d_no_bias, group_norm, layer_norm, linear, Activation, Conv1d, Conv1dConfig,
    GroupNorm, LayerNorm, Linear, VarBuilder,
};

use super::config::{FeatExtractNorm, HubertConfig};
use super::encoder::Encoder;
use crate::{Error, ExecutionContext, Result};

// ── Feature encoder ─────────────────────────────────────────────────────────

enum ConvNorm {
    None,
    Group(GroupNorm),
    /// LayerNorm over channels, applied channels-last
    Layer(LayerNorm),
}

struct FeatureConvLayer {
    conv: Conv1d,
    norm: ConvNorm,
    activation: Activation,
}

impl FeatureConvLayer {
    fn new(config: &HubertConfig, layer_id: usize, vb: VarBuilder) -> Result<Self> {
        let in_dim = if layer_id == 0 {
            1
        } else {
            config.conv_dim[layer_id - 1]
        };
        let out_dim = config.conv_dim[layer_id];
        let kernel = config.conv_kernel[layer_id];
        let conv_config = Conv1dConfig {
            stride: config.conv_stride[layer_id],
            ..Default::default()
        };

        let conv = if config.conv_bias {
            conv1d(in_dim, out_dim, kernel, conv_config, vb.pp("conv"))?
        } else {
            conv1d_no_bias(in_dim, out_dim, kernel, conv_config, vb.pp("conv"))?
        };

        let norm = match config.feat_extract_norm {
            FeatExtractNorm::Group if layer_id == 0 => ConvNorm::Group(group_norm(
                out_dim,
                out_dim,
                config.layer_norm_eps,
                vb.pp("layer_norm"),
            )?),
            FeatExtractNorm::Group => ConvNorm::None,
            FeatExtractNorm::Layer => ConvNorm::Layer(layer_norm(
                out_dim,
                config.layer_norm_eps,
                vb.pp("layer_norm"),
            )?),
        };

        Ok(Self {
            conv,
            norm,
            activation: config.feat_extract_activation,
        })
    }

    /// `[B, C_in, L]` -> `[B, C_out, L']`
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        let xs = match &self.norm {
            ConvNorm::None => xs,
            ConvNorm::Group(norm) => norm.forward(&xs)?,
            ConvNorm::Layer(norm) => norm.forward(&xs.transpose(1, 2)?)?.transpose(1, 2)?,
        };
        Ok(self.activation.forward(&xs)?)
    }
}

struct FeatureEncoder {
    layers: Vec<FeatureConvLayer>,
}

impl FeatureEncoder {
    fn new(config: &HubertConfig, vb: VarBuilder) -> Result<Self> {
        let vb = vb.pp("conv_layers");
        let layers = (0..config.conv_dim.len())
            .map(|i| FeatureConvLayer::new(config, i, vb.pp(i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    /// `[B, N]` waveform -> `[B, C, T]`
    fn forward(&self, input_values: &Tensor) -> Result<Tensor> {
        let mut xs = input_values.unsqueeze(1)?;
        for layer in &self.layers {
            xs = layer.forward(&xs)?;
        }
        Ok(xs)
    }
}

struct FeatureProjection {
    layer_norm: Option<LayerNorm>,
    projection: Linear,
}

impl FeatureProjection {
    fn new(config: &HubertConfig, vb: VarBuilder) -> Result<Self> {
        let dim = config.extract_dim();
        let layer_norm = if config.feat_proj_layer_norm {
            Some(layer_norm(dim, config.layer_norm_eps, vb.pp("layer_norm"))?)
        } else {
            None
        };
        Ok(Self {
            layer_norm,
            projection: linear(dim, config.hidden_size, vb.pp("projection"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = match &self.layer_norm {
            Some(norm) => norm.forward(xs)?,
            None => xs.clone(),
        };
        Ok(self.projection.forward(&xs)?)
    }
}

// ── Positional convolution ──────────────────────────────────────────────────

/// Grouped Conv1d whose kernel is stored weight-normalized over the kernel
/// axis (`weight = g * v / ||v||`, norm over output and input channels).
///
/// Accepts both the legacy `weight_g` / `weight_v` names and the
/// `parametrizations.weight.original0/1` names newer exports use.
struct PositionalConvEmbedding {
    weight: Tensor,
    bias: Tensor,
    padding: usize,
    groups: usize,
    drop_last: bool,
    activation: Activation,
}

impl PositionalConvEmbedding {
    fn new(config: &HubertConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_size;
        let kernel = config.num_conv_pos_embeddings;
        let groups = config.num_conv_pos_embedding_groups;
        let v_shape = (hidden, hidden / groups, kernel);
        let g_shape = (1, 1, kernel);

        let vb = vb.pp("conv");
        let (g, v) = if vb.contains_tensor("weight_g") {
            (
                vb.get_with_hints(g_shape, "weight_g", candle_nn::Init::Const(1.0))?,
                vb.get_with_hints(v_shape, "weight_v", candle_nn::init::DEFAULT_KAIMING_NORMAL)?,
            )
        } else {
            let pvb = vb.pp("parametrizations").pp("weight");
            (
                pvb.get_with_hints(g_shape, "original0", candle_nn::Init::Const(1.0))?,
                pvb.get_with_hints(v_shape, "original1", candle_nn::init::DEFAULT_KAIMING_NORMAL)?,
            )
        };
        let bias = vb.get(hidden, "bias")?;

        let dtype = v.dtype();
        let v32 = v.to_dtype(DType::F32)?;
        let norm = v32.sqr()?.sum_keepdim(0)?.sum_keepdim(1)?.sqrt()?;
        let weight = v32
            .broadcast_mul(&g.to_dtype(DType::F32)?.broadcast_div(&norm)?)?
            .to_dtype(dtype)?;

        Ok(Self {
            weight,
            bias,
            padding: kernel / 2,
            groups,
            drop_last: kernel % 2 == 0,
            activation: config.feat_extract_activation,
        })
    }

    /// `[B, T, C]` -> `[B, T, C]`
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = xs.transpose(1, 2)?.contiguous()?;
        let xs = xs.conv1d(&self.weight, self.padding, 1, 1, self.groups)?;
        let xs = xs.broadcast_add(&self.bias.reshape((1, (), 1))?)?;
        let xs = if self.drop_last {
            let frames = xs.dim(2)?;
            xs.narrow(2, 0, frames - 1)?
        } else {
            xs
        };
        let xs = self.activation.forward(&xs)?;
        Ok(xs.transpose(1, 2)?)
    }
}

// ── Transformer ─────────────────────────────────────────────────────────────

/// Bidirectional multi-head self-attention with biased projections
struct Attention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl Attention {
    fn new(config: &HubertConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_size;
        let head_dim = config.head_dim();
        Ok(Self {
            q_proj: linear(hidden, hidden, vb.pp("q_proj"))?,
            k_proj: linear(hidden, hidden, vb.pp("k_proj"))?,
            v_proj: linear(hidden, hidden, vb.pp("v_proj"))?,
            out_proj: linear(hidden, hidden, vb.pp("out_proj"))?,
            num_heads: config.num_attention_heads,
            head_dim,
            scale: 1.0 / (head_dim as f64).sqrt(),
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, hidden) = xs.dims3()?;

        let split = |t: Tensor| -> Result<Tensor> {
            Ok(t.reshape((batch, seq_len, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()?)
        };
        let q = split((self.q_proj.forward(xs)? * self.scale)?)?;
        let k = split(self.k_proj.forward(xs)?)?;
        let v = split(self.v_proj.forward(xs)?)?;

        let attn_weights = q.matmul(&k.transpose(D::Minus2, D::Minus1)?.contiguous()?)?;
        let attn_weights = candle_nn::ops::softmax_last_dim(&attn_weights)?;
        let attn_output = attn_weights
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, hidden))?;

        Ok(self.out_proj.forward(&attn_output)?)
    }
}

struct FeedForward {
    intermediate_dense: Linear,
    output_dense: Linear,
    activation: Activation,
}

impl FeedForward {
    fn new(config: &HubertConfig, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            intermediate_dense: linear(
                config.hidden_size,
                config.intermediate_size,
                vb.pp("intermediate_dense"),
            )?,
            output_dense: linear(
                config.intermediate_size,
                config.hidden_size,
                vb.pp("output_dense"),
            )?,
            activation: config.hidden_act,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.intermediate_dense.forward(xs)?;
        let xs = self.activation.forward(&xs)?;
        Ok(self.output_dense.forward(&xs)?)
    }
}

struct EncoderLayer {
    attention: Attention,
    layer_norm: LayerNorm,
    feed_forward: FeedForward,
    final_layer_norm: LayerNorm,
    pre_norm: bool,
}

impl EncoderLayer {
    fn new(config: &HubertConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_size;
        let eps = config.layer_norm_eps;
        Ok(Self {
            attention: Attention::new(config, vb.pp("attention"))?,
            layer_norm: layer_norm(hidden, eps, vb.pp("layer_norm"))?,
            feed_forward: FeedForward::new(config, vb.pp("feed_forward"))?,
            final_layer_norm: layer_norm(hidden, eps, vb.pp("final_layer_norm"))?,
            pre_norm: config.do_stable_layer_norm,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        if self.pre_norm {
            let attn = self.attention.forward(&self.layer_norm.forward(xs)?)?;
            let xs = (xs + attn)?;
            let ff = self
                .feed_forward
                .forward(&self.final_layer_norm.forward(&xs)?)?;
            Ok((xs + ff)?)
        } else {
            let attn = self.attention.forward(xs)?;
            let xs = self.layer_norm.forward(&(xs + attn)?)?;
            let ff = self.feed_forward.forward(&xs)?;
            Ok(self.final_layer_norm.forward(&(xs + ff)?)?)
        }
    }
}

struct TransformerEncoder {
    pos_conv_embed: PositionalConvEmbedding,
    layer_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    stable: bool,
}

impl TransformerEncoder {
    fn new(config: &HubertConfig, vb: VarBuilder) -> Result<Self> {
        let layers_vb = vb.pp("layers");
        let layers = (0..config.num_hidden_layers)
            .map(|i| EncoderLayer::new(config, layers_vb.pp(i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            pos_conv_embed: PositionalConvEmbedding::new(config, vb.pp("pos_conv_embed"))?,
            layer_norm: layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("layer_norm"))?,
            layers,
            stable: config.do_stable_layer_norm,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let positions = self.pos_conv_embed.forward(xs)?;
        let mut xs = (xs + positions)?;
        if !self.stable {
            xs = self.layer_norm.forward(&xs)?;
        }
        for layer in &self.layers {
            xs = layer.forward(&xs)?;
        }
        if self.stable {
            xs = self.layer_norm.forward(&xs)?;
        }
        Ok(xs)
    }
}

// ── Model ───────────────────────────────────────────────────────────────────

/// HuBERT encoder returning the last hidden state.
pub struct HubertModel {
    feature_extractor: FeatureEncoder,
    feature_projection: FeatureProjection,
    encoder: TransformerEncoder,
    config: HubertConfig,
    device: Device,
    dtype: DType,
}

impl HubertModel {
    /// Build from weights rooted at `vb` (no `hubert.` prefix).
    pub fn new(config: &HubertConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let device = vb.device().clone();
        let dtype = vb.dtype();

        let model = Self {
            feature_extractor: FeatureEncoder::new(config, vb.pp("feature_extractor"))?,
            feature_projection: FeatureProjection::new(config, vb.pp("feature_projection"))?,
            encoder: TransformerEncoder::new(config, vb.pp("encoder"))?,
            config: config.clone(),
            device,
            dtype,
        };

        tracing::debug!(
            hidden_size = config.hidden_size,
            layers = config.num_hidden_layers,
            stable_layer_norm = config.do_stable_layer_norm,
            "HuBERT encoder built"
        );
        Ok(model)
    }

    /// Build from a full checkpoint, accepting weights saved either from the
    /// bare model or from a wrapper that stores them under `hubert.*`.
    pub fn load(config: &HubertConfig, vb: VarBuilder) -> Result<Self> {
        const PROBE: &str = "feature_projection.projection.weight";
        if !vb.contains_tensor(PROBE) && vb.contains_tensor(&format!("hubert.{PROBE}")) {
            return Self::new(config, vb.pp("hubert"));
        }
        Self::new(config, vb)
    }

    pub fn config(&self) -> &HubertConfig {
        &self.config
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// `[B, N]` waveform -> `[B, T, hidden_size]`
    pub fn forward(&self, input_values: &Tensor) -> Result<Tensor> {
        let (_batch, samples) = input_values.dims2()?;
        if self.config.num_frames(samples) == 0 {
            return Err(Error::Audio(format!(
                "{samples} samples is shorter than the encoder receptive field"
            )));
        }

        let input_values = input_values.to_dtype(self.dtype)?;
        let features = self.feature_extractor.forward(&input_values)?;
        let features = features.transpose(1, 2)?.contiguous()?;
        let hidden = self.feature_projection.forward(&features)?;
        self.encoder.forward(&hidden)
    }
}

impl Encoder for HubertModel {
    #[cfg_attr(feature = "profiling", tracing::instrument(name = "hubert_encode", skip_all))]
    fn encode(&self, input_values: &Tensor, ctx: &ExecutionContext) -> Result<Tensor> {
        ctx.ensure_same_device(&self.device)?;
        let input_values = input_values.to_device(&self.device)?;
        let hidden = self.forward(&input_values)?;
        tracing::debug!(shape = ?hidden.dims(), "encoded");
        Ok(hidden)
    }

    fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    fn device(&self) -> &Device {
        &self.device
    }
}
