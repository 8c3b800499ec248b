//! Model and preprocessor configuration, read from HuggingFace JSON files

use candle_nn::Activation;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Normalization used inside the convolutional feature encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatExtractNorm {
    /// GroupNorm after the first conv layer only (base checkpoints)
    Group,
    /// LayerNorm after every conv layer (large checkpoints)
    Layer,
}

/// HuBERT encoder configuration (`config.json`).
///
/// Unknown keys are ignored; missing keys take the HuBERT-base values.
#[derive(Debug, Clone, Deserialize)]
pub struct HubertConfig {
    /// Transformer width
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,

    /// Number of transformer layers
    #[serde(default = "default_num_hidden_layers")]
    pub num_hidden_layers: usize,

    /// Number of attention heads
    #[serde(default = "default_num_attention_heads")]
    pub num_attention_heads: usize,

    /// Feed-forward inner width
    #[serde(default = "default_intermediate_size")]
    pub intermediate_size: usize,

    /// Feed-forward activation
    #[serde(default = "default_hidden_act")]
    pub hidden_act: Activation,

    /// Activation between feature-encoder convolutions
    #[serde(default = "default_hidden_act")]
    pub feat_extract_activation: Activation,

    /// LayerNorm / GroupNorm epsilon
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,

    #[serde(default = "default_feat_extract_norm")]
    pub feat_extract_norm: FeatExtractNorm,

    /// Output channels per conv layer
    #[serde(default = "default_conv_dim")]
    pub conv_dim: Vec<usize>,

    /// Stride per conv layer
    #[serde(default = "default_conv_stride")]
    pub conv_stride: Vec<usize>,

    /// Kernel width per conv layer
    #[serde(default = "default_conv_kernel")]
    pub conv_kernel: Vec<usize>,

    /// Whether the feature-encoder convolutions carry a bias
    #[serde(default)]
    pub conv_bias: bool,

    /// Kernel width of the positional convolution
    #[serde(default = "default_num_conv_pos_embeddings")]
    pub num_conv_pos_embeddings: usize,

    /// Groups of the positional convolution
    #[serde(default = "default_num_conv_pos_embedding_groups")]
    pub num_conv_pos_embedding_groups: usize,

    /// Pre-norm transformer layers (large checkpoints)
    #[serde(default)]
    pub do_stable_layer_norm: bool,

    /// LayerNorm before the feature projection
    #[serde(default = "default_true")]
    pub feat_proj_layer_norm: bool,
}

fn default_hidden_size() -> usize {
    768
}
fn default_num_hidden_layers() -> usize {
    12
}
fn default_num_attention_heads() -> usize {
    12
}
fn default_intermediate_size() -> usize {
    3072
}
fn default_hidden_act() -> Activation {
    Activation::Gelu
}
fn default_layer_norm_eps() -> f64 {
    1e-5
}
fn default_feat_extract_norm() -> FeatExtractNorm {
    FeatExtractNorm::Group
}
fn default_conv_dim() -> Vec<usize> {
    vec![512; 7]
}
fn default_conv_stride() -> Vec<usize> {
    vec![5, 2, 2, 2, 2, 2, 2]
}
fn default_conv_kernel() -> Vec<usize> {
    vec![10, 3, 3, 3, 3, 2, 2]
}
fn default_num_conv_pos_embeddings() -> usize {
    128
}
fn default_num_conv_pos_embedding_groups() -> usize {
    16
}
fn default_true() -> bool {
    true
}

impl Default for HubertConfig {
    fn default() -> Self {
        Self {
            hidden_size: default_hidden_size(),
            num_hidden_layers: default_num_hidden_layers(),
            num_attention_heads: default_num_attention_heads(),
            intermediate_size: default_intermediate_size(),
            hidden_act: default_hidden_act(),
            feat_extract_activation: default_hidden_act(),
            layer_norm_eps: default_layer_norm_eps(),
            feat_extract_norm: default_feat_extract_norm(),
            conv_dim: default_conv_dim(),
            conv_stride: default_conv_stride(),
            conv_kernel: default_conv_kernel(),
            conv_bias: false,
            num_conv_pos_embeddings: default_num_conv_pos_embeddings(),
            num_conv_pos_embedding_groups: default_num_conv_pos_embedding_groups(),
            do_stable_layer_norm: false,
            feat_proj_layer_norm: true,
        }
    }
}

impl HubertConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the layer lists agree and the heads divide the width.
    pub fn validate(&self) -> Result<()> {
        if self.conv_dim.is_empty()
            || self.conv_dim.len() != self.conv_stride.len()
            || self.conv_dim.len() != self.conv_kernel.len()
        {
            return Err(Error::Config(format!(
                "conv_dim/conv_stride/conv_kernel lengths differ: {}/{}/{}",
                self.conv_dim.len(),
                self.conv_stride.len(),
                self.conv_kernel.len()
            )));
        }
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(Error::Config(format!(
                "hidden_size {} is not divisible by {} attention heads",
                self.hidden_size, self.num_attention_heads
            )));
        }
        if self.num_conv_pos_embedding_groups == 0
            || self.hidden_size % self.num_conv_pos_embedding_groups != 0
        {
            return Err(Error::Config(format!(
                "hidden_size {} is not divisible by {} positional conv groups",
                self.hidden_size, self.num_conv_pos_embedding_groups
            )));
        }
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Channels out of the convolutional feature encoder
    pub fn extract_dim(&self) -> usize {
        self.conv_dim.last().copied().unwrap_or(self.hidden_size)
    }

    /// Number of encoder frames produced for `num_samples` input samples
    pub fn num_frames(&self, num_samples: usize) -> usize {
        self.conv_kernel
            .iter()
            .zip(self.conv_stride.iter())
            .fold(num_samples, |len, (&kernel, &stride)| {
                if len < kernel {
                    0
                } else {
                    (len - kernel) / stride + 1
                }
            })
    }
}

/// Waveform preprocessing settings (`preprocessor_config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    /// Zero-mean / unit-variance normalization of the input waveform
    #[serde(default = "default_true")]
    pub do_normalize: bool,

    /// Expected input sample rate
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u32,
}

fn default_sampling_rate() -> u32 {
    crate::audio::SAMPLE_RATE
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            do_normalize: true,
            sampling_rate: default_sampling_rate(),
        }
    }
}

impl PreprocessorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
