//! # hubert-frontend
//!
//! Frame-level speech features from pretrained HuBERT encoders, in pure Rust
//! on [candle](https://github.com/huggingface/candle). The features feed
//! voice-conversion and singing-synthesis models.
//!
//! ## Features
//!
//! - **CPU inference** with optional MKL/Accelerate for faster BLAS operations
//! - **CUDA** and **Metal** support through candle
//! - **Soft units**: 256-channel HuBERT projection sparsified by a top-k gate
//! - **Temporal downsampling** by linear interpolation
//! - **Ensembles**: several encoders concatenated on the channel axis
//! - Weights from a local directory or the HuggingFace Hub
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hubert_frontend::{AudioInput, ExecutionContext, ExtractorConfig, ExtractorRegistry};
//!
//! let ctx = ExecutionContext::auto()?;
//! let registry = ExtractorRegistry::with_builtins();
//!
//! let config = ExtractorConfig::from_json(r#"{"type": "ChineseHubert", "downsample": 2}"#)?;
//! let extractor = registry.build(&config, &ctx)?;
//!
//! // [1, 768, T / 2]
//! let features = extractor.extract(AudioInput::Path("speech.wav".as_ref()), &ctx)?;
//! ```
//!
//! ## Pipeline
//!
//! Every extractor runs the same stages:
//!
//! 1. **Preprocess**: decode to mono and resample to 16 kHz
//!    ([`audio::preprocess`]).
//!
//! 2. **Normalize**: zero-mean / unit-variance input values when the
//!    checkpoint's `preprocessor_config.json` asks for it
//!    ([`WaveformNormalizer`]).
//!
//! 3. **Encode**: HuBERT last hidden state, `[B, T, C]` at a 20 ms hop
//!    ([`models::HubertModel`]).
//!
//! 4. **Post-process**: top-k gating ([`TopKGate`]), channel concatenation
//!    ([`features::concat_channels`]) and temporal resampling
//!    ([`TemporalResampler`]), depending on the extractor.
//!
//! ## Extractors
//!
//! | Key | Output | Default weights |
//! |-----|--------|-----------------|
//! | `ChineseHubertSoft` | `[B, 256, T]`, `gate_size` non-zeros per frame | `chinese-hubert-soft-v1.ckpt` |
//! | `ChineseHubert` | `[B, 768, T / d]` | `TencentGameMate/chinese-hubert-base` |
//! | `EnsembleHubert` | `[B, 2048, T / d]` | `chinese-hubert-large` + `facebook/hubert-large-ll60k` |

pub mod audio;
pub mod config;
mod context;
mod error;
pub mod features;
pub mod hub;
pub mod models;
pub mod profiling;

use candle_core::{DType, Device};

/// Re-exports for convenience
pub use audio::{AudioBuffer, AudioInput, WaveformNormalizer};
pub use config::ExtractorConfig;
pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use features::{
    ChineseHubert, ChineseHubertSoft, EnsembleHubert, ExtractorRegistry, FeatureExtractor,
    TemporalResampler, TopKGate, ZeroSumPolicy,
};
pub use hub::ModelPaths;
pub use models::{Encoder, HubertConfig, HubertModel, PreprocessorConfig};

/// Compute dtype for a device: BF16 on CUDA/Metal, F32 on CPU.
///
/// Features handed back to the caller are always F32.
pub fn compute_dtype_for_device(device: &Device) -> DType {
    if device.is_cuda() || device.is_metal() {
        DType::BF16
    } else {
        DType::F32
    }
}

/// Select the best available device: CUDA, then Metal, then CPU.
pub fn auto_device() -> Result<Device> {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::cuda_if_available(0) {
            if device.is_cuda() {
                tracing::info!("Using CUDA device");
                return Ok(device);
            }
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            tracing::info!("Using Metal device");
            return Ok(device);
        }
    }

    tracing::info!("Using CPU device");
    Ok(Device::Cpu)
}

/// Parse a device string into a [`Device`].
///
/// Supported formats:
/// - `"auto"`: best available device
/// - `"cpu"`
/// - `"cuda"` or `"cuda:N"`
/// - `"metal"`
pub fn parse_device(device_str: &str) -> Result<Device> {
    match device_str.to_lowercase().as_str() {
        "auto" => auto_device(),
        "cpu" => Ok(Device::Cpu),
        s if s.starts_with("cuda") => {
            #[cfg(feature = "cuda")]
            {
                let ordinal: usize = match s.strip_prefix("cuda:") {
                    Some(idx) => idx
                        .parse()
                        .map_err(|e| Error::Config(format!("invalid CUDA device index: {e}")))?,
                    None => 0,
                };
                Ok(Device::cuda_if_available(ordinal)?)
            }
            #[cfg(not(feature = "cuda"))]
            Err(Error::Config(format!(
                "'{s}' requested but CUDA support is not compiled in. Rebuild with: cargo build --features cuda"
            )))
        }
        "metal" => {
            #[cfg(feature = "metal")]
            {
                Ok(Device::new_metal(0)?)
            }
            #[cfg(not(feature = "metal"))]
            Err(Error::Config(
                "Metal support is not compiled in. Rebuild with: cargo build --features metal"
                    .into(),
            ))
        }
        other => Err(Error::Config(format!(
            "unknown device '{other}'. Supported: auto, cpu, cuda, cuda:N, metal"
        ))),
    }
}

/// Human-readable label for a [`Device`].
pub fn device_info(device: &Device) -> String {
    match device {
        Device::Cpu => "CPU".to_string(),
        Device::Cuda(_) => "CUDA".to_string(),
        Device::Metal(_) => "Metal".to_string(),
    }
}
