//! Feature extractors and their post-processing stages
//!
//! - `gate`: top-k sparsification onto the probability simplex
//! - `resample`: linear resampling along time
//! - `ensemble`: channel concatenation across several encoders
//! - `extractors`: the three HuBERT front-ends
//! - `registry`: name -> factory lookup

pub mod ensemble;
pub mod extractors;
pub mod gate;
pub mod registry;
pub mod resample;

pub use ensemble::{concat_channels, EnsembleCombiner, EnsembleMember};
pub use extractors::{ChineseHubert, ChineseHubertSoft, EnsembleHubert};
pub use gate::{TopKGate, ZeroSumPolicy};
pub use registry::{ExtractorFactory, ExtractorRegistry};
pub use resample::{interpolate_linear, resample_time, TemporalResampler};

use candle_core::Tensor;

use crate::audio::AudioInput;
use crate::{ExecutionContext, Result};

/// Audio in, `[B, C, T]` f32 features out.
///
/// Extractors are immutable after construction, so one instance can serve
/// concurrent callers.
pub trait FeatureExtractor: Send + Sync {
    /// Registry key of this extractor
    fn name(&self) -> &'static str;

    /// Channel count `C` of the produced features
    fn output_channels(&self) -> usize;

    fn extract(&self, input: AudioInput<'_>, ctx: &ExecutionContext) -> Result<Tensor>;
}
