//! Audio front-end shared by every extractor
//!
//! This module provides:
//! - WAV decoding to mono
//! - Resampling to the 16 kHz encoder rate
//! - [`preprocess`], the decode + resample step run before every encoder call
//! - [`WaveformNormalizer`], the per-model input normalization

mod io;
mod preprocess;
pub mod resample;

pub use io::{load_wav, save_wav, AudioBuffer};
pub use preprocess::{preprocess, AudioInput, WaveformNormalizer};
pub use resample::{resample, resample_to_16k};

/// Sample rate every HuBERT checkpoint is trained on
pub const SAMPLE_RATE: u32 = 16000;
