//! Pretrained speech encoders
//!
//! This module contains:
//! - `encoder`: The [`Encoder`] trait every extractor talks to
//! - `hubert`: Candle implementation of the HuBERT encoder
//! - `config`: `config.json` / `preprocessor_config.json` parsing

pub mod config;
pub mod encoder;
pub mod hubert;

pub use config::{FeatExtractNorm, HubertConfig, PreprocessorConfig};
pub use encoder::Encoder;
pub use hubert::HubertModel;

use candle_nn::VarBuilder;
use std::path::Path;

use crate::{Error, ExecutionContext, Result};

/// Open a weight file as a [`VarBuilder`] on the context's device.
///
/// `.safetensors` files are memory-mapped; anything else (`.bin`, `.ckpt`,
/// `.pt`, `.pth`) is read as a PyTorch pickle.
pub fn load_weights(path: &Path, ctx: &ExecutionContext) -> Result<VarBuilder<'static>> {
    if !path.exists() {
        return Err(Error::WeightLoad(format!(
            "weight file not found: {}",
            path.display()
        )));
    }

    let is_safetensors = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("safetensors"));

    tracing::info!("Loading weights from {}", path.display());
    let vb = if is_safetensors {
        // SAFETY: the file is not modified while the mapping is alive.
        unsafe { VarBuilder::from_mmaped_safetensors(&[path], ctx.dtype, &ctx.device) }
    } else {
        VarBuilder::from_pth(path, ctx.dtype, &ctx.device)
    };
    vb.map_err(|e| Error::WeightLoad(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_weights_file() {
        let ctx = ExecutionContext::cpu();
        match load_weights(Path::new("/nonexistent/model.safetensors"), &ctx) {
            Err(Error::WeightLoad(msg)) => assert!(msg.contains("not found")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }
}
