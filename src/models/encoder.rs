//! The pretrained-encoder seam used by every extractor.

use candle_core::{Device, Tensor};

use crate::{ExecutionContext, Result};

/// Maps a batch of 16 kHz waveforms to per-frame embeddings.
///
/// `input_values` is `[B, N]`; the result is `[B, T, C]` with
/// `C == hidden_size()`. Implementations are read-only after construction.
pub trait Encoder: Send + Sync {
    fn encode(&self, input_values: &Tensor, ctx: &ExecutionContext) -> Result<Tensor>;

    /// Embedding width `C`
    fn hidden_size(&self) -> usize;

    /// Device the weights live on
    fn device(&self) -> &Device;
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    fn encode(&self, input_values: &Tensor, ctx: &ExecutionContext) -> Result<Tensor> {
        (**self).encode(input_values, ctx)
    }

    fn hidden_size(&self) -> usize {
        (**self).hidden_size()
    }

    fn device(&self) -> &Device {
        (**self).device()
    }
}
