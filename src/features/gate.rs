//! Top-k gating: per-frame sparsification onto the probability simplex.
//!
//! For every frame the `k` largest channel values are kept at their original
//! channel index, every other channel is zeroed, and the surviving values are
//! divided by their sum. The result is a soft "codebook activation" whose
//! non-zero entries sum to one.

use candle_core::{shape::Dim, DType, Device, Tensor, D};

use crate::{Error, Result};

/// What to do with frames whose retained values sum to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ZeroSumPolicy {
    /// Fail with [`Error::DegenerateNormalization`].
    #[default]
    Reject,
    /// Divide anyway and let NaN/Inf flow to the caller.
    Propagate,
}

/// Top-k gate with a fixed gate size.
#[derive(Debug, Clone, Copy)]
pub struct TopKGate {
    k: usize,
    zero_sum: ZeroSumPolicy,
}

impl TopKGate {
    /// Create a gate keeping `k` channels per frame. `k` must be positive.
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::Config("gate size must be at least 1".into()));
        }
        Ok(Self {
            k,
            zero_sum: ZeroSumPolicy::default(),
        })
    }

    pub fn with_zero_sum_policy(mut self, policy: ZeroSumPolicy) -> Self {
        self.zero_sum = policy;
        self
    }

    /// Number of channels kept per frame.
    pub fn gate_size(&self) -> usize {
        self.k
    }

    pub fn zero_sum_policy(&self) -> ZeroSumPolicy {
        self.zero_sum
    }

    /// Gate `xs` along `channel_dim`, independently for every other index.
    ///
    /// Works for `[B, T, C]` (`channel_dim = 2`) and `[B, C, T]`
    /// (`channel_dim = 1`) alike; the output has the input's shape and layout.
    /// Exact ties keep the lower channel index.
    pub fn forward<I: Dim>(&self, xs: &Tensor, channel_dim: I) -> Result<Tensor> {
        let dim = channel_dim.to_index(xs.shape(), "top_k_gate")?;
        let channels = xs.dim(dim)?;
        if channels < self.k {
            return Err(Error::Config(format!(
                "gate size {} exceeds channel count {channels}",
                self.k
            )));
        }
        if xs.elem_count() == 0 {
            return Ok(xs.clone());
        }

        let last = xs.rank() - 1;
        if dim == last {
            return self.gate_last_dim(&xs.contiguous()?);
        }
        let moved = xs.transpose(dim, last)?.contiguous()?;
        let gated = self.gate_last_dim(&moved)?;
        Ok(gated.transpose(dim, last)?.contiguous()?)
    }

    fn gate_last_dim(&self, xs: &Tensor) -> Result<Tensor> {
        let indices = top_k_indices(xs, self.k)?;
        let top = xs.gather(&indices, D::Minus1)?;

        let gated = xs.zeros_like()?.scatter_add(&indices, &top, D::Minus1)?;
        let sums = gated.sum_keepdim(D::Minus1)?;

        if self.zero_sum == ZeroSumPolicy::Reject {
            let positions = zero_count(&sums)?;
            if positions > 0 {
                return Err(Error::DegenerateNormalization { positions });
            }
        }

        Ok(gated.broadcast_div(&sums)?)
    }
}

/// Indices of the `k` largest values along the last dim, ties to the lower index.
///
/// The sort always runs on the CPU: its descending arg-sort is stable, while the
/// bitonic GPU kernels may order equal values arbitrarily.
fn top_k_indices(xs: &Tensor, k: usize) -> Result<Tensor> {
    let order = if xs.device().is_cpu() {
        xs.arg_sort_last_dim(false)?
    } else {
        xs.to_device(&Device::Cpu)?.arg_sort_last_dim(false)?
    };
    let indices = order.narrow(D::Minus1, 0, k)?.contiguous()?;
    Ok(indices.to_device(xs.device())?)
}

fn zero_count(sums: &Tensor) -> Result<usize> {
    let sums: Vec<f32> = sums.flatten_all()?.to_dtype(DType::F32)?.to_vec1()?;
    Ok(sums.iter().filter(|s| **s == 0.0).count())
}
