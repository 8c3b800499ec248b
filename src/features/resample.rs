//! Linear resampling of feature sequences along the time axis.

use candle_core::Tensor;

use crate::{Error, Result};

/// Reduces a `[B, C, T]` feature tensor to `T / factor` frames.
///
/// Frames are placed at half-pixel centres (corners not aligned): output
/// frame `j` reads input position `(j + 0.5) * T / T' - 0.5`, clamped at zero,
/// and blends its two neighbours linearly.
#[derive(Debug, Clone, Copy)]
pub struct TemporalResampler {
    factor: usize,
}

impl TemporalResampler {
    pub fn new(factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(Error::Config("downsample factor must be at least 1".into()));
        }
        Ok(Self { factor })
    }

    /// `None` when no factor is configured.
    pub fn from_option(factor: Option<usize>) -> Result<Option<Self>> {
        factor.map(Self::new).transpose()
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Output frame count for `frames` input frames.
    pub fn output_len(&self, frames: usize) -> usize {
        frames / self.factor
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (_b, _c, frames) = xs.dims3()?;
        let out_len = self.output_len(frames);
        if self.factor == 1 {
            return Ok(xs.clone());
        }
        interpolate_linear(xs, out_len)
    }
}

/// Apply `resampler` when present, identity otherwise.
pub fn resample_time(xs: &Tensor, resampler: Option<&TemporalResampler>) -> Result<Tensor> {
    match resampler {
        Some(resampler) => resampler.forward(xs),
        None => Ok(xs.clone()),
    }
}

/// Linear interpolation of a `[B, C, T]` tensor to `out_len` frames along the
/// last axis.
pub fn interpolate_linear(xs: &Tensor, out_len: usize) -> Result<Tensor> {
    let (b, c, in_len) = xs.dims3()?;
    if out_len == 0 || in_len == 0 {
        return Ok(Tensor::zeros((b, c, 0), xs.dtype(), xs.device())?);
    }
    if out_len == in_len {
        return Ok(xs.clone());
    }

    let scale = in_len as f64 / out_len as f64;
    let mut lower = Vec::with_capacity(out_len);
    let mut upper = Vec::with_capacity(out_len);
    let mut weights = Vec::with_capacity(out_len);
    for j in 0..out_len {
        let src = ((j as f64 + 0.5) * scale - 0.5).max(0.0);
        let i0 = (src.floor() as usize).min(in_len - 1);
        let i1 = (i0 + 1).min(in_len - 1);
        lower.push(i0 as u32);
        upper.push(i1 as u32);
        weights.push((src - i0 as f64) as f32);
    }

    let device = xs.device();
    let lower = Tensor::from_vec(lower, out_len, device)?;
    let upper = Tensor::from_vec(upper, out_len, device)?;
    let w1 = Tensor::from_vec(weights, (1, 1, out_len), device)?.to_dtype(xs.dtype())?;
    let w0 = w1.affine(-1.0, 1.0)?;

    let xs = xs.contiguous()?;
    let left = xs.index_select(&lower, 2)?;
    let right = xs.index_select(&upper, 2)?;
    Ok((left.broadcast_mul(&w0)? + right.broadcast_mul(&w1)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_zero_factor_rejected() {
        assert!(matches!(TemporalResampler::new(0), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_option() {
        assert!(TemporalResampler::from_option(None).unwrap().is_none());
        let r = TemporalResampler::from_option(Some(3)).unwrap().unwrap();
        assert_eq!(r.factor(), 3);
        assert!(TemporalResampler::from_option(Some(0)).is_err());
    }

    #[test]
    fn test_downsample_by_two() {
        let dev = Device::Cpu;
        let xs = Tensor::arange(0f32, 8.0, &dev)
            .unwrap()
            .reshape((1, 1, 8))
            .unwrap();
        let out = TemporalResampler::new(2).unwrap().forward(&xs).unwrap();
        assert_eq!(out.dims(), &[1, 1, 4]);
        let values: Vec<f32> = out.flatten_all().unwrap().to_vec1().unwrap();
        for (got, want) in values.iter().zip([0.5f32, 2.5, 4.5, 6.5].iter()) {
            assert!((got - want).abs() < 1e-6, "{got} vs {want}");
        }
    }

    #[test]
    fn test_factor_one_is_identity() {
        let dev = Device::Cpu;
        let xs = Tensor::rand(0f32, 1.0, (2, 3, 7), &dev).unwrap();
        let out = TemporalResampler::new(1).unwrap().forward(&xs).unwrap();
        assert_eq!(out.to_vec3::<f32>().unwrap(), xs.to_vec3::<f32>().unwrap());
    }

    #[test]
    fn test_output_length_is_floor_division() {
        let dev = Device::Cpu;
        let resampler = TemporalResampler::new(3).unwrap();
        for frames in [3usize, 7, 10, 50] {
            let xs = Tensor::zeros((1, 4, frames), DType::F32, &dev).unwrap();
            let out = resampler.forward(&xs).unwrap();
            assert_eq!(out.dims(), &[1, 4, frames / 3]);
        }
    }

    #[test]
    fn test_shorter_than_factor_gives_empty_axis() {
        let xs = Tensor::ones((1, 2, 3), DType::F32, &Device::Cpu).unwrap();
        let out = TemporalResampler::new(4).unwrap().forward(&xs).unwrap();
        assert_eq!(out.dims(), &[1, 2, 0]);
    }

    #[test]
    fn test_constant_signal_is_preserved() {
        let xs = (Tensor::ones((2, 3, 9), DType::F32, &Device::Cpu).unwrap() * 0.75).unwrap();
        let out = TemporalResampler::new(2).unwrap().forward(&xs).unwrap();
        let values: Vec<f32> = out.flatten_all().unwrap().to_vec1().unwrap();
        assert!(values.iter().all(|v| (v - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_channels_resampled_independently() {
        let dev = Device::Cpu;
        let xs = Tensor::new(
            &[[[0f32, 1.0, 2.0, 3.0], [10.0, 10.0, 20.0, 20.0]]],
            &dev,
        )
        .unwrap();
        let out = interpolate_linear(&xs, 2).unwrap().to_vec3::<f32>().unwrap();
        assert_eq!(out[0][0], vec![0.5, 2.5]);
        assert_eq!(out[0][1], vec![10.0, 20.0]);
    }

    #[test]
    fn test_resample_time_none_is_identity() {
        let xs = Tensor::ones((1, 1, 5), DType::F32, &Device::Cpu).unwrap();
        let out = resample_time(&xs, None).unwrap();
        assert_eq!(out.dims(), &[1, 1, 5]);
    }
}
