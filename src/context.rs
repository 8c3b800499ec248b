//! Explicit execution context passed to model construction and inference.

use candle_core::{DType, Device};

use crate::{auto_device, compute_dtype_for_device, device_info, Error, Result};

/// Device and compute dtype for one extractor.
///
/// Models are loaded onto `device` and run in `dtype`; every `extract` /
/// `encode` call takes the context again and refuses to run when its device
/// is not the one the model lives on.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub device: Device,
    pub dtype: DType,
}

impl ExecutionContext {
    pub fn new(device: Device, dtype: DType) -> Self {
        Self { device, dtype }
    }

    /// CPU in f32.
    pub fn cpu() -> Self {
        Self::new(Device::Cpu, DType::F32)
    }

    /// Device with its preferred compute dtype (BF16 on GPU, F32 on CPU).
    pub fn for_device(device: Device) -> Self {
        let dtype = compute_dtype_for_device(&device);
        Self::new(device, dtype)
    }

    /// Best available device, see [`auto_device`].
    pub fn auto() -> Result<Self> {
        Ok(Self::for_device(auto_device()?))
    }

    /// Fail with [`Error::Config`] unless `device` is this context's device.
    pub fn ensure_same_device(&self, device: &Device) -> Result<()> {
        if self.device.same_device(device) {
            return Ok(());
        }
        Err(Error::Config(format!(
            "execution context targets {} but the model lives on {}",
            device_info(&self.device),
            device_info(device)
        )))
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::cpu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_context() {
        let ctx = ExecutionContext::cpu();
        assert!(ctx.device.is_cpu());
        assert_eq!(ctx.dtype, DType::F32);
    }

    #[test]
    fn test_for_cpu_device_uses_f32() {
        let ctx = ExecutionContext::for_device(Device::Cpu);
        assert_eq!(ctx.dtype, DType::F32);
    }

    #[test]
    fn test_same_device_accepted() {
        let ctx = ExecutionContext::default();
        assert!(ctx.ensure_same_device(&Device::Cpu).is_ok());
    }
}
