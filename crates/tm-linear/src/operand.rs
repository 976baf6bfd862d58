use std::ops::Deref;

use tm_gpu::{packing, GpuContext, GpuTensor};
use tm_tensor::{DType, QuantParams, Tensor};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Host,
    Device,
}

/// A matmul operand, resident either on the host or on the device.
#[derive(Debug)]
pub enum Operand {
    Host(Tensor),
    Device(GpuTensor),
}

impl Operand {
    pub fn sizes(&self) -> &[usize] {
        match self {
            Operand::Host(t) => t.shape().dims(),
            Operand::Device(t) => t.sizes(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.sizes().len()
    }

    pub fn dtype(&self) -> DType {
        match self {
            Operand::Host(t) => t.dtype(),
            Operand::Device(t) => t.dtype(),
        }
    }

    pub fn residency(&self) -> Residency {
        match self {
            Operand::Host(_) => Residency::Host,
            Operand::Device(_) => Residency::Device,
        }
    }

    pub fn requires_grad(&self) -> bool {
        match self {
            Operand::Host(t) => t.requires_grad(),
            Operand::Device(t) => t.requires_grad(),
        }
    }

    pub fn quant_params(&self) -> Option<QuantParams> {
        match self {
            Operand::Host(t) => t.quant_params(),
            Operand::Device(t) => t.quant_params(),
        }
    }

    /// Quantized dtype with parameters attached.
    pub fn is_quantized(&self) -> bool {
        self.dtype().is_quantized() && self.quant_params().is_some()
    }

    /// Host copy of the operand's values, downloading if needed.
    pub fn to_host(&self, ctx: &GpuContext) -> Result<Tensor> {
        Ok(match self {
            Operand::Host(t) => t.clone(),
            Operand::Device(t) => t.to_host(ctx)?,
        })
    }

    /// Independent copy on the same side.
    pub fn duplicate(&self, ctx: &GpuContext) -> Result<Operand> {
        Ok(match self {
            Operand::Host(t) => Operand::Host(t.clone()),
            Operand::Device(t) => Operand::Device(packing::copy(ctx, t)?),
        })
    }
}

impl From<Tensor> for Operand {
    fn from(t: Tensor) -> Self {
        Operand::Host(t)
    }
}

impl From<GpuTensor> for Operand {
    fn from(t: GpuTensor) -> Self {
        Operand::Device(t)
    }
}

/// A device tensor that is either borrowed from the caller or freshly
/// produced by packing.
#[derive(Debug)]
pub enum Staged<'a> {
    Borrowed(&'a GpuTensor),
    Owned(GpuTensor),
}

impl Deref for Staged<'_> {
    type Target = GpuTensor;

    fn deref(&self) -> &GpuTensor {
        match self {
            Staged::Borrowed(t) => t,
            Staged::Owned(t) => t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_gpu::MemoryLayout;
    use tm_tensor::Shape;

    #[test]
    fn test_properties_agree_across_residency() {
        let ctx = GpuContext::default();
        let qp = QuantParams::new(0.5, 1);
        let host = Tensor::from_qint8(vec![1, 2, 3, 4, 5, 6], Shape::new(vec![2, 3]), qp).unwrap();
        let device = GpuTensor::from_host(&ctx, &host, MemoryLayout::ChannelsPacked).unwrap();

        let h = Operand::from(host);
        let d = Operand::from(device);
        assert_eq!(h.residency(), Residency::Host);
        assert_eq!(d.residency(), Residency::Device);
        for op in [&h, &d] {
            assert_eq!(op.sizes(), &[2, 3]);
            assert_eq!(op.dtype(), DType::QInt8);
            assert!(op.is_quantized());
            assert!(!op.requires_grad());
        }
        assert_eq!(d.to_host(&ctx).unwrap().storage(), h.to_host(&ctx).unwrap().storage());
    }

    #[test]
    fn test_duplicate_device() {
        let ctx = GpuContext::default();
        let host = Tensor::new(vec![1.0, 2.0], Shape::new(vec![2]));
        let d =
            Operand::Device(GpuTensor::from_host(&ctx, &host, MemoryLayout::WidthPacked).unwrap());
        let dup = d.duplicate(&ctx).unwrap();
        assert_eq!(dup.to_host(&ctx).unwrap().data_f32().unwrap(), &[1.0, 2.0]);
    }
}
