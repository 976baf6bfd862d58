//! Bias packer.

use tm_gpu::{GpuContext, GpuTensor, MemoryLayout};
use tm_tensor::DType;

use crate::error::{LinearError, Result};
use crate::operand::Operand;
use crate::pack::tile;

/// Resolve a bias shape to the `(batch, height, width)` it is tiled as.
///
/// Batched: rank 3 is taken as-is, lower ranks align to the trailing axes
/// and broadcast over the rest. Non-batched: the trailing matrix (the first
/// one, for higher ranks) with a batch of 1.
pub fn resolve_bias_dims(sizes: &[usize], batched: bool) -> Result<(usize, usize, usize)> {
    let dims = match (batched, sizes) {
        (true, &[b, h, w]) => (b, h, w),
        (true, &[h, w]) => (1, h, w),
        (true, &[w]) => (1, 1, w),
        (true, &[]) => (1, 1, 1),
        (false, &[w]) => (1, 1, w),
        (false, [.., h, w]) => (1, *h, *w),
        _ => {
            return Err(LinearError::InvalidArgument(format!(
                "cannot resolve {} bias of shape {:?}",
                if batched { "batched" } else { "non-batched" },
                sizes
            )))
        }
    };
    Ok(dims)
}

/// True when the bias is uploaded width-packed and broadcast by the float
/// `addmm` kernel instead of being tiled.
pub fn uses_width_packed_bias(bias_dtype: DType, weight_dtype: DType, batched: bool) -> bool {
    bias_dtype == DType::F32 && !batched && !weight_dtype.is_quantized()
}

/// Pack `bias` for a weight of `weight_dtype`.
///
/// No bias yields a one-element zero tensor in the weight's dtype. A device
/// bias is taken as already packed.
pub fn pack_bias(
    ctx: &GpuContext,
    weight_dtype: DType,
    bias: Option<Operand>,
    batched: bool,
) -> Result<GpuTensor> {
    let bias = match bias {
        None => return Ok(GpuTensor::new(ctx, &[1], weight_dtype, MemoryLayout::ChannelsPacked)?),
        Some(Operand::Device(t)) => {
            tracing::debug!(
                sizes = ?t.sizes(),
                layout = %t.layout(),
                "using device bias as packed"
            );
            return Ok(t);
        }
        Some(Operand::Host(t)) => t,
    };

    if uses_width_packed_bias(bias.dtype(), weight_dtype, batched) {
        tracing::debug!(sizes = ?bias.shape().dims(), "uploading bias width-packed");
        return Ok(GpuTensor::from_host(ctx, &bias, MemoryLayout::WidthPacked)?);
    }

    let (b, h, w) = resolve_bias_dims(bias.shape().dims(), batched)?;
    tracing::debug!(sizes = ?bias.shape().dims(), b, h, w, "tiling bias");
    let tiled = tile(&bias, b, h, w)?;
    Ok(GpuTensor::from_host(ctx, &tiled, MemoryLayout::ChannelsPacked)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::untile;
    use tm_tensor::{Shape, Tensor};

    #[test]
    fn test_resolve_batched() {
        assert_eq!(resolve_bias_dims(&[2, 3, 4], true).unwrap(), (2, 3, 4));
        assert_eq!(resolve_bias_dims(&[3, 4], true).unwrap(), (1, 3, 4));
        assert_eq!(resolve_bias_dims(&[4], true).unwrap(), (1, 1, 4));
        assert_eq!(resolve_bias_dims(&[], true).unwrap(), (1, 1, 1));
        assert!(resolve_bias_dims(&[1, 2, 3, 4], true).is_err());
    }

    #[test]
    fn test_resolve_non_batched() {
        assert_eq!(resolve_bias_dims(&[6], false).unwrap(), (1, 1, 6));
        assert_eq!(resolve_bias_dims(&[3, 6], false).unwrap(), (1, 3, 6));
        assert_eq!(resolve_bias_dims(&[2, 3, 6], false).unwrap(), (1, 3, 6));
        assert!(resolve_bias_dims(&[], false).is_err());
    }

    #[test]
    fn test_no_bias_sentinel() {
        let ctx = GpuContext::default();
        let b = pack_bias(&ctx, DType::QInt8, None, false).unwrap();
        assert_eq!(b.sizes(), &[1]);
        assert_eq!(b.dtype(), DType::QInt8);
        assert_eq!(b.extents(), [1, 1, 1]);
    }

    #[test]
    fn test_float_bias_width_packed() {
        let ctx = GpuContext::default();
        let host = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], Shape::new(vec![6]));
        let b = pack_bias(&ctx, DType::F32, Some(Operand::Host(host)), false).unwrap();
        assert_eq!(b.layout(), MemoryLayout::WidthPacked);
        assert_eq!(b.extents(), [2, 1, 1]);
    }

    #[test]
    fn test_batched_bias_tiled() {
        let ctx = GpuContext::default();
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let host = Tensor::new(data.clone(), Shape::new(vec![3, 4]));
        let b = pack_bias(&ctx, DType::F32, Some(Operand::Host(host)), true).unwrap();
        assert_eq!(b.sizes(), &[1, 4, 2, 2]);
        let back = untile(&b.to_host(&ctx).unwrap(), 1, 3, 4).unwrap();
        assert_eq!(back.data_f32().unwrap(), data.as_slice());
    }

    #[test]
    fn test_device_bias_passes_through() {
        let ctx = GpuContext::default();
        let host = Tensor::new(vec![1.0, 2.0], Shape::new(vec![2]));
        let dev = GpuTensor::from_host(&ctx, &host, MemoryLayout::WidthPacked).unwrap();
        let id = dev.image().id();
        let b = pack_bias(&ctx, DType::F32, Some(Operand::Device(dev)), false).unwrap();
        assert_eq!(b.image().id(), id);
    }
}
