//! Device-side layout conversion, reshape and copy.
//!
//! All three go through the `relayout` kernel and always produce a fresh
//! tensor whose layout tag matches its image.

use crate::barrier::{PipelineBarrier, PipelineStage};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::layout::{LayoutConversion, MemoryLayout, Whcn};
use crate::params::{RelayoutBlock, UniformParamsBuffer};
use crate::tensor::GpuTensor;

pub const RELAYOUT_LOCAL: [u32; 3] = [8, 8, 1];

fn relayout(
    ctx: &GpuContext,
    src: &GpuTensor,
    sizes: &[usize],
    layout: MemoryLayout,
    label: &str,
) -> Result<GpuTensor> {
    let mut dst = GpuTensor::new(ctx, sizes, src.dtype(), layout)?
        .with_requires_grad(src.requires_grad());
    if let Some(qp) = src.quant_params() {
        dst = dst.with_quant_params(qp);
    }
    let block = RelayoutBlock {
        dst_sizes: Whcn::from_sizes(sizes).as_u32(),
        src_sizes: src.whcn().as_u32(),
        dst_layout: layout.as_u32(),
        src_layout: src.layout().as_u32(),
        _pad: [0; 2],
    };
    let params = UniformParamsBuffer::new(&block);
    let global = dst.extents();

    tracing::debug!(label, from = %src.layout(), to = %layout, sizes = ?sizes, "relayout");
    let mut barrier = PipelineBarrier::default();
    let src_img = src.image_for_read(&mut barrier, PipelineStage::Compute);
    let dst_img = dst.image_for_write(&mut barrier, PipelineStage::Compute);
    ctx.submit_compute_job(
        "relayout",
        barrier,
        global,
        RELAYOUT_LOCAL,
        dst_img,
        &[src_img],
        &params,
    )?;
    Ok(dst)
}

/// Produce a copy of `src` packed under `layout`.
pub fn convert(ctx: &GpuContext, src: &GpuTensor, layout: MemoryLayout) -> Result<GpuTensor> {
    let conversion = LayoutConversion::between(src.layout(), layout);
    relayout(ctx, src, src.sizes(), layout, conversion.label())
}

/// Upload-side conversion used when staging inputs; the source must be
/// channels-packed.
pub fn convert_channels_to_width_packed(ctx: &GpuContext, src: &GpuTensor) -> Result<GpuTensor> {
    expect_layout(src, MemoryLayout::ChannelsPacked)?;
    convert(ctx, src, MemoryLayout::WidthPacked)
}

/// Upload-side conversion used when staging float weights; the source must
/// be channels-packed.
pub fn convert_channels_to_height_packed(ctx: &GpuContext, src: &GpuTensor) -> Result<GpuTensor> {
    expect_layout(src, MemoryLayout::ChannelsPacked)?;
    convert(ctx, src, MemoryLayout::HeightPacked)
}

/// View `src` with new sizes of equal element count, keeping its layout.
pub fn reshape(ctx: &GpuContext, src: &GpuTensor, sizes: &[usize]) -> Result<GpuTensor> {
    let numel: usize = sizes.iter().product();
    if numel != src.numel() {
        return Err(GpuError::InvalidArgument(format!(
            "cannot reshape {:?} into {:?}",
            src.sizes(),
            sizes
        )));
    }
    relayout(ctx, src, sizes, src.layout(), "reshape")
}

/// Independent duplicate of `src`.
pub fn copy(ctx: &GpuContext, src: &GpuTensor) -> Result<GpuTensor> {
    relayout(ctx, src, src.sizes(), src.layout(), LayoutConversion::Identity.label())
}

/// Fail with `LayoutMismatch` unless `tensor` is tagged `expected`.
pub fn expect_layout(tensor: &GpuTensor, expected: MemoryLayout) -> Result<()> {
    if tensor.layout() != expected {
        return Err(GpuError::LayoutMismatch {
            expected,
            got: tensor.layout(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GpuConfig;
    use tm_tensor::{QuantParams, Shape, Tensor};

    fn ctx() -> GpuContext {
        GpuContext::new(GpuConfig::default())
    }

    #[test]
    fn test_convert_all_pairs_preserves_values() {
        let ctx = ctx();
        let data = (0..30).map(|v| v as f32 - 7.0).collect();
        let host = Tensor::new(data, Shape::new(vec![2, 3, 5]));
        let all = [
            MemoryLayout::WidthPacked,
            MemoryLayout::HeightPacked,
            MemoryLayout::ChannelsPacked,
        ];
        for from in all {
            let src = GpuTensor::from_host(&ctx, &host, from).unwrap();
            for to in all {
                let dst = convert(&ctx, &src, to).unwrap();
                assert_eq!(dst.layout(), to);
                assert_eq!(dst.sizes(), &[2, 3, 5]);
                let back = dst.to_host(&ctx).unwrap();
                assert_eq!(back.data_f32().unwrap(), host.data_f32().unwrap());
            }
        }
    }

    #[test]
    fn test_convert_quantized_is_exact() {
        let ctx = ctx();
        let qp = QuantParams::new(0.1, 0);
        let host =
            Tensor::from_qint8(vec![-128, -7, 0, 3, 127, 64], Shape::new(vec![3, 2]), qp).unwrap();
        let src = GpuTensor::from_host(&ctx, &host, MemoryLayout::ChannelsPacked).unwrap();
        let dst = convert_channels_to_width_packed(&ctx, &src).unwrap();
        assert_eq!(dst.quant_params(), Some(qp));
        assert_eq!(dst.to_host(&ctx).unwrap().storage(), host.storage());
    }

    #[test]
    fn test_named_conversion_checks_source_layout() {
        let ctx = ctx();
        let dtype = tm_tensor::DType::F32;
        let src = GpuTensor::new(&ctx, &[2, 2], dtype, MemoryLayout::WidthPacked).unwrap();
        assert!(matches!(
            convert_channels_to_height_packed(&ctx, &src),
            Err(GpuError::LayoutMismatch { .. })
        ));
    }

    #[test]
    fn test_reshape() {
        let ctx = ctx();
        let host = Tensor::new((0..24).map(|v| v as f32).collect(), Shape::new(vec![2, 3, 4]));
        let src = GpuTensor::from_host(&ctx, &host, MemoryLayout::WidthPacked).unwrap();
        let flat = reshape(&ctx, &src, &[6, 4]).unwrap();
        assert_eq!(flat.layout(), MemoryLayout::WidthPacked);
        let back = flat.to_host(&ctx).unwrap();
        assert_eq!(back.shape().dims(), &[6, 4]);
        assert_eq!(back.data_f32().unwrap(), host.data_f32().unwrap());
        assert!(reshape(&ctx, &src, &[5, 5]).is_err());
    }

    #[test]
    fn test_copy_is_independent() {
        let ctx = ctx();
        let host = Tensor::new(vec![1.0, 2.0, 3.0], Shape::new(vec![3]));
        let src = GpuTensor::from_host(&ctx, &host, MemoryLayout::WidthPacked).unwrap();
        let dup = copy(&ctx, &src).unwrap();
        assert_ne!(dup.image().id(), src.image().id());
        assert_eq!(dup.to_host(&ctx).unwrap().data_f32().unwrap(), &[1.0, 2.0, 3.0]);
    }
}
