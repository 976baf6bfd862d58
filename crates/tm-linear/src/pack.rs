//! Layout packer: moves operands into the layouts the matmul kernels read.
//!
//! Inputs become width-packed. Float non-batched weights become
//! height-packed. Quantized or batched weights are re-tiled on the host
//! into four planes, one per position inside each 2x2 block, and uploaded
//! channels-packed so one texel holds one whole block:
//!
//! ```text
//! source [3, 3]       packed [4, 2, 2]
//! a b c               plane 0: a c   plane 1: b 0   plane 2: d f   plane 3: e 0
//! d e f                        g i            h 0            0 0            0 0
//! g h i
//! ```

use tm_gpu::{packing, GpuContext, GpuTensor, MemoryLayout};
use tm_tensor::{div_up, CpuStorage, Shape, Tensor};

use crate::error::{LinearError, Result};
use crate::operand::{Operand, Staged};

/// Re-tile `src`, read as `batch` matrices of `[h, w]`, into the 4-plane
/// layout `[batch, 4, ceil(h/2), ceil(w/2)]`.
///
/// A source extent of 1 is broadcast: both halves of every 2-wide read
/// along it come from the same element. Slots past an odd edge stay zero.
/// Elements are copied bit-exactly and quantization parameters carried.
pub fn tile(src: &Tensor, batch: usize, h: usize, w: usize) -> Result<Tensor> {
    if batch * h * w > src.shape().numel() {
        return Err(LinearError::InvalidArgument(format!(
            "cannot tile {} as {} x [{}, {}]",
            src.shape(),
            batch,
            h,
            w
        )));
    }
    let (dh, dw) = (div_up(h, 2), div_up(w, 2));
    let mut dst = CpuStorage::zeros(src.dtype(), batch * 4 * dh * dw);
    for b in 0..batch {
        for plane in 0..4 {
            for i in 0..dh {
                for j in 0..dw {
                    let row = if h == 1 { 0 } else { 2 * i + plane / 2 };
                    let col = if w == 1 { 0 } else { 2 * j + plane % 2 };
                    if row < h && col < w {
                        let dst_i = ((b * 4 + plane) * dh + i) * dw + j;
                        dst.copy_element(dst_i, src.storage(), (b * h + row) * w + col)?;
                    }
                }
            }
        }
    }
    Ok(Tensor::from_storage(
        dst,
        Shape::new(vec![batch, 4, dh, dw]),
        src.dtype(),
        src.quant_params(),
    )?)
}

/// Inverse of [`tile`]: recover `[batch, h, w]` from a 4-plane tensor.
pub fn untile(packed: &Tensor, batch: usize, h: usize, w: usize) -> Result<Tensor> {
    let (dh, dw) = (div_up(h, 2), div_up(w, 2));
    if packed.shape().dims() != [batch, 4, dh, dw] {
        return Err(LinearError::InvalidArgument(format!(
            "{} is not a 4-plane tiling of {} x [{}, {}]",
            packed.shape(),
            batch,
            h,
            w
        )));
    }
    let mut dst = CpuStorage::zeros(packed.dtype(), batch * h * w);
    for b in 0..batch {
        for row in 0..h {
            for col in 0..w {
                let plane = 2 * (row % 2) + col % 2;
                let src_i = ((b * 4 + plane) * dh + row / 2) * dw + col / 2;
                dst.copy_element((b * h + row) * w + col, packed.storage(), src_i)?;
            }
        }
    }
    Ok(Tensor::from_storage(
        dst,
        Shape::new(vec![batch, h, w]),
        packed.dtype(),
        packed.quant_params(),
    )?)
}

/// Bring `input` onto the device under `layout`, optionally reshaped.
///
/// Host inputs are uploaded channels-packed and then converted. Device
/// inputs already in the right shape and layout are borrowed as-is.
pub fn stage<'a>(
    ctx: &GpuContext,
    input: &'a Operand,
    sizes: &[usize],
    layout: MemoryLayout,
) -> Result<Staged<'a>> {
    let staged = match input {
        Operand::Host(t) => {
            let t = t.reshape(Shape::from_slice(sizes))?;
            let uploaded = GpuTensor::from_host(ctx, &t, MemoryLayout::ChannelsPacked)?;
            Staged::Owned(match layout {
                MemoryLayout::ChannelsPacked => uploaded,
                MemoryLayout::WidthPacked => {
                    packing::convert_channels_to_width_packed(ctx, &uploaded)?
                }
                MemoryLayout::HeightPacked => {
                    packing::convert_channels_to_height_packed(ctx, &uploaded)?
                }
            })
        }
        Operand::Device(t) if t.sizes() == sizes && t.layout() == layout => Staged::Borrowed(t),
        Operand::Device(t) if t.sizes() == sizes => {
            Staged::Owned(packing::convert(ctx, t, layout)?)
        }
        Operand::Device(t) => {
            let reshaped = packing::reshape(ctx, t, sizes)?;
            if reshaped.layout() == layout {
                Staged::Owned(reshaped)
            } else {
                Staged::Owned(packing::convert(ctx, &reshaped, layout)?)
            }
        }
    };
    packing::expect_layout(&staged, layout)?;
    Ok(staged)
}

/// Width-packed device copy of an input with every leading dim flattened
/// into rows: `[a, b, k]` is staged as `[a*b, k]`.
///
/// # Errors
/// `Usability` for inputs of rank below 2.
pub fn pack_input<'a>(ctx: &GpuContext, input: &'a Operand) -> Result<Staged<'a>> {
    let flat = Shape::from_slice(input.sizes())
        .flatten_to_2d()
        .map_err(|e| LinearError::Usability(e.to_string()))?;
    stage(ctx, input, flat.dims(), MemoryLayout::WidthPacked)
}

/// Height-packed float weight for the non-batched float kernels.
pub fn pack_weight_height_packed(ctx: &GpuContext, weight: &Operand) -> Result<GpuTensor> {
    if weight.dtype().is_quantized() {
        return Err(LinearError::InvalidArgument(format!(
            "height-packed weights must be float, got {}",
            weight.dtype()
        )));
    }
    let packed = match stage(ctx, weight, weight.sizes(), MemoryLayout::HeightPacked)? {
        Staged::Owned(t) => t,
        Staged::Borrowed(t) => packing::copy(ctx, t)?,
    };
    Ok(packed)
}

/// Pack a weight for the kernel family selected by its dtype and `batched`.
pub fn pack_weight(ctx: &GpuContext, weight: &Operand, batched: bool) -> Result<GpuTensor> {
    let sizes = weight.sizes().to_vec();
    let (batch, h, w) = match (batched, sizes.as_slice()) {
        (false, &[h, w]) => (1, h, w),
        (true, &[b, h, w]) => (b, h, w),
        _ => {
            return Err(LinearError::InvalidArgument(format!(
                "{} weight must be rank {}, got {:?}",
                if batched { "batched" } else { "non-batched" },
                if batched { 3 } else { 2 },
                sizes
            )))
        }
    };

    if !batched && !weight.dtype().is_quantized() {
        tracing::debug!(?sizes, "packing weight height-packed");
        return pack_weight_height_packed(ctx, weight);
    }

    tracing::debug!(?sizes, dtype = %weight.dtype(), "packing weight into 4-plane tiles");
    let tiled = tile(&weight.to_host(ctx)?, batch, h, w)?;
    let mut packed = GpuTensor::from_host(ctx, &tiled, MemoryLayout::ChannelsPacked)?;
    if let Some(qp) = weight.quant_params() {
        packed = packed.with_quant_params(qp);
    }
    Ok(packed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_tensor::{DType, QuantParams};

    fn seq(n: usize) -> Vec<f32> {
        (1..=n).map(|v| v as f32).collect()
    }

    #[test]
    fn test_tile_layout() {
        // 3 x 3: a..i = 1..9
        let src = Tensor::new(seq(9), Shape::new(vec![3, 3]));
        let t = tile(&src, 1, 3, 3).unwrap();
        assert_eq!(t.shape().dims(), &[1, 4, 2, 2]);
        assert_eq!(
            t.data_f32().unwrap(),
            &[
                1.0, 3.0, 7.0, 9.0, // plane 0: even rows, even cols
                2.0, 0.0, 8.0, 0.0, // plane 1: even rows, odd cols
                4.0, 6.0, 0.0, 0.0, // plane 2: odd rows, even cols
                5.0, 0.0, 0.0, 0.0, // plane 3
            ]
        );
    }

    #[test]
    fn test_tile_untile_permutation() {
        for (b, h, w) in [(1, 4, 6), (2, 5, 3), (3, 1, 7), (1, 6, 1), (2, 2, 2)] {
            let src = Tensor::new(seq(b * h * w), Shape::new(vec![b, h, w]));
            let back = untile(&tile(&src, b, h, w).unwrap(), b, h, w).unwrap();
            assert_eq!(back.data_f32().unwrap(), src.data_f32().unwrap());
        }
    }

    #[test]
    fn test_tile_broadcast_dims_duplicate() {
        let row = Tensor::new(vec![1.0, 2.0, 3.0], Shape::new(vec![3]));
        let t = tile(&row, 1, 1, 3).unwrap();
        // both row parities carry the single row
        assert_eq!(t.data_f32().unwrap(), &[1.0, 3.0, 2.0, 0.0, 1.0, 3.0, 2.0, 0.0]);

        let scalar = Tensor::new(vec![7.0], Shape::new(vec![]));
        assert_eq!(tile(&scalar, 1, 1, 1).unwrap().data_f32().unwrap(), &[7.0; 4]);
    }

    #[test]
    fn test_tile_quantized_bit_exact() {
        let qp = QuantParams::new(0.1, 0);
        let data: Vec<i8> = vec![-128, -1, 0, 1, 127, 42];
        let src = Tensor::from_qint8(data.clone(), Shape::new(vec![2, 3]), qp).unwrap();
        let t = tile(&src, 1, 2, 3).unwrap();
        assert_eq!(t.dtype(), DType::QInt8);
        assert_eq!(t.quant_params(), Some(qp));
        let back = untile(&t, 1, 2, 3).unwrap();
        assert_eq!(back.storage(), &CpuStorage::I8(data));
    }

    #[test]
    fn test_odd_height_pads_with_zero() {
        let src = Tensor::new(seq(10), Shape::new(vec![5, 2]));
        let t = tile(&src, 1, 5, 2).unwrap();
        assert_eq!(t.shape().dims(), &[1, 4, 3, 1]);
        // rows 5 (odd planes) of the last tile row are padding
        let d = t.data_f32().unwrap();
        assert_eq!(d[2 * 3 + 2], 0.0);
        assert_eq!(d[3 * 3 + 2], 0.0);
        assert_eq!(d[2], 9.0);
    }

    #[test]
    fn test_pack_weight_float_height_packed() {
        let ctx = GpuContext::default();
        let w = Operand::Host(Tensor::new(seq(24), Shape::new(vec![4, 6])));
        let packed = pack_weight(&ctx, &w, false).unwrap();
        assert_eq!(packed.layout(), MemoryLayout::HeightPacked);
        assert_eq!(packed.sizes(), &[4, 6]);
        assert_eq!(packed.to_host(&ctx).unwrap().data_f32().unwrap(), seq(24).as_slice());
    }

    #[test]
    fn test_pack_weight_batched_tiled() {
        let ctx = GpuContext::default();
        let w = Operand::Host(Tensor::new(seq(48), Shape::new(vec![2, 4, 6])));
        let packed = pack_weight(&ctx, &w, true).unwrap();
        assert_eq!(packed.sizes(), &[2, 4, 2, 3]);
        assert_eq!(packed.layout(), MemoryLayout::ChannelsPacked);
        assert_eq!(packed.extents(), [3, 2, 2]);
        let back = untile(&packed.to_host(&ctx).unwrap(), 2, 4, 6).unwrap();
        assert_eq!(back.data_f32().unwrap(), seq(48).as_slice());
    }

    #[test]
    fn test_pack_weight_rank_checked() {
        let ctx = GpuContext::default();
        let w = Operand::Host(Tensor::new(seq(6), Shape::new(vec![6])));
        assert!(matches!(pack_weight(&ctx, &w, false), Err(LinearError::InvalidArgument(_))));
        let qp = QuantParams::new(1.0, 0);
        let q = Operand::Host(Tensor::from_qint8(vec![0; 4], Shape::new(vec![2, 2]), qp).unwrap());
        assert!(matches!(
            pack_weight_height_packed(&ctx, &q),
            Err(LinearError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pack_input_converts_device_channels_packed() {
        let ctx = GpuContext::default();
        let host = Tensor::new(seq(12), Shape::new(vec![3, 4]));
        let dev = Operand::Device(
            GpuTensor::from_host(&ctx, &host, MemoryLayout::ChannelsPacked).unwrap(),
        );
        let staged = pack_input(&ctx, &dev).unwrap();
        assert!(matches!(staged, Staged::Owned(_)));
        assert_eq!(staged.layout(), MemoryLayout::WidthPacked);

        let wide =
            Operand::Device(GpuTensor::from_host(&ctx, &host, MemoryLayout::WidthPacked).unwrap());
        assert!(matches!(pack_input(&ctx, &wide).unwrap(), Staged::Borrowed(_)));
    }

    #[test]
    fn test_pack_input_flattens_leading_dims() {
        let ctx = GpuContext::default();
        let host = Operand::Host(Tensor::new(seq(24), Shape::new(vec![2, 3, 4])));
        let staged = pack_input(&ctx, &host).unwrap();
        assert_eq!(staged.sizes(), &[6, 4]);
        assert_eq!(staged.layout(), MemoryLayout::WidthPacked);
        assert_eq!(staged.to_host(&ctx).unwrap().data_f32().unwrap(), seq(24).as_slice());

        let vector = Operand::Host(Tensor::new(seq(4), Shape::new(vec![4])));
        assert!(matches!(pack_input(&ctx, &vector), Err(LinearError::Usability(_))));
    }

    #[test]
    fn test_stage_height_packed_from_host() {
        let ctx = GpuContext::default();
        let host = Operand::Host(Tensor::new(seq(15), Shape::new(vec![5, 3])));
        let staged = stage(&ctx, &host, &[5, 3], MemoryLayout::HeightPacked).unwrap();
        assert_eq!(staged.layout(), MemoryLayout::HeightPacked);
        let log = ctx.flush();
        assert_eq!(log.last().unwrap().label, "relayout");
        assert_eq!(staged.to_host(&ctx).unwrap().data_f32().unwrap(), seq(15).as_slice());
    }
}
