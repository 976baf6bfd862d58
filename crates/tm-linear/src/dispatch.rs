//! Matmul dispatcher.
//!
//! Kernel choice is a table lookup keyed by (quantized, batched, bias). Each
//! entry names the kernel(s), the grid geometry and the uniform block the
//! kernel reads.

use tm_gpu::params::{
    AddmmBlock, BaddbmmBlock, BmmBlock, MmBlock, QuantizedAddmmBlock, QuantizedMmBlock,
};
use tm_gpu::{
    packing, GpuContext, GpuTensor, MemoryLayout, PipelineBarrier, PipelineStage,
    UniformParamsBuffer,
};
use tm_tensor::{div_up, DType, QuantParams, Shape};

use crate::context::LinearContext;
use crate::error::{LinearError, Result};
use crate::operand::Operand;
use crate::pack::{pack_input, stage};
use crate::validate::check_usable;

/// Workgroup size of every matmul dispatch.
pub const LOCAL_SIZE: [u32; 3] = [8, 8, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub quantized: bool,
    pub batched: bool,
    pub bias: bool,
}

impl VariantKey {
    pub fn index(self) -> usize {
        (self.quantized as usize) << 2 | (self.batched as usize) << 1 | self.bias as usize
    }

    pub fn all() -> [VariantKey; 8] {
        std::array::from_fn(|i| VariantKey {
            quantized: i & 4 != 0,
            batched: i & 2 != 0,
            bias: i & 1 != 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Float(&'static str),
    /// Picked by the output dtype.
    Quantized {
        qint8: &'static str,
        quint8: &'static str,
    },
}

impl Kernel {
    pub fn name(self, dtype: DType) -> &'static str {
        match (self, dtype) {
            (Kernel::Float(name), _) => name,
            (Kernel::Quantized { quint8, .. }, DType::QUInt8) => quint8,
            (Kernel::Quantized { qint8, .. }, _) => qint8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    /// One invocation per 4x4 output block.
    Blocks4x4,
    /// One invocation per 2x2 output block of four batches.
    Blocks2x2Batch4,
}

impl Geometry {
    /// Global grid for an output of `sizes` (`[rows, cols]` or
    /// `[batch, rows, cols]`).
    pub fn global(self, sizes: &[usize]) -> [u32; 3] {
        let g = match (self, sizes) {
            (Geometry::Blocks4x4, &[m, n]) => [div_up(n, 4), div_up(m, 4), 1],
            (Geometry::Blocks2x2Batch4, &[b, h, n]) => [div_up(n, 2), div_up(h, 2), div_up(b, 4)],
            _ => [0, 0, 0],
        };
        g.map(|v| v as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockShape {
    Mm,
    Addmm,
    QuantizedMm,
    QuantizedAddmm,
    Bmm,
    Baddbmm,
}

impl BlockShape {
    pub fn size(self) -> usize {
        match self {
            BlockShape::Mm => std::mem::size_of::<MmBlock>(),
            BlockShape::Addmm => std::mem::size_of::<AddmmBlock>(),
            BlockShape::QuantizedMm => std::mem::size_of::<QuantizedMmBlock>(),
            BlockShape::QuantizedAddmm => std::mem::size_of::<QuantizedAddmmBlock>(),
            BlockShape::Bmm => std::mem::size_of::<BmmBlock>(),
            BlockShape::Baddbmm => std::mem::size_of::<BaddbmmBlock>(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantSpec {
    pub kernel: Kernel,
    pub geometry: Geometry,
    pub block: BlockShape,
}

const fn float(name: &'static str, geometry: Geometry, block: BlockShape) -> Option<VariantSpec> {
    Some(VariantSpec {
        kernel: Kernel::Float(name),
        geometry,
        block,
    })
}

const fn quantized(
    qint8: &'static str,
    quint8: &'static str,
    block: BlockShape,
) -> Option<VariantSpec> {
    Some(VariantSpec {
        kernel: Kernel::Quantized { qint8, quint8 },
        geometry: Geometry::Blocks4x4,
        block,
    })
}

/// Indexed by [`VariantKey::index`]. Batched quantized has no kernel.
static VARIANTS: [Option<VariantSpec>; 8] = [
    float("mm", Geometry::Blocks4x4, BlockShape::Mm),
    float("addmm", Geometry::Blocks4x4, BlockShape::Addmm),
    float("bmm", Geometry::Blocks2x2Batch4, BlockShape::Bmm),
    float("baddbmm", Geometry::Blocks2x2Batch4, BlockShape::Baddbmm),
    quantized("quantized_mm_qint8", "quantized_mm_quint8", BlockShape::QuantizedMm),
    quantized("quantized_addmm_qint8", "quantized_addmm_quint8", BlockShape::QuantizedAddmm),
    None,
    None,
];

pub fn lookup(key: VariantKey) -> Option<&'static VariantSpec> {
    VARIANTS[key.index()].as_ref()
}

/// Everything a uniform block may need, gathered once per call.
struct BlockInputs<'a> {
    out: &'a GpuTensor,
    input: &'a GpuTensor,
    lc: &'a LinearContext,
    k: usize,
    alpha: f32,
    beta: f32,
    output_quant: Option<QuantParams>,
}

fn quant_of(t: &GpuTensor, what: &str) -> Result<QuantParams> {
    t.quant_params().ok_or_else(|| {
        LinearError::Usability(format!("{} is missing quantization parameters", what))
    })
}

fn build_block(shape: BlockShape, p: &BlockInputs<'_>) -> Result<UniformParamsBuffer> {
    let out_extents = p.out.extents();
    let k = div_up(p.k, 2) as u32;
    let multiplier = [p.alpha, p.beta];
    let bias = p.lc.packed_bias();
    let buf = match shape {
        BlockShape::Mm => UniformParamsBuffer::new(&MmBlock {
            out_extents,
            k,
            multiplier,
            _pad: [0.0; 2],
        }),
        BlockShape::Addmm => UniformParamsBuffer::new(&AddmmBlock {
            out_extents,
            k,
            bias_extents: bias.extents(),
            bias_width: bias.sizes().last().copied().unwrap_or(1) as u32,
            multiplier,
            _pad: [0.0; 2],
        }),
        BlockShape::Bmm => UniformParamsBuffer::new(&BmmBlock {
            out_extents,
            k,
            multiplier,
            _pad: [0.0; 2],
        }),
        BlockShape::Baddbmm => UniformParamsBuffer::new(&BaddbmmBlock {
            out_extents,
            k,
            bias_extents: bias.extents(),
            _pad0: 0,
            multiplier,
            _pad1: [0.0; 2],
        }),
        BlockShape::QuantizedMm | BlockShape::QuantizedAddmm => {
            let iq = quant_of(p.input, "input")?;
            let wq = quant_of(p.lc.packed_weight(), "weight")?;
            let oq = p.output_quant.ok_or_else(|| {
                LinearError::Usability("quantized call needs an output scale".to_string())
            })?;
            let q = QuantizedMmBlock {
                out_extents,
                k,
                input_extents: p.input.extents(),
                k_exact: p.k as u32,
                weight_extents: p.lc.packed_weight().extents(),
                _pad0: 0,
                multiplier,
                input_scales: [iq.scale as f32, wq.scale as f32],
                input_zero_points: [iq.zero_point as i32, wq.zero_point as i32],
                out_scale: oq.scale as f32,
                out_zero_point: oq.zero_point as i32,
            };
            if shape == BlockShape::QuantizedMm {
                UniformParamsBuffer::new(&q)
            } else {
                UniformParamsBuffer::new(&QuantizedAddmmBlock {
                    out_extents: q.out_extents,
                    k: q.k,
                    input_extents: q.input_extents,
                    k_exact: q.k_exact,
                    weight_extents: q.weight_extents,
                    _pad0: 0,
                    multiplier: q.multiplier,
                    input_scales: q.input_scales,
                    input_zero_points: q.input_zero_points,
                    out_scale: q.out_scale,
                    out_zero_point: q.out_zero_point,
                    bias_extents: bias.extents(),
                    _pad1: 0,
                })
            }
        }
    };
    Ok(buf)
}

/// Check that the call mode agrees with the packed weight and the input.
fn check_mode(lc: &LinearContext, input: &GpuTensor, quantized: bool) -> Result<()> {
    let weight = lc.packed_weight();
    if quantized {
        if !weight.is_quantized() || !input.is_quantized() {
            return Err(LinearError::Usability(
                "quantized multiply needs a quantized weight and a quantized input".to_string(),
            ));
        }
    } else {
        if weight.dtype() != DType::F32 || input.dtype() != DType::F32 {
            return Err(LinearError::Usability(format!(
                "float multiply got a {} weight and a {} input",
                weight.dtype(),
                input.dtype()
            )));
        }
        if !lc.is_batched() && weight.layout() != MemoryLayout::HeightPacked {
            return Err(LinearError::Usability(format!(
                "float weight must be height-packed, got {}",
                weight.layout()
            )));
        }
    }
    Ok(())
}

/// Multiply `input` by the context, producing a fresh device tensor.
///
/// `output_quant` selects the quantized kernels and sets the output's
/// scale and zero point.
pub fn run(
    ctx: &GpuContext,
    lc: &LinearContext,
    input: &Operand,
    alpha: f32,
    beta: f32,
    output_quant: Option<QuantParams>,
) -> Result<GpuTensor> {
    let shape = Shape::from_slice(input.sizes());
    let batched = lc.is_batched();
    let quantized = output_quant.is_some();

    let staged = if batched {
        if shape.ndim() != 3 {
            return Err(LinearError::Usability(format!(
                "batched input must be rank 3, got {}",
                shape
            )));
        }
        stage(ctx, input, shape.dims(), MemoryLayout::ChannelsPacked)?
    } else {
        pack_input(ctx, input)?
    };
    let staged_sizes = staged.sizes().to_vec();

    check_usable(&staged, lc.weight_sizes(), batched).map_err(LinearError::Usability)?;
    check_mode(lc, &staged, quantized)?;

    let key = VariantKey {
        quantized,
        batched,
        bias: lc.bias_defined(),
    };
    let variant = lookup(key)
        .ok_or_else(|| LinearError::Usability(format!("no kernel for {:?}", key)))?;

    let w = lc.weight_sizes();
    let out_sizes = if batched {
        vec![staged_sizes[0], staged_sizes[1], w[2]]
    } else {
        vec![staged_sizes[0], w[1]]
    };
    let mut out = GpuTensor::new(ctx, &out_sizes, staged.dtype(), MemoryLayout::ChannelsPacked)?;
    if let Some(qp) = output_quant {
        out = out.with_quant_params(qp);
    }

    let params = build_block(
        variant.block,
        &BlockInputs {
            out: &out,
            input: &staged,
            lc,
            k: staged_sizes[staged_sizes.len() - 1],
            alpha,
            beta,
            output_quant,
        },
    )?;
    let shader = variant.kernel.name(out.dtype());
    let global = variant.geometry.global(&out_sizes);
    tracing::debug!(shader, ?key, input = %shape, output = ?out_sizes, "matmul dispatch");

    let mut barrier = PipelineBarrier::default();
    let input_img = staged.image_for_read(&mut barrier, PipelineStage::Compute);
    let weight_img = lc
        .packed_weight()
        .image_for_read(&mut barrier, PipelineStage::Compute);
    let bias_img = key
        .bias
        .then(|| lc.packed_bias().image_for_read(&mut barrier, PipelineStage::Compute));
    let out_img = out.image_for_write(&mut barrier, PipelineStage::Compute);
    let inputs: Vec<_> = [Some(input_img), Some(weight_img), bias_img]
        .into_iter()
        .flatten()
        .collect();
    ctx.submit_compute_job(
        shader,
        barrier,
        global,
        LOCAL_SIZE,
        out_img,
        &inputs,
        &params,
    )?;

    if !batched && shape.ndim() > 2 {
        let restored = shape.with_last(w[1]);
        return Ok(packing::reshape(ctx, &out, restored.dims())?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_table() {
        for key in VariantKey::all() {
            let variant = lookup(key);
            if key.quantized && key.batched {
                assert!(variant.is_none(), "{:?} must be unsupported", key);
                continue;
            }
            let variant = variant.unwrap();
            let want_geometry = if key.batched {
                Geometry::Blocks2x2Batch4
            } else {
                Geometry::Blocks4x4
            };
            assert_eq!(variant.geometry, want_geometry);
            assert_eq!(matches!(variant.kernel, Kernel::Quantized { .. }), key.quantized);
        }
        let q = lookup(VariantKey {
            quantized: true,
            batched: false,
            bias: true,
        })
        .unwrap();
        assert_eq!(q.kernel.name(DType::QUInt8), "quantized_addmm_quint8");
        assert_eq!(q.kernel.name(DType::QInt8), "quantized_addmm_qint8");
        assert_eq!(q.block.size(), std::mem::size_of::<QuantizedAddmmBlock>());
    }

    #[test]
    fn test_key_index_is_bijective() {
        let mut seen = [false; 8];
        for key in VariantKey::all() {
            assert!(!seen[key.index()]);
            seen[key.index()] = true;
        }
        assert_eq!(VariantKey::all()[5].index(), 5);
    }

    #[test]
    fn test_geometry() {
        assert_eq!(Geometry::Blocks4x4.global(&[3, 6]), [2, 1, 1]);
        assert_eq!(Geometry::Blocks4x4.global(&[9, 4]), [1, 3, 1]);
        assert_eq!(Geometry::Blocks2x2Batch4.global(&[2, 3, 6]), [3, 2, 1]);
        assert_eq!(Geometry::Blocks2x2Batch4.global(&[5, 4, 1]), [1, 2, 2]);
    }
}
