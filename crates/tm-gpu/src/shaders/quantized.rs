//! Non-batched quantized matmul over a 4-plane tiled weight.
//!
//! The weight texel `(c/2, k/2)` holds the 2x2 block containing `(k, c)` in
//! component `2*(k%2) + (c%2)`. Accumulation runs over the exact inner
//! dimension so zero-point offsets never leak in from padding.

use tm_tensor::DType;

use super::{fetch, tiled_element, Bindings};
use crate::params::{QuantizedAddmmBlock, QuantizedMmBlock};

const BLOCK: u32 = 4;

/// The fields shared by both quantized blocks.
struct Quant {
    out_extents: [u32; 3],
    k_exact: u32,
    multiplier: [f32; 2],
    scales: [f32; 2],
    zero_points: [i32; 2],
    out_scale: f32,
    out_zero_point: i32,
}

impl From<QuantizedMmBlock> for Quant {
    fn from(p: QuantizedMmBlock) -> Self {
        Quant {
            out_extents: p.out_extents,
            k_exact: p.k_exact,
            multiplier: p.multiplier,
            scales: p.input_scales,
            zero_points: p.input_zero_points,
            out_scale: p.out_scale,
            out_zero_point: p.out_zero_point,
        }
    }
}

impl From<QuantizedAddmmBlock> for Quant {
    fn from(p: QuantizedAddmmBlock) -> Self {
        Quant {
            out_extents: p.out_extents,
            k_exact: p.k_exact,
            multiplier: p.multiplier,
            scales: p.input_scales,
            zero_points: p.input_zero_points,
            out_scale: p.out_scale,
            out_zero_point: p.out_zero_point,
        }
    }
}

fn dequantize(q: f32, scale: f32, zero_point: i32) -> f32 {
    (q - zero_point as f32) * scale
}

fn requantize(x: f32, scale: f32, zero_point: i32, dtype: DType) -> f32 {
    let (lo, hi) = dtype.quant_range().unwrap_or((i32::MIN, i32::MAX));
    let q = (x / scale).round_ties_even() as i64 + zero_point as i64;
    q.clamp(lo as i64, hi as i64) as f32
}

fn run(b: &mut Bindings<'_>, q: Quant, id: [u32; 3], dtype: DType, with_bias: bool) {
    let [out_w, out_h, _] = q.out_extents;
    if id[0] * BLOCK >= out_w || id[1] * BLOCK >= out_h || id[2] > 0 {
        return;
    }
    let [alpha, beta] = q.multiplier;
    for r in 0..BLOCK {
        let row = id[1] * BLOCK + r;
        for c in 0..BLOCK {
            let col = id[0] * BLOCK + c;
            if row >= out_h || col >= out_w {
                continue;
            }
            let mut sum = 0.0f32;
            for k in 0..q.k_exact {
                let a = fetch(b.input(0), k / 4, row, 0)[(k % 4) as usize];
                let w = fetch(b.input(1), col / 2, k / 2, 0)[(2 * (k % 2) + (col % 2)) as usize];
                sum += dequantize(a, q.scales[0], q.zero_points[0])
                    * dequantize(w, q.scales[1], q.zero_points[1]);
            }
            let mut value = alpha * sum;
            if with_bias {
                value += beta * tiled_element(b.input(2), row, col, 0);
            }
            let out = requantize(value, q.out_scale, q.out_zero_point, dtype);
            b.output.store(col as i64, row as i64, 0, [out, 0.0, 0.0, 0.0]);
        }
    }
}

pub(super) fn mm_qint8(b: &mut Bindings<'_>, id: [u32; 3]) {
    let p: QuantizedMmBlock = b.params();
    run(b, p.into(), id, DType::QInt8, false);
}

pub(super) fn mm_quint8(b: &mut Bindings<'_>, id: [u32; 3]) {
    let p: QuantizedMmBlock = b.params();
    run(b, p.into(), id, DType::QUInt8, false);
}

pub(super) fn addmm_qint8(b: &mut Bindings<'_>, id: [u32; 3]) {
    let p: QuantizedAddmmBlock = b.params();
    run(b, p.into(), id, DType::QInt8, true);
}

pub(super) fn addmm_quint8(b: &mut Bindings<'_>, id: [u32; 3]) {
    let p: QuantizedAddmmBlock = b.params();
    run(b, p.into(), id, DType::QUInt8, true);
}
