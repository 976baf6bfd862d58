//! Operator surface.
//!
//! The one-shot operators pack their weight into a throwaway context and
//! run it once; callers that multiply by the same weight repeatedly should
//! keep a [`LinearContext`] instead.

use tm_gpu::{GpuContext, GpuTensor};
use tm_tensor::QuantParams;

use crate::config::LinearConfig;
use crate::context::LinearContext;
use crate::error::Result;
use crate::operand::Operand;

/// `input . weight` for a 2-D weight.
pub fn mm(
    ctx: &GpuContext,
    input: impl Into<Operand>,
    weight: impl Into<Operand>,
) -> Result<GpuTensor> {
    let lc = LinearContext::new(ctx, weight.into(), None, false, &LinearConfig::default())?;
    lc.run(ctx, &input.into(), 1.0, 1.0)
}

/// `beta * bias + alpha * (input . weight)`.
pub fn addmm(
    ctx: &GpuContext,
    bias: impl Into<Operand>,
    input: impl Into<Operand>,
    weight: impl Into<Operand>,
    beta: f32,
    alpha: f32,
) -> Result<GpuTensor> {
    let config = LinearConfig::default();
    let lc = LinearContext::new(ctx, weight.into(), Some(bias.into()), false, &config)?;
    lc.run(ctx, &input.into(), alpha, beta)
}

/// Batched `input . weight` for a 3-D weight.
pub fn bmm(
    ctx: &GpuContext,
    input: impl Into<Operand>,
    weight: impl Into<Operand>,
) -> Result<GpuTensor> {
    let lc = LinearContext::new(ctx, weight.into(), None, true, &LinearConfig::default())?;
    lc.run(ctx, &input.into(), 1.0, 1.0)
}

/// Batched `beta * bias + alpha * (input . weight)`.
pub fn baddbmm(
    ctx: &GpuContext,
    bias: impl Into<Operand>,
    input: impl Into<Operand>,
    weight: impl Into<Operand>,
    beta: f32,
    alpha: f32,
) -> Result<GpuTensor> {
    let config = LinearConfig::default();
    let lc = LinearContext::new(ctx, weight.into(), Some(bias.into()), true, &config)?;
    lc.run(ctx, &input.into(), alpha, beta)
}

/// Pack a non-batched linear layer.
pub fn create_linear_context(
    ctx: &GpuContext,
    weight: impl Into<Operand>,
    bias: Option<Operand>,
    config: &LinearConfig,
) -> Result<LinearContext> {
    LinearContext::new(ctx, weight.into(), bias, false, config)
}

pub fn run_linear_context(
    ctx: &GpuContext,
    input: &Operand,
    lc: &LinearContext,
) -> Result<GpuTensor> {
    lc.run(ctx, input, 1.0, 1.0)
}

/// Quantized linear: the output is requantized with `output_scale` and
/// `output_zero_point`.
pub fn run_qlinear_context(
    ctx: &GpuContext,
    input: &Operand,
    output_scale: f64,
    output_zero_point: i64,
    lc: &LinearContext,
) -> Result<GpuTensor> {
    lc.run_quantized(ctx, input, 1.0, 1.0, QuantParams::new(output_scale, output_zero_point))
}
