use tm_gpu::{GpuContext, GpuTensor};
use tm_tensor::QuantParams;

use crate::bias::pack_bias;
use crate::config::LinearConfig;
use crate::dispatch;
use crate::error::{LinearError, Result};
use crate::operand::Operand;
use crate::pack::pack_weight;
use crate::validate::check_available;

/// The (weight, bias) pair a context was built from.
#[derive(Debug)]
pub struct Unpacked {
    pub weight: Operand,
    pub bias: Option<Operand>,
}

/// A weight and bias packed once for repeated multiplication.
///
/// Immutable after construction: running it only reads the packed images,
/// so a context can be shared across threads and reused freely.
#[derive(Debug)]
pub struct LinearContext {
    packed_weight: GpuTensor,
    packed_bias: GpuTensor,
    weight_sizes: Vec<usize>,
    bias_defined: bool,
    batched: bool,
    originals: Option<Unpacked>,
}

impl LinearContext {
    /// Validate and pack `weight` and `bias`.
    ///
    /// # Errors
    /// `Construction` when the pair is not available on the packed path;
    /// device errors from the uploads propagate unchanged.
    pub fn new(
        ctx: &GpuContext,
        weight: Operand,
        bias: Option<Operand>,
        batched: bool,
        config: &LinearConfig,
    ) -> Result<Self> {
        check_available(&weight, bias.as_ref(), batched).map_err(LinearError::Construction)?;

        let weight_sizes = weight.sizes().to_vec();
        let residency = weight.residency();
        let bias_defined = bias.is_some();
        let packed_weight = pack_weight(ctx, &weight, batched)?;

        // a device bias is moved into the context, so retaining it needs a copy
        let (bias_for_packing, retained_bias) = match (bias, config.retain_originals) {
            (Some(b @ Operand::Device(_)), true) => {
                let dup = b.duplicate(ctx)?;
                (Some(dup), Some(b))
            }
            (Some(Operand::Host(t)), true) => {
                (Some(Operand::Host(t.clone())), Some(Operand::Host(t)))
            }
            (bias, _) => (bias, None),
        };
        let packed_bias = pack_bias(ctx, weight.dtype(), bias_for_packing, batched)?;

        let originals = config.retain_originals.then(|| Unpacked {
            weight,
            bias: retained_bias,
        });

        tracing::debug!(
            weight = ?weight_sizes,
            ?residency,
            bias_defined,
            batched,
            quantized = packed_weight.is_quantized(),
            retained = originals.is_some(),
            "created linear context"
        );
        Ok(LinearContext {
            packed_weight,
            packed_bias,
            weight_sizes,
            bias_defined,
            batched,
            originals,
        })
    }

    /// Rebuild a context from a previously exported pair.
    pub fn pack(
        ctx: &GpuContext,
        unpacked: Unpacked,
        batched: bool,
        config: &LinearConfig,
    ) -> Result<Self> {
        LinearContext::new(ctx, unpacked.weight, unpacked.bias, batched, config)
    }

    /// The retained originals, when the context was built to keep them.
    pub fn unpacked(&self) -> Option<&Unpacked> {
        self.originals.as_ref()
    }

    pub fn into_unpacked(self) -> Option<Unpacked> {
        self.originals
    }

    pub fn packed_weight(&self) -> &GpuTensor {
        &self.packed_weight
    }

    pub fn packed_bias(&self) -> &GpuTensor {
        &self.packed_bias
    }

    /// Weight sizes before packing.
    pub fn weight_sizes(&self) -> &[usize] {
        &self.weight_sizes
    }

    pub fn bias_defined(&self) -> bool {
        self.bias_defined
    }

    pub fn is_batched(&self) -> bool {
        self.batched
    }

    pub fn is_quantized(&self) -> bool {
        self.packed_weight.is_quantized()
    }

    /// Float multiply: `alpha * (input . W) + beta * bias`.
    pub fn run(
        &self,
        ctx: &GpuContext,
        input: &Operand,
        alpha: f32,
        beta: f32,
    ) -> Result<GpuTensor> {
        dispatch::run(ctx, self, input, alpha, beta, None)
    }

    /// Quantized multiply, requantizing into `output`.
    pub fn run_quantized(
        &self,
        ctx: &GpuContext,
        input: &Operand,
        alpha: f32,
        beta: f32,
        output: QuantParams,
    ) -> Result<GpuTensor> {
        dispatch::run(ctx, self, input, alpha, beta, Some(output))
    }
}
