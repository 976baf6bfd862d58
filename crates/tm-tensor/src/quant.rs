use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// Per-tensor affine quantization parameters.
///
/// A stored integer `q` represents the real value `(q - zero_point) * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scale: f64,
    pub zero_point: i64,
}

impl QuantParams {
    pub fn new(scale: f64, zero_point: i64) -> Self {
        QuantParams { scale, zero_point }
    }

    /// Map a stored integer back to a real value.
    pub fn dequantize(&self, q: i32) -> f32 {
        ((q as i64 - self.zero_point) as f64 * self.scale) as f32
    }

    /// Map a real value to the nearest representable integer of `dtype`.
    ///
    /// Rounds half to even and saturates at the dtype's range.
    pub fn quantize(&self, x: f32, dtype: DType) -> Result<i32> {
        let (lo, hi) = dtype.quant_range().ok_or(TensorError::UnsupportedDType {
            dtype,
            op: "quantize",
        })?;
        let q = (x as f64 / self.scale).round_ties_even() as i64 + self.zero_point;
        Ok(q.clamp(lo as i64, hi as i64) as i32)
    }
}
