use std::fmt::Debug;

use crate::error::Result;
use crate::shape::Shape;

/// Trait for dense host compute backends.
///
/// All operations work on row-major f32 slices and return owned vectors.
/// The accelerated matmul path is checked against an implementation of this
/// trait.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu").
    fn name(&self) -> &str;

    /// Matrix multiplication: C = A @ B.
    ///
    /// - `a`: row-major data of shape [m, k]
    /// - `b`: row-major data of shape [k, n]
    /// - Returns: row-major data of shape [m, n]
    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>>;

    /// Batched matrix multiplication: C[i] = A[i] @ B[i] for each of
    /// `batch` matrices laid out back to back.
    fn batched_matmul(
        &self,
        a: &[f32],
        b: &[f32],
        batch: usize,
        m: usize,
        k: usize,
        n: usize,
    ) -> Result<Vec<f32>>;

    /// Element-wise addition: result[i] = a[i] + b[i].
    fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>>;

    /// Scalar multiplication: result[i] = a[i] * s.
    fn scale(&self, a: &[f32], s: f32) -> Result<Vec<f32>>;

    /// Materialize `x` of shape `from` broadcast to shape `to`.
    fn broadcast_to(&self, x: &[f32], from: &Shape, to: &Shape) -> Result<Vec<f32>>;
}
