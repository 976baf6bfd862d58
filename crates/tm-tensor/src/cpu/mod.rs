use crate::backend::ComputeBackend;
use crate::error::{Result, TensorError};
use crate::shape::Shape;

/// Pure-Rust CPU compute backend.
///
/// Implements all operations with straightforward loops optimized for
/// correctness rather than peak performance. Serves as the reference the
/// tiled GPU path is compared against.
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>> {
        self.batched_matmul(a, b, 1, m, k, n)
    }

    fn batched_matmul(
        &self,
        a: &[f32],
        b: &[f32],
        batch: usize,
        m: usize,
        k: usize,
        n: usize,
    ) -> Result<Vec<f32>> {
        if a.len() != batch * m * k {
            return Err(TensorError::Other(format!(
                "matmul: a.len()={} but expected batch*m*k={}",
                a.len(),
                batch * m * k
            )));
        }
        if b.len() != batch * k * n {
            return Err(TensorError::Other(format!(
                "matmul: b.len()={} but expected batch*k*n={}",
                b.len(),
                batch * k * n
            )));
        }

        let mut c = vec![0.0f32; batch * m * n];
        for bi in 0..batch {
            let a = &a[bi * m * k..(bi + 1) * m * k];
            let b = &b[bi * k * n..(bi + 1) * k * n];
            let c = &mut c[bi * m * n..(bi + 1) * m * n];
            for i in 0..m {
                for j in 0..n {
                    let mut sum = 0.0f32;
                    for p in 0..k {
                        sum += a[i * k + p] * b[p * n + j];
                    }
                    c[i * n + j] = sum;
                }
            }
        }
        Ok(c)
    }

    fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        if a.len() != b.len() {
            return Err(TensorError::ShapeMismatch {
                expected: vec![a.len()],
                got: vec![b.len()],
            });
        }
        Ok(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect())
    }

    fn scale(&self, a: &[f32], s: f32) -> Result<Vec<f32>> {
        Ok(a.iter().map(|x| x * s).collect())
    }

    fn broadcast_to(&self, x: &[f32], from: &Shape, to: &Shape) -> Result<Vec<f32>> {
        if x.len() != from.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: from.dims().to_vec(),
                got: vec![x.len()],
            });
        }
        if from.ndim() > to.ndim() || Shape::broadcast_shape(from, to)? != *to {
            return Err(TensorError::BroadcastError {
                a: from.dims().to_vec(),
                b: to.dims().to_vec(),
            });
        }
        Ok((0..to.numel())
            .map(|i| x[from.broadcast_index(to, i)])
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> CpuBackend {
        CpuBackend::new()
    }

    #[test]
    fn test_matmul_identity() {
        let b = backend();
        let a = vec![1.0, 0.0, 0.0, 1.0];
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let c = b.matmul(&a, &x, 2, 2, 2).unwrap();
        assert_eq!(c, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_matmul_rectangular() {
        let b = backend();
        // [1,2,3] @ [[1,0],[0,1],[1,1]] = [4,5]
        let a = vec![1.0, 2.0, 3.0];
        let x = vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let c = b.matmul(&a, &x, 1, 3, 2).unwrap();
        assert_eq!(c, vec![4.0, 5.0]);
    }

    #[test]
    fn test_batched_matmul_independent_batches() {
        let b = backend();
        // two batches of [1x2] @ [2x1]
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let x = vec![2.0, 3.0, 1.0, -1.0];
        let c = b.batched_matmul(&a, &x, 2, 1, 2, 1).unwrap();
        assert_eq!(c, vec![8.0, -1.0]);
    }

    #[test]
    fn test_matmul_length_mismatch() {
        let b = backend();
        assert!(b.matmul(&[1.0, 2.0], &[1.0], 1, 2, 1).is_err());
    }

    #[test]
    fn test_add_and_scale() {
        let b = backend();
        assert_eq!(b.add(&[1.0, 2.0], &[3.0, 4.0]).unwrap(), vec![4.0, 6.0]);
        assert_eq!(b.scale(&[1.0, 2.0, 3.0], 2.0).unwrap(), vec![2.0, 4.0, 6.0]);
        assert!(b.add(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_broadcast_to() {
        let b = backend();
        let from = Shape::new(vec![2, 1]);
        let to = Shape::new(vec![3, 2, 2]);
        let r = b.broadcast_to(&[1.0, 2.0], &from, &to).unwrap();
        assert_eq!(r, vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]);
        assert!(b.broadcast_to(&[1.0, 2.0, 3.0], &Shape::new(vec![3]), &to).is_err());
    }
}
