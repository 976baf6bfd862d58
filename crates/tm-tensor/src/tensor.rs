use crate::backend::ComputeBackend;
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::quant::QuantParams;
use crate::shape::Shape;
use crate::storage::CpuStorage;

/// A host-resident tensor.
///
/// Holds contiguous, row-major data with an associated shape and dtype.
/// Quantized tensors carry their affine parameters; float tensors never do.
/// Operations that require computation are dispatched to a `ComputeBackend`.
#[derive(Debug, Clone)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
    dtype: DType,
    quant: Option<QuantParams>,
    requires_grad: bool,
}

impl Tensor {
    /// Create a new f32 tensor from data and a shape.
    ///
    /// # Panics
    /// Panics if `data.len() != shape.numel()`.
    pub fn new(data: Vec<f32>, shape: Shape) -> Self {
        assert_eq!(
            data.len(),
            shape.numel(),
            "data length {} does not match shape {:?} (numel={})",
            data.len(),
            shape,
            shape.numel()
        );
        Tensor {
            storage: CpuStorage::from_f32_vec(data),
            shape,
            dtype: DType::F32,
            quant: None,
            requires_grad: false,
        }
    }

    /// Create a zero-filled f32 tensor with the given shape.
    pub fn zeros(shape: Shape) -> Self {
        let n = shape.numel();
        Tensor::new(vec![0.0; n], shape)
    }

    /// Wrap already-quantized signed integers.
    pub fn from_qint8(data: Vec<i8>, shape: Shape, params: QuantParams) -> Result<Self> {
        Tensor::from_storage(CpuStorage::I8(data), shape, DType::QInt8, Some(params))
    }

    /// Wrap already-quantized unsigned integers.
    pub fn from_quint8(data: Vec<u8>, shape: Shape, params: QuantParams) -> Result<Self> {
        Tensor::from_storage(CpuStorage::U8(data), shape, DType::QUInt8, Some(params))
    }

    /// Assemble a tensor from raw parts, checking that they agree.
    pub fn from_storage(
        storage: CpuStorage,
        shape: Shape,
        dtype: DType,
        quant: Option<QuantParams>,
    ) -> Result<Self> {
        if storage.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![storage.len()],
            });
        }
        if !storage.holds(dtype) {
            return Err(TensorError::Other(format!(
                "storage does not hold {} elements",
                dtype
            )));
        }
        if dtype.is_quantized() && quant.is_none() {
            return Err(TensorError::MissingQuantParams { dtype });
        }
        Ok(Tensor {
            storage,
            shape,
            dtype,
            quant: if dtype.is_quantized() { quant } else { None },
            requires_grad: false,
        })
    }

    /// Quantize an f32 tensor per-tensor into `dtype`.
    pub fn quantize(&self, params: QuantParams, dtype: DType) -> Result<Tensor> {
        let src = self.storage.as_f32_slice()?;
        let mut storage = CpuStorage::zeros(dtype, src.len());
        for (i, &x) in src.iter().enumerate() {
            storage.set_f32(i, params.quantize(x, dtype)? as f32);
        }
        Tensor::from_storage(storage, self.shape.clone(), dtype, Some(params))
    }

    /// Real-valued view of the data: dequantized for quantized tensors,
    /// a copy for f32 tensors.
    pub fn dequantize(&self) -> Tensor {
        let data = match self.quant {
            Some(qp) => (0..self.storage.len())
                .map(|i| qp.dequantize(self.storage.get_f32(i) as i32))
                .collect(),
            None => (0..self.storage.len()).map(|i| self.storage.get_f32(i)).collect(),
        };
        Tensor::new(data, self.shape.clone())
    }

    /// Mark the tensor as tracked (or not) for differentiation.
    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Quantization parameters, present iff the dtype is quantized.
    pub fn quant_params(&self) -> Option<QuantParams> {
        self.quant
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Returns the underlying data as an f32 slice.
    ///
    /// # Errors
    /// Returns an error for quantized tensors; use `dequantize` first.
    pub fn data_f32(&self) -> Result<&[f32]> {
        self.storage.as_f32_slice()
    }

    /// Reshape the tensor, returning a new tensor with the same data but
    /// a different shape.
    ///
    /// The total number of elements must remain the same.
    pub fn reshape(&self, new_shape: Shape) -> Result<Tensor> {
        if self.shape.numel() != new_shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: new_shape.dims().to_vec(),
            });
        }
        Ok(Tensor {
            shape: new_shape,
            ..self.clone()
        })
    }

    /// Matrix multiplication of two 2D f32 tensors using the given backend.
    ///
    /// self is [m, k], other is [k, n], result is [m, n].
    pub fn matmul(&self, other: &Tensor, backend: &dyn ComputeBackend) -> Result<Tensor> {
        if self.shape.ndim() != 2 || other.shape.ndim() != 2 {
            return Err(TensorError::Other("matmul requires 2D tensors".to_string()));
        }

        let m = self.shape.dim(0);
        let k = self.shape.dim(1);
        let k2 = other.shape.dim(0);
        let n = other.shape.dim(1);

        if k != k2 {
            return Err(TensorError::MatmulMismatch { m, k, k2, n });
        }

        let result_data = backend.matmul(self.data_f32()?, other.data_f32()?, m, k, n)?;
        Ok(Tensor::new(result_data, Shape::new(vec![m, n])))
    }

    /// Batched matrix multiplication of two 3D f32 tensors.
    ///
    /// self is [b, m, k], other is [b, k, n], result is [b, m, n].
    pub fn bmm(&self, other: &Tensor, backend: &dyn ComputeBackend) -> Result<Tensor> {
        if self.shape.ndim() != 3 || other.shape.ndim() != 3 {
            return Err(TensorError::Other("bmm requires 3D tensors".to_string()));
        }
        let (b, m, k) = (self.shape.dim(0), self.shape.dim(1), self.shape.dim(2));
        let (b2, k2, n) = (other.shape.dim(0), other.shape.dim(1), other.shape.dim(2));
        if b != b2 {
            return Err(TensorError::ShapeMismatch {
                expected: vec![b],
                got: vec![b2],
            });
        }
        if k != k2 {
            return Err(TensorError::MatmulMismatch { m, k, k2, n });
        }

        let result_data =
            backend.batched_matmul(self.data_f32()?, other.data_f32()?, b, m, k, n)?;
        Ok(Tensor::new(result_data, Shape::new(vec![b, m, n])))
    }

    /// Element-wise `self * alpha + other * beta`, broadcasting `other`
    /// onto `self`'s shape.
    pub fn add_scaled(
        &self,
        other: &Tensor,
        alpha: f32,
        beta: f32,
        backend: &dyn ComputeBackend,
    ) -> Result<Tensor> {
        let target = Shape::broadcast_shape(&self.shape, &other.shape)?;
        if target != self.shape {
            return Err(TensorError::BroadcastError {
                a: self.shape.dims().to_vec(),
                b: other.shape.dims().to_vec(),
            });
        }
        let lhs = backend.scale(self.data_f32()?, alpha)?;
        let rhs = backend.broadcast_to(other.data_f32()?, &other.shape, &self.shape)?;
        let rhs = backend.scale(&rhs, beta)?;
        Ok(Tensor::new(backend.add(&lhs, &rhs)?, self.shape.clone()))
    }

    /// Returns the underlying storage reference.
    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }
}
