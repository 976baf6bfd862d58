//! `tm-tensor` - Host tensors for tilemm.
//!
//! This crate provides:
//! - A host `Tensor` type (f32, qint8, quint8) with a differentiation flag
//! - Per-tensor affine quantization parameters
//! - A `ComputeBackend` trait and the reference `CpuBackend`
//! - Shape utilities and broadcasting

pub mod backend;
pub mod cpu;
pub mod dtype;
pub mod error;
pub mod quant;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use backend::ComputeBackend;
pub use cpu::CpuBackend;
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use quant::QuantParams;
pub use shape::{div_up, Shape};
pub use storage::CpuStorage;
pub use tensor::Tensor;
