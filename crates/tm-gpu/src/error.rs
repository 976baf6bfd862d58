use thiserror::Error;

use crate::layout::MemoryLayout;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("allocation failed: {0}")]
    AllocationFailed(String),
    #[error("submission of '{shader}' failed: {reason}")]
    SubmissionFailed { shader: String, reason: String },
    #[error("no shader registered under '{0}'")]
    ShaderNotFound(String),
    #[error("layout mismatch: expected {expected}, got {got}")]
    LayoutMismatch {
        expected: MemoryLayout,
        got: MemoryLayout,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] tm_tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, GpuError>;
