use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinearError {
    /// The (weight, bias) pair cannot be represented by the packed path.
    #[error("linear context unavailable: {0}")]
    Construction(String),
    /// A valid context was handed an input it cannot multiply.
    #[error("input not usable with linear context: {0}")]
    Usability(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Gpu(#[from] tm_gpu::GpuError),
    #[error(transparent)]
    Tensor(#[from] tm_tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, LinearError>;
