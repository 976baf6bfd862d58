//! Emulated image-based GPU device.
//!
//! Tensors live in 3-D RGBA images under one of three packings. Work is
//! submitted to a [`GpuContext`] as compute dispatches over registered
//! kernels; ordering between dispatches is expressed with per-image
//! barriers derived from access tracking.

pub mod barrier;
pub mod config;
pub mod context;
pub mod error;
pub mod image;
pub mod layout;
pub mod packing;
pub mod params;
pub mod shaders;
pub mod staging;
pub mod tensor;

pub use barrier::{
    AccessState, Hazard, ImageBarrier, MemoryAccess, PipelineBarrier, PipelineStage, ResourceId,
};
pub use config::GpuConfig;
pub use context::{GpuContext, JobKind, Submission};
pub use error::{GpuError, Result};
pub use image::Image;
pub use layout::{image_extents, LayoutConversion, MemoryLayout, Whcn};
pub use params::UniformParamsBuffer;
pub use shaders::{ShaderInfo, ShaderRegistry};
pub use staging::StagingBuffer;
pub use tensor::GpuTensor;
