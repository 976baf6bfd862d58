//! `tm-linear` - Packed-weight matrix multiplication on the tiled GPU path.
//!
//! This crate provides:
//! - Layout and bias packing into the layouts the matmul kernels read
//! - Availability and usability checks for (weight, bias) pairs and inputs
//! - `LinearContext`, an immutable, shareable packed weight and bias
//! - A table-driven dispatcher over the mm / addmm / bmm / baddbmm and
//!   quantized kernels
//! - The operator surface and a name registry for it

pub mod bias;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod operand;
pub mod ops;
pub mod pack;
pub mod registry;
pub mod validate;

pub use config::LinearConfig;
pub use context::{LinearContext, Unpacked};
pub use dispatch::{lookup, VariantKey, VariantSpec};
pub use error::{LinearError, Result};
pub use operand::{Operand, Residency};
pub use ops::{
    addmm, baddbmm, bmm, create_linear_context, mm, run_linear_context, run_qlinear_context,
};
pub use registry::{MatmulArgs, MatmulOp};
pub use validate::{available, usable};
