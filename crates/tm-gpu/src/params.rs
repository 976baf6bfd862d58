//! Uniform blocks passed to compute kernels.
//!
//! Each block is `#[repr(C)]` with explicit padding so its byte image is
//! identical to what a shader would read from a uniform buffer.

use bytemuck::{Pod, Zeroable};

/// Byte copy of a uniform block, bound alongside a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformParamsBuffer {
    bytes: Vec<u8>,
}

impl UniformParamsBuffer {
    pub fn new<T: Pod>(block: &T) -> Self {
        UniformParamsBuffer {
            bytes: bytemuck::bytes_of(block).to_vec(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// `mm`: output extents, 2-wide inner groups, `[alpha, beta]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MmBlock {
    pub out_extents: [u32; 3],
    pub k: u32,
    pub multiplier: [f32; 2],
    pub _pad: [f32; 2],
}

/// `addmm`: as `mm`, plus the width-packed bias extents and the bias'
/// logical width (1 means broadcast along columns).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AddmmBlock {
    pub out_extents: [u32; 3],
    pub k: u32,
    pub bias_extents: [u32; 3],
    pub bias_width: u32,
    pub multiplier: [f32; 2],
    pub _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuantizedMmBlock {
    pub out_extents: [u32; 3],
    pub k: u32,
    pub input_extents: [u32; 3],
    /// Inner dimension before rounding to 2-wide groups.
    pub k_exact: u32,
    pub weight_extents: [u32; 3],
    pub _pad0: u32,
    pub multiplier: [f32; 2],
    /// `[input, weight]`
    pub input_scales: [f32; 2],
    /// `[input, weight]`
    pub input_zero_points: [i32; 2],
    pub out_scale: f32,
    pub out_zero_point: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuantizedAddmmBlock {
    pub out_extents: [u32; 3],
    pub k: u32,
    pub input_extents: [u32; 3],
    pub k_exact: u32,
    pub weight_extents: [u32; 3],
    pub _pad0: u32,
    pub multiplier: [f32; 2],
    pub input_scales: [f32; 2],
    pub input_zero_points: [i32; 2],
    pub out_scale: f32,
    pub out_zero_point: i32,
    pub bias_extents: [u32; 3],
    pub _pad1: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BmmBlock {
    pub out_extents: [u32; 3],
    pub k: u32,
    pub multiplier: [f32; 2],
    pub _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BaddbmmBlock {
    pub out_extents: [u32; 3],
    pub k: u32,
    pub bias_extents: [u32; 3],
    pub _pad0: u32,
    pub multiplier: [f32; 2],
    pub _pad1: [f32; 2],
}

/// Element-wise relayout between two (sizes, layout) descriptions of the
/// same elements in row-major order. Sizes are WHCN.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RelayoutBlock {
    pub dst_sizes: [u32; 4],
    pub src_sizes: [u32; 4],
    pub dst_layout: u32,
    pub src_layout: u32,
    pub _pad: [u32; 2],
}
