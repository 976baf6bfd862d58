//! Compute kernels executed by the emulated device.
//!
//! A kernel is a plain function invoked once per global invocation id. It
//! reads its uniform block and input images through [`Bindings`] and writes
//! texels of the single output image. Invocations past the logical grid
//! must return without touching memory, as the grid is rounded up to whole
//! workgroups.

mod bmm;
mod mm;
mod quantized;
mod relayout;

use std::collections::HashMap;

use bytemuck::Pod;

use crate::error::{GpuError, Result};
use crate::image::Image;
use crate::params::{
    AddmmBlock, BaddbmmBlock, BmmBlock, MmBlock, QuantizedAddmmBlock, QuantizedMmBlock,
    RelayoutBlock,
};

/// Resources bound to one dispatch.
pub struct Bindings<'a> {
    pub output: &'a mut Image,
    pub inputs: &'a [&'a Image],
    pub params: &'a [u8],
}

impl Bindings<'_> {
    pub fn params<T: Pod>(&self) -> T {
        bytemuck::pod_read_unaligned(self.params)
    }

    pub fn input(&self, slot: usize) -> &Image {
        self.inputs[slot]
    }
}

pub type KernelFn = fn(&mut Bindings<'_>, [u32; 3]);

/// Static description of a registered shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderInfo {
    pub name: &'static str,
    pub num_inputs: usize,
    pub params_size: usize,
}

#[derive(Clone)]
struct Entry {
    info: ShaderInfo,
    kernel: KernelFn,
}

/// Name-keyed table of the kernels a context can dispatch.
#[derive(Clone, Default)]
pub struct ShaderRegistry {
    entries: HashMap<&'static str, Entry>,
}

impl std::fmt::Debug for ShaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("ShaderRegistry").field("shaders", &names).finish()
    }
}

impl ShaderRegistry {
    pub fn empty() -> Self {
        ShaderRegistry::default()
    }

    /// Registry holding every kernel shipped with the crate.
    pub fn builtin() -> Self {
        let mut r = ShaderRegistry::empty();
        r.register::<MmBlock>("mm", 2, mm::mm);
        r.register::<AddmmBlock>("addmm", 3, mm::addmm);
        r.register::<QuantizedMmBlock>("quantized_mm_qint8", 2, quantized::mm_qint8);
        r.register::<QuantizedMmBlock>("quantized_mm_quint8", 2, quantized::mm_quint8);
        r.register::<QuantizedAddmmBlock>("quantized_addmm_qint8", 3, quantized::addmm_qint8);
        r.register::<QuantizedAddmmBlock>("quantized_addmm_quint8", 3, quantized::addmm_quint8);
        r.register::<BmmBlock>("bmm", 2, bmm::bmm);
        r.register::<BaddbmmBlock>("baddbmm", 3, bmm::baddbmm);
        r.register::<RelayoutBlock>("relayout", 1, relayout::relayout);
        r
    }

    /// Register `kernel` under `name`, taking a uniform block of type `P`.
    pub fn register<P: Pod>(&mut self, name: &'static str, num_inputs: usize, kernel: KernelFn) {
        let info = ShaderInfo {
            name,
            num_inputs,
            params_size: std::mem::size_of::<P>(),
        };
        self.entries.insert(name, Entry { info, kernel });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn info(&self, name: &str) -> Result<ShaderInfo> {
        self.entries
            .get(name)
            .map(|e| e.info)
            .ok_or_else(|| GpuError::ShaderNotFound(name.to_string()))
    }

    pub(crate) fn kernel(&self, name: &str) -> Result<KernelFn> {
        self.entries
            .get(name)
            .map(|e| e.kernel)
            .ok_or_else(|| GpuError::ShaderNotFound(name.to_string()))
    }
}

/// Texel fetch by unsigned coordinates.
pub(crate) fn fetch(image: &Image, x: u32, y: u32, z: u32) -> [f32; 4] {
    image.fetch(x as i64, y as i64, z as i64)
}

/// Element `(row, col)` of plane-tiled image slice `z`. A tiled extent of 1
/// broadcasts along that axis.
pub(crate) fn tiled_element(image: &Image, row: u32, col: u32, z: u32) -> f32 {
    let [ex, ey, ez] = image.extents();
    let x = if ex == 1 { 0 } else { col / 2 };
    let y = if ey == 1 { 0 } else { row / 2 };
    let z = if ez == 1 { 0 } else { z };
    fetch(image, x, y, z)[(2 * (row % 2) + (col % 2)) as usize]
}

/// Dot product of two texels.
pub(crate) fn dot(a: [f32; 4], b: [f32; 4]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
