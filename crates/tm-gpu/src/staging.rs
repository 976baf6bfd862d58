//! Host-visible staging memory and the transfers between it and images.
//!
//! A staging buffer holds a tensor's elements in contiguous row-major
//! order. Uploads scatter those elements into the texels of an image
//! according to the destination layout; downloads gather them back.

use bytemuck::Pod;
use memmap2::MmapMut;
use tm_tensor::{CpuStorage, DType};

use crate::barrier::{PipelineBarrier, PipelineStage};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::layout::texel_of;
use crate::tensor::GpuTensor;

/// Anonymous host mapping sized for `numel` elements of `dtype`.
pub struct StagingBuffer {
    dtype: DType,
    numel: usize,
    map: MmapMut,
}

impl std::fmt::Debug for StagingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingBuffer")
            .field("dtype", &self.dtype)
            .field("numel", &self.numel)
            .finish()
    }
}

impl StagingBuffer {
    pub fn new(dtype: DType, numel: usize) -> Result<Self> {
        let len = numel * dtype.size_in_bytes();
        let map = MmapMut::map_anon(len.max(1)).map_err(|e| {
            GpuError::AllocationFailed(format!("staging buffer of {} bytes: {}", len, e))
        })?;
        Ok(StagingBuffer { dtype, numel, map })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn numel(&self) -> usize {
        self.numel
    }

    fn bytes(&self) -> &[u8] {
        &self.map[..self.numel * self.dtype.size_in_bytes()]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.numel * self.dtype.size_in_bytes();
        &mut self.map[..len]
    }

    /// View the mapped memory as elements of `T`.
    pub fn map<T: Pod>(&self) -> Result<&[T]> {
        self.check_element::<T>()?;
        bytemuck::try_cast_slice(self.bytes())
            .map_err(|e| GpuError::InvalidArgument(format!("staging view: {}", e)))
    }

    pub fn map_mut<T: Pod>(&mut self) -> Result<&mut [T]> {
        self.check_element::<T>()?;
        bytemuck::try_cast_slice_mut(self.bytes_mut())
            .map_err(|e| GpuError::InvalidArgument(format!("staging view: {}", e)))
    }

    fn check_element<T: Pod>(&self) -> Result<()> {
        if std::mem::size_of::<T>() != self.dtype.size_in_bytes() {
            return Err(GpuError::InvalidArgument(format!(
                "cannot view {} staging memory as {}-byte elements",
                self.dtype,
                std::mem::size_of::<T>()
            )));
        }
        Ok(())
    }

    /// Copy host storage into the mapping.
    pub fn write_storage(&mut self, storage: &CpuStorage) -> Result<()> {
        if storage.len() != self.numel || !storage.holds(self.dtype) {
            return Err(GpuError::InvalidArgument(format!(
                "staging buffer holds {} {} elements, got {} elements of another kind",
                self.numel,
                self.dtype,
                storage.len()
            )));
        }
        match storage {
            CpuStorage::F32(v) => self.map_mut::<f32>()?.copy_from_slice(v),
            CpuStorage::I8(v) => self.map_mut::<i8>()?.copy_from_slice(v),
            CpuStorage::U8(v) => self.map_mut::<u8>()?.copy_from_slice(v),
        }
        Ok(())
    }

    /// Copy the mapping out into host storage.
    pub fn read_storage(&self) -> Result<CpuStorage> {
        Ok(match self.dtype {
            DType::F32 => CpuStorage::F32(self.map::<f32>()?.to_vec()),
            DType::QInt8 => CpuStorage::I8(self.map::<i8>()?.to_vec()),
            DType::QUInt8 => CpuStorage::U8(self.map::<u8>()?.to_vec()),
        })
    }
}

fn check_transfer(staging: &StagingBuffer, tensor: &GpuTensor) -> Result<()> {
    if staging.dtype != tensor.dtype() || staging.numel != tensor.numel() {
        return Err(GpuError::InvalidArgument(format!(
            "staging buffer ({} x {}) does not match tensor {:?} ({})",
            staging.numel,
            staging.dtype,
            tensor.sizes(),
            tensor.dtype()
        )));
    }
    Ok(())
}

/// Upload staging contents into `tensor`'s image, honoring its layout.
pub fn pack_staging_to_tensor(
    ctx: &GpuContext,
    staging: &StagingBuffer,
    tensor: &mut GpuTensor,
) -> Result<()> {
    check_transfer(staging, tensor)?;
    let src = staging.read_storage()?;
    let sizes = tensor.whcn();
    let layout = tensor.layout();

    let mut barrier = PipelineBarrier::default();
    let image = tensor.image_for_write(&mut barrier, PipelineStage::Transfer);
    for i in 0..src.len() {
        let (pos, comp) = texel_of(&sizes, layout, sizes.coords(i));
        image.set_component(pos, comp, src.get_f32(i));
    }
    ctx.record_transfer("pack_staging_to_tensor", barrier);
    Ok(())
}

/// Download `tensor`'s image into staging memory in row-major order.
pub fn pack_tensor_to_staging(
    ctx: &GpuContext,
    tensor: &GpuTensor,
    staging: &mut StagingBuffer,
) -> Result<()> {
    check_transfer(staging, tensor)?;
    let sizes = tensor.whcn();
    let layout = tensor.layout();

    let mut barrier = PipelineBarrier::default();
    let image = tensor.image_for_read(&mut barrier, PipelineStage::Transfer);
    let mut out = CpuStorage::zeros(staging.dtype, staging.numel);
    for i in 0..out.len() {
        let (pos, comp) = texel_of(&sizes, layout, sizes.coords(i));
        out.set_f32(i, image.component(pos, comp));
    }
    staging.write_storage(&out)?;
    ctx.record_transfer("pack_tensor_to_staging", barrier);
    Ok(())
}
