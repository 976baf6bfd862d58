use tm_tensor::{CpuStorage, DType, QuantParams, Shape, Tensor};

use crate::barrier::{MemoryAccess, PipelineBarrier, PipelineStage};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::image::Image;
use crate::layout::{image_extents, MemoryLayout, Whcn};
use crate::staging::{self, StagingBuffer};

/// A tensor resident on the device, backed by an image it exclusively owns.
///
/// The layout tag always describes how the image is tiled; it only changes
/// by producing a new tensor through the layout-conversion primitive.
#[derive(Debug)]
pub struct GpuTensor {
    sizes: Vec<usize>,
    dtype: DType,
    quant: Option<QuantParams>,
    layout: MemoryLayout,
    image: Image,
    requires_grad: bool,
}

impl GpuTensor {
    /// Allocate a zero-filled tensor.
    ///
    /// # Errors
    /// Fails when a dimension is zero or the device refuses the allocation.
    pub fn new(
        ctx: &GpuContext,
        sizes: &[usize],
        dtype: DType,
        layout: MemoryLayout,
    ) -> Result<Self> {
        if sizes.iter().any(|&d| d == 0) {
            return Err(GpuError::InvalidArgument(format!(
                "cannot allocate tensor with empty dimension: {:?}",
                sizes
            )));
        }
        let image = ctx.allocate_image(image_extents(sizes, layout), dtype)?;
        Ok(GpuTensor {
            sizes: sizes.to_vec(),
            dtype,
            quant: None,
            layout,
            image,
            requires_grad: false,
        })
    }

    /// Upload a host tensor through a staging buffer.
    pub fn from_host(ctx: &GpuContext, tensor: &Tensor, layout: MemoryLayout) -> Result<Self> {
        let mut out = GpuTensor::new(ctx, tensor.shape().dims(), tensor.dtype(), layout)?;
        out.quant = tensor.quant_params();
        out.requires_grad = tensor.requires_grad();

        let mut staging = StagingBuffer::new(tensor.dtype(), tensor.shape().numel())?;
        staging.write_storage(tensor.storage())?;
        staging::pack_staging_to_tensor(ctx, &staging, &mut out)?;
        Ok(out)
    }

    /// Download into a host tensor of the same sizes and dtype.
    pub fn to_host(&self, ctx: &GpuContext) -> Result<Tensor> {
        let mut staging = StagingBuffer::new(self.dtype, self.numel())?;
        staging::pack_tensor_to_staging(ctx, self, &mut staging)?;
        let storage: CpuStorage = staging.read_storage()?;
        let shape = Shape::from_slice(&self.sizes);
        let tensor = Tensor::from_storage(storage, shape, self.dtype, self.quant)?;
        Ok(tensor.with_requires_grad(self.requires_grad))
    }

    pub fn with_quant_params(mut self, params: QuantParams) -> Self {
        self.quant = Some(params);
        self
    }

    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn dim(&self, i: usize) -> usize {
        self.sizes[i]
    }

    pub fn ndim(&self) -> usize {
        self.sizes.len()
    }

    pub fn numel(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn layout(&self) -> MemoryLayout {
        self.layout
    }

    pub fn quant_params(&self) -> Option<QuantParams> {
        self.quant
    }

    /// Quantized dtype with parameters attached.
    pub fn is_quantized(&self) -> bool {
        self.dtype.is_quantized() && self.quant.is_some()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn whcn(&self) -> Whcn {
        Whcn::from_sizes(&self.sizes)
    }

    pub fn extents(&self) -> [u32; 3] {
        self.image.extents()
    }

    /// Number of texel components backing the tensor, padding included.
    pub fn gpu_numel(&self) -> usize {
        self.image.texels().len()
    }

    pub fn nbytes(&self) -> usize {
        self.gpu_numel() * self.dtype.size_in_bytes()
    }

    /// Inspect the backing image without recording an access.
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Bind the image for reading at `stage`, adding any barrier required
    /// by its previous access.
    pub fn image_for_read(&self, barrier: &mut PipelineBarrier, stage: PipelineStage) -> &Image {
        self.image.bind(barrier, stage, MemoryAccess::Read);
        &self.image
    }

    /// Bind the image for writing at `stage`, adding any barrier required
    /// by its previous access.
    pub fn image_for_write(
        &mut self,
        barrier: &mut PipelineBarrier,
        stage: PipelineStage,
    ) -> &mut Image {
        self.image.bind(barrier, stage, MemoryAccess::Write);
        &mut self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GpuConfig;

    fn ctx() -> GpuContext {
        GpuContext::new(GpuConfig::default())
    }

    #[test]
    fn test_roundtrip_each_layout() {
        let ctx = ctx();
        let host = Tensor::new((0..15).map(|v| v as f32).collect(), Shape::new(vec![3, 5]));
        for layout in [
            MemoryLayout::WidthPacked,
            MemoryLayout::HeightPacked,
            MemoryLayout::ChannelsPacked,
        ] {
            let gpu = GpuTensor::from_host(&ctx, &host, layout).unwrap();
            assert_eq!(gpu.layout(), layout);
            assert_eq!(gpu.extents(), image_extents(&[3, 5], layout));
            let back = gpu.to_host(&ctx).unwrap();
            assert_eq!(back.data_f32().unwrap(), host.data_f32().unwrap());
        }
    }

    #[test]
    fn test_quantized_roundtrip_keeps_params() {
        let ctx = ctx();
        let qp = QuantParams::new(0.25, -3);
        let host =
            Tensor::from_qint8(vec![-128, -1, 0, 5, 127, 9], Shape::new(vec![2, 3]), qp).unwrap();
        let gpu = GpuTensor::from_host(&ctx, &host, MemoryLayout::WidthPacked).unwrap();
        assert!(gpu.is_quantized());
        let back = gpu.to_host(&ctx).unwrap();
        assert_eq!(back.storage(), host.storage());
        assert_eq!(back.quant_params(), Some(qp));
    }

    #[test]
    fn test_width_packed_padding_is_zero() {
        let ctx = ctx();
        let host = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0], Shape::new(vec![1, 5]));
        let gpu = GpuTensor::from_host(&ctx, &host, MemoryLayout::WidthPacked).unwrap();
        assert_eq!(gpu.gpu_numel(), 8);
        assert_eq!(gpu.nbytes(), 32);
        assert_eq!(gpu.image().fetch(1, 0, 0), [5.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let ctx = ctx();
        let r = GpuTensor::new(&ctx, &[0, 3], DType::F32, MemoryLayout::ChannelsPacked);
        assert!(matches!(r, Err(GpuError::InvalidArgument(_))));
    }

    #[test]
    fn test_requires_grad_carried() {
        let ctx = ctx();
        let host = Tensor::zeros(Shape::new(vec![2])).with_requires_grad(true);
        let gpu = GpuTensor::from_host(&ctx, &host, MemoryLayout::ChannelsPacked).unwrap();
        assert!(gpu.requires_grad());
        assert!(gpu.to_host(&ctx).unwrap().requires_grad());
    }
}
