use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tm_tensor::{div_up, DType};

use crate::barrier::{PipelineBarrier, ResourceId};
use crate::config::GpuConfig;
use crate::error::{GpuError, Result};
use crate::image::Image;
use crate::params::UniformParamsBuffer;
use crate::shaders::{Bindings, ShaderRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Transfer,
    Compute,
}

/// One entry of the command stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub label: String,
    pub kind: JobKind,
    pub global: [u32; 3],
    pub local: [u32; 3],
    pub barrier: PipelineBarrier,
}

/// Shared command stream of the emulated device.
///
/// Work executes synchronously at submission, in submission order. Every
/// submission is appended to a log together with the barriers recorded
/// while binding its resources.
#[derive(Debug)]
pub struct GpuContext {
    config: GpuConfig,
    shaders: ShaderRegistry,
    next_resource: AtomicU64,
    submissions: Mutex<Vec<Submission>>,
}

impl GpuContext {
    pub fn new(config: GpuConfig) -> Self {
        GpuContext::with_shaders(config, ShaderRegistry::builtin())
    }

    pub fn with_shaders(config: GpuConfig, shaders: ShaderRegistry) -> Self {
        GpuContext {
            config,
            shaders,
            next_resource: AtomicU64::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &GpuConfig {
        &self.config
    }

    pub fn shaders(&self) -> &ShaderRegistry {
        &self.shaders
    }

    pub(crate) fn allocate_image(&self, extents: [u32; 3], dtype: DType) -> Result<Image> {
        if let Some(&e) = extents.iter().find(|&&e| e > self.config.max_image_dimension) {
            return Err(GpuError::AllocationFailed(format!(
                "image extents {:?}: {} exceeds max image dimension {}",
                extents, e, self.config.max_image_dimension
            )));
        }
        let texels = extents.iter().map(|&e| e as usize).product::<usize>();
        let bytes = texels * 4 * dtype.size_in_bytes();
        if bytes > self.config.max_allocation_bytes {
            return Err(GpuError::AllocationFailed(format!(
                "image of {} bytes exceeds allocation limit of {} bytes",
                bytes, self.config.max_allocation_bytes
            )));
        }
        let id = ResourceId(self.next_resource.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(%id, ?extents, %dtype, "allocate image");
        Ok(Image::zeroed(id, extents, dtype))
    }

    /// Validate and execute one compute dispatch.
    ///
    /// The grid is `global` rounded up to whole `local` workgroups; kernels
    /// discard invocations past their logical bounds.
    ///
    /// # Errors
    /// `ShaderNotFound` for an unregistered shader; `SubmissionFailed` when
    /// bindings do not match the shader or the grid exceeds device limits.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_compute_job(
        &self,
        shader: &str,
        barrier: PipelineBarrier,
        global: [u32; 3],
        local: [u32; 3],
        output: &mut Image,
        inputs: &[&Image],
        params: &UniformParamsBuffer,
    ) -> Result<()> {
        let info = self.shaders.info(shader)?;
        let kernel = self.shaders.kernel(shader)?;
        let fail = |reason: String| GpuError::SubmissionFailed {
            shader: shader.to_string(),
            reason,
        };

        if inputs.len() != info.num_inputs {
            return Err(fail(format!("expected {} inputs, got {}", info.num_inputs, inputs.len())));
        }
        if params.size() != info.params_size {
            return Err(fail(format!(
                "uniform block is {} bytes, shader expects {}",
                params.size(),
                info.params_size
            )));
        }
        if local.contains(&0) || global.contains(&0) {
            return Err(fail(format!("empty dispatch: global {:?}, local {:?}", global, local)));
        }
        let invocations: u64 = local.iter().map(|&l| l as u64).product();
        if invocations > self.config.max_workgroup_invocations as u64 {
            return Err(fail(format!(
                "workgroup of {} invocations exceeds limit {}",
                invocations, self.config.max_workgroup_invocations
            )));
        }
        let groups: [u32; 3] =
            std::array::from_fn(|i| div_up(global[i] as usize, local[i] as usize) as u32);
        if let Some(&g) = groups.iter().find(|&&g| g > self.config.max_workgroup_count) {
            return Err(fail(format!(
                "{} workgroups exceeds limit {}",
                g, self.config.max_workgroup_count
            )));
        }

        tracing::debug!(shader, ?global, ?local, barriers = barrier.images.len(), "dispatch");
        let mut bindings = Bindings {
            output,
            inputs,
            params: params.as_bytes(),
        };
        for z in 0..groups[2] * local[2] {
            for y in 0..groups[1] * local[1] {
                for x in 0..groups[0] * local[0] {
                    kernel(&mut bindings, [x, y, z]);
                }
            }
        }

        self.submissions.lock().push(Submission {
            label: shader.to_string(),
            kind: JobKind::Compute,
            global,
            local,
            barrier,
        });
        Ok(())
    }

    pub(crate) fn record_transfer(&self, label: &str, barrier: PipelineBarrier) {
        tracing::trace!(label, barriers = barrier.images.len(), "transfer");
        self.submissions.lock().push(Submission {
            label: label.to_string(),
            kind: JobKind::Transfer,
            global: [0; 3],
            local: [0; 3],
            barrier,
        });
    }

    /// Snapshot of the command stream so far.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    /// Drain the command stream log.
    pub fn flush(&self) -> Vec<Submission> {
        std::mem::take(&mut *self.submissions.lock())
    }
}

impl Default for GpuContext {
    fn default() -> Self {
        GpuContext::new(GpuConfig::default())
    }
}
