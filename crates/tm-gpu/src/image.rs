use parking_lot::Mutex;
use tm_tensor::{CpuStorage, DType};

use crate::barrier::{AccessState, MemoryAccess, PipelineBarrier, PipelineStage, ResourceId};

/// A 3-D image of RGBA texels.
///
/// Components are stored in the element kind of the owning tensor; integer
/// images hold raw quantized values. Freshly allocated images are zeroed.
#[derive(Debug)]
pub struct Image {
    id: ResourceId,
    extents: [u32; 3],
    texels: CpuStorage,
    last_access: Mutex<Option<AccessState>>,
}

impl Image {
    pub(crate) fn zeroed(id: ResourceId, extents: [u32; 3], dtype: DType) -> Self {
        let n = extents.iter().map(|&e| e as usize).product::<usize>() * 4;
        Image {
            id,
            extents,
            texels: CpuStorage::zeros(dtype, n),
            last_access: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn extents(&self) -> [u32; 3] {
        self.extents
    }

    /// Raw component storage, texel-major with four components per texel.
    pub fn texels(&self) -> &CpuStorage {
        &self.texels
    }

    pub fn last_access(&self) -> Option<AccessState> {
        *self.last_access.lock()
    }

    fn offset(&self, pos: [i64; 3]) -> Option<usize> {
        let [ex, ey, ez] = self.extents.map(|e| e as i64);
        let [x, y, z] = pos;
        if x < 0 || y < 0 || z < 0 || x >= ex || y >= ey || z >= ez {
            return None;
        }
        Some((((z * ey + y) * ex + x) * 4) as usize)
    }

    /// Read a texel. Out-of-bounds reads return zero.
    pub fn fetch(&self, x: i64, y: i64, z: i64) -> [f32; 4] {
        match self.offset([x, y, z]) {
            Some(o) => std::array::from_fn(|c| self.texels.get_f32(o + c)),
            None => [0.0; 4],
        }
    }

    /// Write a texel. Out-of-bounds writes are discarded.
    pub fn store(&mut self, x: i64, y: i64, z: i64, value: [f32; 4]) {
        if let Some(o) = self.offset([x, y, z]) {
            for (c, v) in value.into_iter().enumerate() {
                self.texels.set_f32(o + c, v);
            }
        }
    }

    pub fn component(&self, pos: [u32; 3], comp: usize) -> f32 {
        self.fetch(pos[0] as i64, pos[1] as i64, pos[2] as i64)[comp]
    }

    pub fn set_component(&mut self, pos: [u32; 3], comp: usize, value: f32) {
        if let Some(o) = self.offset(pos.map(|p| p as i64)) {
            self.texels.set_f32(o + comp, value);
        }
    }

    pub(crate) fn bind(
        &self,
        barrier: &mut PipelineBarrier,
        stage: PipelineStage,
        access: MemoryAccess,
    ) {
        let mut last = self.last_access.lock();
        *last = Some(barrier.track(self.id, *last, stage, access));
    }
}
