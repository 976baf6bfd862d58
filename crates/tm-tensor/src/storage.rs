use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// Contiguous element storage, used both for host tensors and for the
/// component arrays of emulated device images.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    /// 32-bit floating point storage.
    F32(Vec<f32>),
    /// Signed 8-bit integer storage.
    I8(Vec<i8>),
    /// Unsigned 8-bit integer storage.
    U8(Vec<u8>),
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::I8(v) => v.len(),
            CpuStorage::U8(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the data as an f32 slice.
    ///
    /// # Errors
    /// Returns an error if the storage is not F32.
    pub fn as_f32_slice(&self) -> Result<&[f32]> {
        match self {
            CpuStorage::F32(v) => Ok(v.as_slice()),
            _ => Err(TensorError::Other(format!(
                "storage holds {} elements, not f32",
                self.element_name()
            ))),
        }
    }

    /// Create zero-filled storage able to hold `n` elements of `dtype`.
    ///
    /// Quantized dtypes are stored as their raw integers.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::QInt8 => CpuStorage::I8(vec![0; n]),
            DType::QUInt8 => CpuStorage::U8(vec![0; n]),
        }
    }

    /// True when this storage is the representation used for `dtype`.
    pub fn holds(&self, dtype: DType) -> bool {
        matches!(
            (self, dtype),
            (CpuStorage::F32(_), DType::F32)
                | (CpuStorage::I8(_), DType::QInt8)
                | (CpuStorage::U8(_), DType::QUInt8)
        )
    }

    /// Create storage from an f32 vector.
    pub fn from_f32_vec(data: Vec<f32>) -> Self {
        CpuStorage::F32(data)
    }

    /// Read element `i` widened to f32.
    ///
    /// Integer storage yields the raw integer value, which f32 represents
    /// exactly for 8-bit types.
    pub fn get_f32(&self, i: usize) -> f32 {
        match self {
            CpuStorage::F32(v) => v[i],
            CpuStorage::I8(v) => v[i] as f32,
            CpuStorage::U8(v) => v[i] as f32,
        }
    }

    /// Write element `i` from an f32 value.
    ///
    /// Integer storage saturates to its range after rounding to nearest.
    pub fn set_f32(&mut self, i: usize, value: f32) {
        match self {
            CpuStorage::F32(v) => v[i] = value,
            CpuStorage::I8(v) => v[i] = value.round().clamp(i8::MIN as f32, i8::MAX as f32) as i8,
            CpuStorage::U8(v) => v[i] = value.round().clamp(u8::MIN as f32, u8::MAX as f32) as u8,
        }
    }

    /// Copy element `src_i` of `src` into element `dst_i` of `self` without
    /// any value conversion.
    ///
    /// # Errors
    /// Returns an error if the two storages hold different element kinds.
    pub fn copy_element(&mut self, dst_i: usize, src: &CpuStorage, src_i: usize) -> Result<()> {
        match (self, src) {
            (CpuStorage::F32(d), CpuStorage::F32(s)) => d[dst_i] = s[src_i],
            (CpuStorage::I8(d), CpuStorage::I8(s)) => d[dst_i] = s[src_i],
            (CpuStorage::U8(d), CpuStorage::U8(s)) => d[dst_i] = s[src_i],
            (dst, src) => {
                return Err(TensorError::Other(format!(
                    "cannot copy {} element into {} storage",
                    src.element_name(),
                    dst.element_name()
                )))
            }
        }
        Ok(())
    }

    fn element_name(&self) -> &'static str {
        match self {
            CpuStorage::F32(_) => "f32",
            CpuStorage::I8(_) => "i8",
            CpuStorage::U8(_) => "u8",
        }
    }
}
