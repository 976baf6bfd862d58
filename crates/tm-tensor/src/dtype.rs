use std::fmt;

/// Element kinds a tensor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// Signed 8-bit integers with per-tensor affine quantization.
    QInt8,
    /// Unsigned 8-bit integers with per-tensor affine quantization.
    QUInt8,
}

impl DType {
    /// Size in bytes of one element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::QInt8 | DType::QUInt8 => 1,
        }
    }

    /// Returns true if this dtype is an affine-quantized integer format.
    pub fn is_quantized(&self) -> bool {
        matches!(self, DType::QInt8 | DType::QUInt8)
    }

    /// Inclusive integer range representable by a quantized dtype.
    ///
    /// Returns `None` for floating point types.
    pub fn quant_range(&self) -> Option<(i32, i32)> {
        match self {
            DType::F32 => None,
            DType::QInt8 => Some((i8::MIN as i32, i8::MAX as i32)),
            DType::QUInt8 => Some((u8::MIN as i32, u8::MAX as i32)),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::QInt8 => write!(f, "qint8"),
            DType::QUInt8 => write!(f, "quint8"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_bytes() {
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::QInt8.size_in_bytes(), 1);
        assert_eq!(DType::QUInt8.size_in_bytes(), 1);
    }

    #[test]
    fn test_quant_range() {
        assert_eq!(DType::F32.quant_range(), None);
        assert_eq!(DType::QInt8.quant_range(), Some((-128, 127)));
        assert_eq!(DType::QUInt8.quant_range(), Some((0, 255)));
    }

    #[test]
    fn test_display() {
        assert_eq!(DType::QUInt8.to_string(), "quint8");
        assert!(!DType::F32.is_quantized());
        assert!(DType::QInt8.is_quantized());
    }
}
