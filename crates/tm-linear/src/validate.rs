//! Availability and usability predicates.
//!
//! `check_*` return the first failed condition so callers can report it;
//! the boolean forms are what the context and dispatcher gate on.

use tm_gpu::GpuTensor;
use tm_tensor::{DType, Shape};

use crate::operand::{Operand, Residency};

type Check = std::result::Result<(), String>;

fn ensure(cond: bool, reason: impl FnOnce() -> String) -> Check {
    if cond {
        Ok(())
    } else {
        Err(reason())
    }
}

/// Host operands are uploaded at construction and device operands are used
/// in place, so both residencies are accepted.
fn resident(op: &Operand) -> bool {
    match op.residency() {
        Residency::Host | Residency::Device => true,
    }
}

/// Can the packed path represent this (weight, bias) pair?
pub fn available(weight: &Operand, bias: Option<&Operand>, batched: bool) -> bool {
    check_available(weight, bias, batched).is_ok()
}

pub fn check_available(weight: &Operand, bias: Option<&Operand>, batched: bool) -> Check {
    let w = weight.sizes();
    let rank = if batched { 3 } else { 2 };
    ensure(w.len() == rank, || format!("weight must be rank {}, got {:?}", rank, w))?;
    ensure(Shape::from_slice(w).all_positive(), || {
        format!("weight has an empty dimension: {:?}", w)
    })?;
    ensure(resident(weight), || "weight is not host or device resident".to_string())?;
    ensure(!weight.requires_grad(), || "weight requires grad".to_string())?;
    if batched {
        ensure(weight.dtype() == DType::F32, || {
            format!("batched weight must be f32, got {}", weight.dtype())
        })?;
    } else {
        let qint8 = weight.dtype() == DType::QInt8 && weight.is_quantized();
        ensure(weight.dtype() == DType::F32 || qint8, || {
            format!("weight must be f32 or qint8, got {}", weight.dtype())
        })?;
    }

    let Some(bias) = bias else {
        return Ok(());
    };
    let b = bias.sizes();
    ensure(bias.dtype() == DType::F32, || format!("bias must be f32, got {}", bias.dtype()))?;
    ensure(resident(bias), || "bias is not host or device resident".to_string())?;
    ensure(!bias.requires_grad(), || "bias requires grad".to_string())?;
    if batched {
        // batch and width must match or broadcast; height is not checked
        let fits = |got: usize, want: usize| got == want || got == 1;
        let ok = match *b {
            [kb, _, kw] => fits(kb, w[0]) && fits(kw, w[2]),
            [_, kw] | [kw] => fits(kw, w[2]),
            [] => true,
            _ => false,
        };
        ensure(ok, || format!("bias {:?} does not broadcast against weight {:?}", b, w))
    } else {
        ensure(!b.is_empty(), || "non-batched bias must have rank >= 1".to_string())?;
        ensure(b.len() == 1 || b[b.len() - 1] == w[1], || {
            format!("bias {:?} trailing dim does not match weight {:?}", b, w)
        })
    }
}

/// Can `input` be multiplied by a context built from a weight of
/// `weight_sizes`? Inputs are checked after staging, so they are always
/// device-resident here.
pub fn usable(input: &GpuTensor, weight_sizes: &[usize], batched: bool) -> bool {
    check_usable(input, weight_sizes, batched).is_ok()
}

pub fn check_usable(input: &GpuTensor, weight_sizes: &[usize], batched: bool) -> Check {
    let s = input.sizes();
    ensure(!input.requires_grad(), || "input requires grad".to_string())?;
    if batched {
        ensure(s.len() == 3, || format!("batched input must be rank 3, got {:?}", s))?;
        ensure(input.dtype() == DType::F32, || {
            format!("batched input must be f32, got {}", input.dtype())
        })?;
        ensure(s[2] == weight_sizes[1], || {
            format!("input {:?} inner dim does not match weight {:?}", s, weight_sizes)
        })?;
        ensure(s[0] == weight_sizes[0], || {
            format!("input {:?} batch does not match weight {:?}", s, weight_sizes)
        })
    } else {
        ensure(s.len() == 2, || format!("input must be rank 2, got {:?}", s))?;
        ensure(input.dtype() == DType::F32 || input.is_quantized(), || {
            format!("input must be f32 or quantized, got {}", input.dtype())
        })?;
        ensure(s[1] == weight_sizes[0], || {
            format!("input {:?} inner dim does not match weight {:?}", s, weight_sizes)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_gpu::{GpuContext, MemoryLayout};
    use tm_tensor::{QuantParams, Tensor};

    fn f32_op(sizes: &[usize]) -> Operand {
        let n = sizes.iter().product();
        Operand::Host(Tensor::new(vec![0.5; n], Shape::from_slice(sizes)))
    }

    #[test]
    fn test_available_non_batched() {
        let w = f32_op(&[4, 6]);
        assert!(available(&w, None, false));
        assert!(available(&w, Some(&f32_op(&[6])), false));
        assert!(available(&w, Some(&f32_op(&[3, 6])), false));
        assert!(!available(&w, Some(&f32_op(&[3, 5])), false));
        assert!(!available(&w, Some(&f32_op(&[])), false));
        assert!(!available(&f32_op(&[2, 4, 6]), None, false));
        assert!(!available(&f32_op(&[0, 6]), None, false));

        let qp = QuantParams::new(0.1, 0);
        let q = Operand::Host(Tensor::from_qint8(vec![0; 24], Shape::new(vec![4, 6]), qp).unwrap());
        assert!(available(&q, Some(&f32_op(&[6])), false));
        let qu =
            Operand::Host(Tensor::from_quint8(vec![0; 24], Shape::new(vec![4, 6]), qp).unwrap());
        assert!(!available(&qu, None, false));

        let grad_w = Tensor::new(vec![0.0; 24], Shape::new(vec![4, 6])).with_requires_grad(true);
        let grad = Operand::Host(grad_w);
        assert!(!available(&grad, None, false));
        let grad_b = Tensor::new(vec![0.0; 6], Shape::new(vec![6])).with_requires_grad(true);
        let grad_bias = Operand::Host(grad_b);
        assert!(!available(&w, Some(&grad_bias), false));
    }

    #[test]
    fn test_available_for_either_residency() {
        let ctx = GpuContext::default();
        let host_w = f32_op(&[4, 6]);
        let dev_w = Operand::Device(
            GpuTensor::new(&ctx, &[4, 6], DType::F32, MemoryLayout::ChannelsPacked).unwrap(),
        );
        let dev_b = Operand::Device(
            GpuTensor::new(&ctx, &[6], DType::F32, MemoryLayout::WidthPacked).unwrap(),
        );
        assert_eq!(host_w.residency(), Residency::Host);
        assert_eq!(dev_w.residency(), Residency::Device);
        assert!(available(&host_w, Some(&dev_b), false));
        assert!(available(&dev_w, Some(&f32_op(&[6])), false));
        assert!(available(&dev_w, Some(&dev_b), false));
    }

    #[test]
    fn test_available_batched() {
        let w = f32_op(&[2, 4, 6]);
        assert!(available(&w, None, true));
        assert!(available(&w, Some(&f32_op(&[])), true));
        assert!(available(&w, Some(&f32_op(&[6])), true));
        assert!(available(&w, Some(&f32_op(&[1])), true));
        assert!(available(&w, Some(&f32_op(&[3, 6])), true));
        assert!(available(&w, Some(&f32_op(&[2, 3, 6])), true));
        assert!(available(&w, Some(&f32_op(&[1, 9, 1])), true), "height is unchecked");
        assert!(!available(&w, Some(&f32_op(&[3, 3, 6])), true));
        assert!(!available(&w, Some(&f32_op(&[5])), true));
        assert!(!available(&w, Some(&f32_op(&[1, 1, 1, 6])), true));
        assert!(!available(&f32_op(&[4, 6]), None, true));
    }

    #[test]
    fn test_usable() {
        let ctx = GpuContext::default();
        let input = |sizes: &[usize]| {
            let n = sizes.iter().product();
            let host = Tensor::new(vec![1.0; n], Shape::from_slice(sizes));
            GpuTensor::from_host(&ctx, &host, MemoryLayout::WidthPacked).unwrap()
        };
        assert!(usable(&input(&[3, 4]), &[4, 6], false));
        assert!(!usable(&input(&[3, 5]), &[4, 6], false));
        assert!(!usable(&input(&[2, 3, 4]), &[4, 6], false));
        assert!(usable(&input(&[2, 3, 4]), &[2, 4, 6], true));
        assert!(!usable(&input(&[1, 3, 4]), &[2, 4, 6], true));
        assert!(!usable(&input(&[3, 4]), &[2, 4, 6], true));
        let grad = input(&[3, 4]).with_requires_grad(true);
        assert!(!usable(&grad, &[4, 6], false));
        assert!(check_usable(&input(&[3, 5]), &[4, 6], false).unwrap_err().contains("inner dim"));
    }
}
