use std::fmt;
use std::str::FromStr;

use tm_gpu::{GpuContext, GpuTensor};

use crate::error::{LinearError, Result};
use crate::operand::Operand;
use crate::ops;

/// Operator names exposed by the packed matmul path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatmulOp {
    Mm,
    Addmm,
    Bmm,
    Baddbmm,
}

/// Operands for [`MatmulOp::invoke`]. `bias`, `alpha` and `beta` are
/// ignored by the operators that take no bias.
#[derive(Debug)]
pub struct MatmulArgs {
    pub input: Operand,
    pub weight: Operand,
    pub bias: Option<Operand>,
    pub alpha: f32,
    pub beta: f32,
}

impl MatmulArgs {
    pub fn new(input: impl Into<Operand>, weight: impl Into<Operand>) -> Self {
        MatmulArgs {
            input: input.into(),
            weight: weight.into(),
            bias: None,
            alpha: 1.0,
            beta: 1.0,
        }
    }

    pub fn with_bias(mut self, bias: impl Into<Operand>, beta: f32, alpha: f32) -> Self {
        self.bias = Some(bias.into());
        self.beta = beta;
        self.alpha = alpha;
        self
    }
}

impl MatmulOp {
    pub const ALL: [MatmulOp; 4] = [
        MatmulOp::Mm,
        MatmulOp::Addmm,
        MatmulOp::Bmm,
        MatmulOp::Baddbmm,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MatmulOp::Mm => "aten::mm",
            MatmulOp::Addmm => "aten::addmm",
            MatmulOp::Bmm => "aten::bmm",
            MatmulOp::Baddbmm => "aten::baddbmm",
        }
    }

    pub fn is_batched(self) -> bool {
        matches!(self, MatmulOp::Bmm | MatmulOp::Baddbmm)
    }

    pub fn takes_bias(self) -> bool {
        matches!(self, MatmulOp::Addmm | MatmulOp::Baddbmm)
    }

    pub fn invoke(self, ctx: &GpuContext, args: MatmulArgs) -> Result<GpuTensor> {
        let MatmulArgs {
            input,
            weight,
            bias,
            alpha,
            beta,
        } = args;
        match (self, bias) {
            (MatmulOp::Mm, _) => ops::mm(ctx, input, weight),
            (MatmulOp::Bmm, _) => ops::bmm(ctx, input, weight),
            (MatmulOp::Addmm, Some(b)) => ops::addmm(ctx, b, input, weight, beta, alpha),
            (MatmulOp::Baddbmm, Some(b)) => ops::baddbmm(ctx, b, input, weight, beta, alpha),
            (op, None) => Err(LinearError::InvalidArgument(format!("{} requires a bias", op))),
        }
    }
}

impl fmt::Display for MatmulOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatmulOp {
    type Err = LinearError;

    fn from_str(s: &str) -> Result<Self> {
        MatmulOp::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| LinearError::InvalidArgument(format!("unknown matmul operator '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_tensor::{Shape, Tensor};

    #[test]
    fn test_parse_names() {
        for op in MatmulOp::ALL {
            assert_eq!(op.name().parse::<MatmulOp>().unwrap(), op);
            assert_eq!(op.to_string(), op.name());
        }
        assert!("aten::conv2d".parse::<MatmulOp>().is_err());
        assert!("mm".parse::<MatmulOp>().is_err());
    }

    #[test]
    fn test_invoke_requires_bias() {
        let ctx = GpuContext::default();
        let args = MatmulArgs::new(
            Tensor::zeros(Shape::new(vec![2, 2])),
            Tensor::zeros(Shape::new(vec![2, 2])),
        );
        assert!(matches!(
            MatmulOp::Addmm.invoke(&ctx, args),
            Err(LinearError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invoke_mm() {
        let ctx = GpuContext::default();
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2]));
        let eye = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], Shape::new(vec![2, 2]));
        let out = MatmulOp::Mm.invoke(&ctx, MatmulArgs::new(a, eye)).unwrap();
        assert_eq!(out.to_host(&ctx).unwrap().data_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
