use crate::error::{Result, TensorError};
use std::fmt;

/// Integer division rounding up.
pub fn div_up(n: usize, d: usize) -> usize {
    n.div_ceil(d)
}

/// A tensor shape, wrapping a vector of dimension sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a new shape from a vector of dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    /// Create a shape from a slice of dimensions.
    pub fn from_slice(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements (product of all dimension sizes).
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the size of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndim()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    /// Size of the innermost dimension, or `None` for a scalar shape.
    pub fn last(&self) -> Option<usize> {
        self.dims.last().copied()
    }

    /// Returns a reference to the underlying dimension sizes.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// True when every dimension is non-zero.
    pub fn all_positive(&self) -> bool {
        self.dims.iter().all(|&d| d > 0)
    }

    /// Computes row-major contiguous strides for this shape.
    ///
    /// For a shape [d0, d1, d2], the strides are [d1*d2, d2, 1].
    pub fn strides(&self) -> Vec<usize> {
        if self.dims.is_empty() {
            return vec![];
        }
        let mut strides = vec![0usize; self.dims.len()];
        strides[self.dims.len() - 1] = 1;
        for i in (0..self.dims.len() - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Collapse every leading dimension into one, keeping the innermost.
    ///
    /// `[a, b, c, k]` becomes `[a*b*c, k]`.
    ///
    /// # Errors
    /// Returns an error for shapes of rank below 2.
    pub fn flatten_to_2d(&self) -> Result<Shape> {
        if self.ndim() < 2 {
            return Err(TensorError::Other(format!(
                "cannot flatten rank-{} shape {} to 2D",
                self.ndim(),
                self
            )));
        }
        let inner = self.dims[self.ndim() - 1];
        let outer = self.dims[..self.ndim() - 1].iter().product();
        Ok(Shape::new(vec![outer, inner]))
    }

    /// Replace the innermost dimension, keeping all leading dimensions.
    pub fn with_last(&self, last: usize) -> Shape {
        let mut dims = self.dims.clone();
        match dims.last_mut() {
            Some(d) => *d = last,
            None => dims.push(last),
        }
        Shape::new(dims)
    }

    /// Compute the broadcast shape of `a` and `b` using numpy-style broadcasting rules.
    ///
    /// Rules:
    /// 1. If the shapes have different numbers of dimensions, the shorter shape is
    ///    padded with ones on the left.
    /// 2. For each dimension, sizes must either be equal, or one of them must be 1.
    ///    The output dimension is the maximum of the two.
    pub fn broadcast_shape(a: &Shape, b: &Shape) -> Result<Shape> {
        let max_ndim = a.ndim().max(b.ndim());
        let mut result = Vec::with_capacity(max_ndim);

        for i in 0..max_ndim {
            let da = if i < a.ndim() { a.dims[a.ndim() - 1 - i] } else { 1 };
            let db = if i < b.ndim() { b.dims[b.ndim() - 1 - i] } else { 1 };

            if da == db || db == 1 {
                result.push(da);
            } else if da == 1 {
                result.push(db);
            } else {
                return Err(TensorError::BroadcastError {
                    a: a.dims.clone(),
                    b: b.dims.clone(),
                });
            }
        }

        result.reverse();
        Ok(Shape::new(result))
    }

    /// Map a row-major index of `target` to the row-major index of the
    /// element of `self` that broadcasts onto it.
    ///
    /// `self` must be broadcast-compatible with `target`.
    pub fn broadcast_index(&self, target: &Shape, index: usize) -> usize {
        let offset = target.ndim() - self.ndim();
        let src_strides = self.strides();
        let mut rem = index;
        let mut src = 0;
        for (axis, tstride) in target.strides().iter().enumerate() {
            let coord = rem / tstride;
            rem %= tstride;
            if axis >= offset {
                let sa = axis - offset;
                if self.dims[sa] != 1 {
                    src += coord * src_strides[sa];
                }
            }
        }
        src
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_shape() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.ndim(), 3);
        assert_eq!(s.numel(), 24);
        assert_eq!(s.last(), Some(4));
        assert!(s.all_positive());
        assert!(!Shape::new(vec![2, 0]).all_positive());
    }

    #[test]
    fn test_strides() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.strides(), vec![12, 4, 1]);
        assert_eq!(Shape::new(vec![]).strides(), Vec::<usize>::new());
    }

    #[test]
    fn test_flatten_to_2d() {
        let s = Shape::new(vec![2, 3, 5, 4]);
        assert_eq!(s.flatten_to_2d().unwrap().dims(), &[30, 4]);
        assert_eq!(Shape::new(vec![3, 4]).flatten_to_2d().unwrap().dims(), &[3, 4]);
        assert!(Shape::new(vec![4]).flatten_to_2d().is_err());
    }

    #[test]
    fn test_with_last() {
        assert_eq!(Shape::new(vec![2, 3, 4]).with_last(7).dims(), &[2, 3, 7]);
    }

    #[test]
    fn test_div_up() {
        assert_eq!(div_up(5, 2), 3);
        assert_eq!(div_up(4, 2), 2);
        assert_eq!(div_up(1, 4), 1);
    }

    #[test]
    fn test_broadcast_expand() {
        let a = Shape::new(vec![2, 1]);
        let b = Shape::new(vec![1, 3]);
        let c = Shape::broadcast_shape(&a, &b).unwrap();
        assert_eq!(c.dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_different_ndim() {
        let a = Shape::new(vec![3]);
        let b = Shape::new(vec![2, 3]);
        let c = Shape::broadcast_shape(&a, &b).unwrap();
        assert_eq!(c.dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_error() {
        let a = Shape::new(vec![2, 3]);
        let b = Shape::new(vec![2, 4]);
        assert!(Shape::broadcast_shape(&a, &b).is_err());
    }

    #[test]
    fn test_broadcast_index() {
        let target = Shape::new(vec![2, 3]);
        let row = Shape::new(vec![3]);
        let col = Shape::new(vec![2, 1]);
        let scalar = Shape::new(vec![]);
        // element (1, 2) of the target
        assert_eq!(row.broadcast_index(&target, 5), 2);
        assert_eq!(col.broadcast_index(&target, 5), 1);
        assert_eq!(scalar.broadcast_index(&target, 5), 0);
    }
}
