use std::fmt;

use crate::error::{Error, Result};

// Shape - N-dimensional shape representation
//
// A Shape describes the size of each dimension of a tensor:
//   - Scalar: Shape([])          0 dimensions, 1 element
//   - Vector: Shape([5])         1 dimension, 5 elements
//   - Matrix: Shape([3, 4])      2 dimensions, 12 elements
//   - Empty:  Shape([2, 0])      2 dimensions, 0 elements
//
// Buffers are always stored contiguous and row-major, so the shape alone
// determines strides, the mapping between flat offsets and coordinates,
// and whether two tensors can be broadcast together.

/// N-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// Scalar shape (rank 0).
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn into_dims(self) -> Vec<usize> {
        self.0
    }

    /// Number of dimensions (0 for scalar, 1 for vector, 2 for matrix, etc.).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements. A scalar has 1, any zero dim gives 0.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> Result<usize> {
        self.0.get(d).copied().ok_or(Error::DimOutOfRange {
            axis: d as isize,
            rank: self.rank(),
        })
    }

    /// Row-major strides: `stride[i] = product(shape[i+1:])`.
    ///
    /// For shape [2, 3, 4], strides are [12, 4, 1].
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    // Coordinates

    /// Convert a flat row-major offset into per-dimension coordinates.
    pub fn index_to_loc(&self, index: usize, strides: &[usize]) -> Vec<usize> {
        let mut loc = vec![0usize; self.rank()];
        self.index_to_loc_into(index, strides, &mut loc);
        loc
    }

    /// Allocation-free version of [`Shape::index_to_loc`] for hot loops.
    pub fn index_to_loc_into(&self, mut index: usize, strides: &[usize], loc: &mut [usize]) {
        let rank = self.rank();
        if rank == 0 {
            return;
        }
        for i in 0..rank - 1 {
            loc[i] = index / strides[i];
            index -= loc[i] * strides[i];
        }
        loc[rank - 1] = index;
    }

    /// Convert per-dimension coordinates back to a flat row-major offset.
    pub fn loc_to_index(loc: &[usize], strides: &[usize]) -> usize {
        loc.iter().zip(strides).map(|(&l, &s)| l * s).sum()
    }

    // Broadcasting

    /// Compute the broadcast output shape from two input shapes.
    ///
    /// NumPy-style broadcasting rules:
    ///   1. Align shapes from the right (trailing dimensions).
    ///   2. Dimensions are compatible if they are equal or one of them is 1.
    ///   3. Missing leading dimensions are treated as 1.
    ///
    /// Examples:
    ///   [3, 4] and [4]       -> [3, 4]
    ///   [2, 1] and [1, 3]    -> [2, 3]
    ///   [5, 3, 1] and [3, 4] -> [5, 3, 4]
    ///   [3] and [4]          -> Error
    pub fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> Result<Shape> {
        let l = lhs.dims();
        let r = rhs.dims();
        let max_rank = l.len().max(r.len());
        let mut result = Vec::with_capacity(max_rank);

        for i in 0..max_rank {
            let ld = if i < l.len() { l[l.len() - 1 - i] } else { 1 };
            let rd = if i < r.len() { r[r.len() - 1 - i] } else { 1 };

            if ld == rd || rd == 1 {
                result.push(ld);
            } else if ld == 1 {
                result.push(rd);
            } else {
                return Err(Error::BroadcastMismatch {
                    a: lhs.clone(),
                    b: rhs.clone(),
                });
            }
        }

        result.reverse();
        Ok(Shape::new(result))
    }

    /// Dimensions of `self` (indexed in `self`'s own rank) that are broadcast
    /// when `self` is expanded to `out`.
    ///
    /// A dimension of size 1 facing a larger output dimension is broadcast.
    pub fn broadcast_dims(&self, out: &Shape) -> Vec<usize> {
        let in_rank = self.rank();
        let out_rank = out.rank();
        let mut dims = Vec::new();
        for i in 0..in_rank {
            let dim = in_rank - 1 - i;
            let a = self.0[dim];
            let b = if i < out_rank { out.0[out_rank - 1 - i] } else { 1 };
            if b > 1 && a == 1 {
                dims.push(dim);
            }
        }
        dims.reverse();
        dims
    }

    /// Shape after inserting a size-1 dimension at `axis`.
    pub fn expand_dims(&self, axis: usize) -> Shape {
        let mut dims = self.0.clone();
        dims.insert(axis.min(dims.len()), 1);
        Shape(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(a: [usize; N]) -> Self {
        Shape(a.to_vec())
    }
}
