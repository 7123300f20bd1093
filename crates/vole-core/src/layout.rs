use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout - a strided view over a contiguous buffer
//
// Handles always own contiguous row-major buffers. A Layout describes how
// to *read* such a buffer as some other logical shape without moving data:
//
//   - permute:      reorder shape and strides (transpose)
//   - broadcast_as: stride 0 on every broadcast dimension
//   - narrow:       shift the offset and shrink one dimension (slice)
//
// Kernels that need a physical copy walk the view with `strided_indices`
// and gather elements into a fresh buffer.

/// Shape + strides + offset describing a view into flat storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    offset: usize,
}

impl Layout {
    /// Contiguous row-major layout for the given shape.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.stride_contiguous();
        Layout {
            shape,
            strides,
            offset: 0,
        }
    }

    pub fn new(shape: Shape, strides: Vec<usize>, offset: usize) -> Self {
        Layout {
            shape,
            strides,
            offset,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// A layout is contiguous if its strides equal the row-major strides for
    /// its shape and the offset is 0.
    pub fn is_contiguous(&self) -> bool {
        self.offset == 0 && self.strides == self.shape.stride_contiguous()
    }

    /// Reorder dimensions: output dim `i` reads input dim `perm[i]`.
    ///
    /// Example: [2, 3, 4] with perm [2, 0, 1] -> [4, 2, 3],
    ///          strides [12, 4, 1]          -> [1, 12, 4]
    pub fn permute(&self, perm: &[usize]) -> Result<Layout> {
        let rank = self.rank();
        if perm.len() != rank {
            return Err(Error::msg(format!(
                "permutation {:?} does not match rank {}",
                perm, rank
            )));
        }
        let mut seen = vec![false; rank];
        for &p in perm {
            if p >= rank || seen[p] {
                return Err(Error::msg(format!("invalid permutation {:?}", perm)));
            }
            seen[p] = true;
        }
        let dims = perm.iter().map(|&p| self.dims()[p]).collect();
        let strides = perm.iter().map(|&p| self.strides[p]).collect();
        Ok(Layout::new(Shape::new(dims), strides, self.offset))
    }

    /// View this layout as the (larger) broadcast shape `target`.
    ///
    /// Missing leading dims and size-1 dims facing a larger target dim get
    /// stride 0, so the same element is read repeatedly.
    pub fn broadcast_as(&self, target: &Shape) -> Result<Layout> {
        let src = self.dims();
        let dst = target.dims();
        if dst.len() < src.len() {
            return Err(Error::BroadcastMismatch {
                a: self.shape.clone(),
                b: target.clone(),
            });
        }
        let lead = dst.len() - src.len();
        let mut strides = vec![0usize; dst.len()];
        for (i, &d) in src.iter().enumerate() {
            if d == dst[lead + i] {
                strides[lead + i] = self.strides[i];
            } else if d != 1 {
                return Err(Error::BroadcastMismatch {
                    a: self.shape.clone(),
                    b: target.clone(),
                });
            }
        }
        Ok(Layout::new(target.clone(), strides, self.offset))
    }

    /// Narrow (slice) along a dimension.
    ///
    /// Example: shape [4, 6], narrow(dim=1, start=2, len=3)
    /// -> shape [4, 3], offset += 2 * stride[1]
    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Layout> {
        let rank = self.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange {
                axis: dim as isize,
                rank,
            });
        }
        let dim_size = self.shape.dims()[dim];
        if start + len > dim_size {
            return Err(Error::msg(format!(
                "narrow out of bounds: dim {}, start {}, len {}, dim_size {}",
                dim, start, len, dim_size
            )));
        }
        let mut new_dims = self.shape.dims().to_vec();
        new_dims[dim] = len;
        let new_offset = self.offset + start * self.strides[dim];
        Ok(Layout::new(
            Shape::new(new_dims),
            self.strides.clone(),
            new_offset,
        ))
    }

    /// flat_index = offset + sum(index[i] * stride[i])
    pub fn flat_index(&self, index: &[usize]) -> usize {
        let mut flat = self.offset;
        for (i, &idx) in index.iter().enumerate() {
            flat += idx * self.strides[i];
        }
        flat
    }

    /// Iterator over the storage offsets of this view, in logical order.
    pub fn strided_indices(&self) -> StridedIter {
        StridedIter::new(self)
    }
}

// StridedIter
//
// Walks the logical elements in row-major order and produces the storage
// offset of each. For a contiguous layout this counts 0, 1, 2, ...; for a
// permuted or broadcast layout it jumps around following the strides.

/// Iterator yielding storage offsets for each element of a Layout.
pub struct StridedIter {
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    /// Storage offset of `current`, maintained incrementally.
    position: usize,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    fn new(layout: &Layout) -> Self {
        let rank = layout.rank();
        StridedIter {
            current: vec![0; rank],
            dims: layout.dims().to_vec(),
            strides: layout.strides().to_vec(),
            position: layout.offset(),
            remaining: layout.elem_count(),
            started: false,
        }
    }

    /// Advance the multi-dimensional index by one (rightmost dimension first).
    fn advance(&mut self) {
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            self.position += self.strides[i];
            if self.current[i] < self.dims[i] {
                return;
            }
            self.position -= self.current[i] * self.strides[i];
            self.current[i] = 0;
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        Some(self.position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_indices() {
        let layout = Layout::contiguous(Shape::from((2, 3)));
        assert!(layout.is_contiguous());
        let indices: Vec<usize> = layout.strided_indices().collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_permute_indices() {
        // [[0, 1, 2], [3, 4, 5]] read transposed -> 0, 3, 1, 4, 2, 5
        let layout = Layout::contiguous(Shape::from((2, 3)));
        let t = layout.permute(&[1, 0]).unwrap();
        assert_eq!(t.dims(), &[3, 2]);
        assert_eq!(t.strides(), &[1, 3]);
        assert!(!t.is_contiguous());
        let indices: Vec<usize> = t.strided_indices().collect();
        assert_eq!(indices, vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_invalid_permutation() {
        let layout = Layout::contiguous(Shape::from((2, 3)));
        assert!(layout.permute(&[0, 0]).is_err());
        assert!(layout.permute(&[0]).is_err());
    }

    #[test]
    fn test_broadcast_indices() {
        // [3] broadcast to [2, 3] repeats the row
        let layout = Layout::contiguous(Shape::from(3));
        let b = layout.broadcast_as(&Shape::from((2, 3))).unwrap();
        let indices: Vec<usize> = b.strided_indices().collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2]);

        // [2, 1] broadcast to [2, 3] repeats each element
        let layout = Layout::contiguous(Shape::from((2, 1)));
        let b = layout.broadcast_as(&Shape::from((2, 3))).unwrap();
        let indices: Vec<usize> = b.strided_indices().collect();
        assert_eq!(indices, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_narrow() {
        let layout = Layout::contiguous(Shape::from((4, 6)));
        let narrowed = layout.narrow(1, 2, 3).unwrap();
        assert_eq!(narrowed.dims(), &[4, 3]);
        assert_eq!(narrowed.offset(), 2);
        let first_row: Vec<usize> = narrowed.strided_indices().take(3).collect();
        assert_eq!(first_row, vec![2, 3, 4]);
        assert!(layout.narrow(1, 5, 3).is_err());
    }

    #[test]
    fn test_empty_layout_yields_nothing() {
        let layout = Layout::contiguous(Shape::from((2, 0)));
        assert_eq!(layout.strided_indices().count(), 0);
    }
}
