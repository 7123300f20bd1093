//! Axis bookkeeping for reductions and transposes.
//!
//! Reduction kernels only ever collapse the trailing (fastest-varying)
//! dimensions, where each output element maps to one contiguous window.
//! When the requested axes are elsewhere the caller transposes them to the
//! end first using [`axes_permutation`], reduces, and if needed undoes the
//! permutation with [`undo_axes_permutation`].

use crate::error::{Error, Result};

/// Resolve possibly-negative axes against `rank`. An empty list means all.
pub fn parse_axes(axes: &[isize], rank: usize) -> Result<Vec<usize>> {
    if axes.is_empty() {
        return Ok((0..rank).collect());
    }
    let mut out = Vec::with_capacity(axes.len());
    for &a in axes {
        let axis = parse_axis(a, rank)?;
        if !out.contains(&axis) {
            out.push(axis);
        }
    }
    out.sort_unstable();
    Ok(out)
}

/// Resolve a single axis; `-1` is the last dimension. A scalar has no axes.
pub fn parse_axis(axis: isize, rank: usize) -> Result<usize> {
    let r = rank as isize;
    let resolved = if axis < 0 { axis + r } else { axis };
    if resolved < 0 || resolved >= r {
        return Err(Error::DimOutOfRange { axis, rank });
    }
    Ok(resolved as usize)
}

/// True when `axes` (sorted) are exactly the last `axes.len()` dims.
pub fn axes_are_inner_most(axes: &[usize], rank: usize) -> bool {
    if axes.len() > rank {
        return false;
    }
    axes.iter()
        .enumerate()
        .all(|(i, &a)| a == rank - axes.len() + i)
}

/// Permutation that moves `axes` to the end, or `None` if they already are.
pub fn axes_permutation(axes: &[usize], rank: usize) -> Option<Vec<usize>> {
    if axes_are_inner_most(axes, rank) {
        return None;
    }
    let mut perm: Vec<usize> = (0..rank).filter(|d| !axes.contains(d)).collect();
    perm.extend_from_slice(axes);
    Some(perm)
}

/// The last `num_axes` dimensions of a rank-`rank` tensor.
pub fn inner_most_axes(num_axes: usize, rank: usize) -> Vec<usize> {
    (rank - num_axes..rank).collect()
}

/// Inverse of a permutation.
pub fn undo_axes_permutation(perm: &[usize]) -> Vec<usize> {
    let mut undo = vec![0usize; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        undo[p] = i;
    }
    undo
}

/// Split `dims` into the kept (outer) shape and the reduced shape.
pub fn out_and_reduce_shapes(dims: &[usize], axes: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let out = dims
        .iter()
        .enumerate()
        .filter(|(i, _)| !axes.contains(i))
        .map(|(_, &d)| d)
        .collect();
    let reduce = axes.iter().map(|&a| dims[a]).collect();
    (out, reduce)
}

/// Re-insert size-1 dims at the reduced axes (`keep_dims = true`).
pub fn expand_shape_to_keep_dim(out_dims: &[usize], axes: &[usize]) -> Vec<usize> {
    let rank = out_dims.len() + axes.len();
    let mut result = Vec::with_capacity(rank);
    let mut j = 0;
    for i in 0..rank {
        if axes.contains(&i) {
            result.push(1);
        } else {
            result.push(out_dims[j]);
            j += 1;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_axes() {
        assert_eq!(parse_axes(&[-1, 0], 3).unwrap(), vec![0, 2]);
        assert_eq!(parse_axes(&[], 2).unwrap(), vec![0, 1]);
        assert!(parse_axes(&[3], 3).is_err());
        assert!(parse_axes(&[-4], 3).is_err());
    }

    #[test]
    fn test_scalar_has_no_axes() {
        assert_eq!(parse_axes(&[], 0).unwrap(), Vec::<usize>::new());
        assert!(matches!(parse_axis(0, 0), Err(Error::DimOutOfRange { axis: 0, rank: 0 })));
        assert!(parse_axis(-1, 0).is_err());
        assert!(parse_axes(&[0], 0).is_err());
        assert!(!axes_are_inner_most(&[0], 0));
        assert!(axes_are_inner_most(&[], 0));
    }

    #[test]
    fn test_axes_permutation() {
        assert_eq!(axes_permutation(&[2], 3), None);
        assert_eq!(axes_permutation(&[1, 2], 3), None);
        assert_eq!(axes_permutation(&[0], 3), Some(vec![1, 2, 0]));
        assert_eq!(axes_permutation(&[0, 2], 4), Some(vec![1, 3, 0, 2]));
    }

    #[test]
    fn test_undo_permutation() {
        let perm = vec![1, 2, 0];
        let undo = undo_axes_permutation(&perm);
        assert_eq!(undo, vec![2, 0, 1]);
    }

    #[test]
    fn test_out_and_reduce_shapes() {
        let (out, red) = out_and_reduce_shapes(&[2, 3, 4], &[1]);
        assert_eq!(out, vec![2, 4]);
        assert_eq!(red, vec![3]);
        assert_eq!(expand_shape_to_keep_dim(&out, &[1]), vec![2, 1, 4]);
    }
}
