use vole_core::{bail, Error, Result, Shape};

// Sparse kernels
//
// A sparse tensor is an `[nnz, rank]` i32 index matrix plus a dense shape.
// SparseReshape only rewrites indices; segment reductions fold rows of a
// dense `data` tensor selected by `indices` into buckets named by sorted
// `segment_ids`.

/// Resolve `new_shape` (at most one `-1`) against `input_shape` and remap
/// every index row. Returns `(new_indices, new_shape)`.
pub fn sparse_reshape(indices: &[i32], input_shape: &[i64], new_shape: &[i64]) -> Result<(Vec<i32>, Vec<i64>)> {
    let dense_size: i64 = input_shape.iter().product();
    let mut unknown = None;
    let mut product: i64 = 1;
    for (d, &size) in new_shape.iter().enumerate() {
        if size == -1 {
            if let Some(prev) = unknown {
                bail!("sparse_reshape: only one output dimension may be -1, found {prev} and {d}");
            }
            unknown = Some(d);
        } else if size < 0 {
            return Err(Error::InvalidSize {
                op: "sparse_reshape",
                value: size,
                reason: format!("dimension {d} must be non-negative"),
            });
        } else {
            product *= size;
        }
    }

    let mut out_shape = new_shape.to_vec();
    if let Some(d) = unknown {
        if product <= 0 {
            bail!("sparse_reshape: cannot infer dimension {d} when the other dimensions multiply to zero");
        }
        let missing = dense_size / product;
        if missing * product != dense_size {
            bail!(
                "sparse_reshape: input has {dense_size} dense values, not divisible by {product}"
            );
        }
        out_shape[d] = missing;
    } else if product != dense_size {
        bail!(
            "sparse_reshape: input has {dense_size} dense values but new shape {:?} has {product}",
            new_shape
        );
    }

    let in_rank = input_shape.len();
    let out_rank = out_shape.len();
    let in_strides = strides_i64(input_shape);
    let out_strides = strides_i64(&out_shape);
    let nnz = if in_rank == 0 { 0 } else { indices.len() / in_rank };
    let mut out = Vec::with_capacity(nnz * out_rank);
    for row in 0..nnz {
        let mut flat: i64 = 0;
        for j in 0..in_rank {
            flat += indices[row * in_rank + j] as i64 * in_strides[j];
        }
        for &s in &out_strides {
            out.push((flat / s) as i32);
            flat %= s;
        }
    }
    Ok((out, out_shape))
}

fn strides_i64(shape: &[i64]) -> Vec<i64> {
    let mut strides = vec![1i64; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1].max(1);
    }
    strides
}

/// Sum (or mean) of `data` rows `indices[i]` into output row
/// `segment_ids[i]`. The output has `segment_ids.last() + 1` rows; segments
/// that receive nothing stay zero.
pub fn sparse_segment_reduce(
    data: &[f32],
    data_shape: &Shape,
    indices: &[i32],
    segment_ids: &[i32],
    mean: bool,
) -> Result<(Vec<f32>, Shape)> {
    let dims = data_shape.dims();
    if dims.is_empty() {
        return Err(Error::RankMismatch {
            op: "sparse_segment_reduce data",
            expected: 1,
            got: 0,
        });
    }
    if indices.len() != segment_ids.len() {
        bail!(
            "sparse_segment_reduce: {} indices but {} segment ids",
            indices.len(),
            segment_ids.len()
        );
    }
    let num_rows = dims[0];
    let row_len: usize = dims[1..].iter().product();

    let mut previous = 0i32;
    for (position, &id) in segment_ids.iter().enumerate() {
        if id < 0 {
            return Err(Error::IndexOutOfRange {
                op: "sparse_segment_reduce segment id",
                index: id as i64,
                limit: i32::MAX as usize,
            });
        }
        if id < previous {
            return Err(Error::SegmentIdsNotSorted {
                position,
                previous,
                current: id,
            });
        }
        previous = id;
    }
    let num_segments = segment_ids.last().map_or(0, |&s| s as usize + 1);

    let mut out = vec![0f32; num_segments * row_len];
    let mut counts = vec![0usize; num_segments];
    for (&idx, &seg) in indices.iter().zip(segment_ids) {
        if idx < 0 || idx as usize >= num_rows {
            return Err(Error::IndexOutOfRange {
                op: "sparse_segment_reduce",
                index: idx as i64,
                limit: num_rows,
            });
        }
        let src = &data[idx as usize * row_len..(idx as usize + 1) * row_len];
        let dst = &mut out[seg as usize * row_len..(seg as usize + 1) * row_len];
        for (d, s) in dst.iter_mut().zip(src) {
            *d += s;
        }
        counts[seg as usize] += 1;
    }
    if mean {
        for (seg, &count) in counts.iter().enumerate() {
            if count > 1 {
                for v in &mut out[seg * row_len..(seg + 1) * row_len] {
                    *v /= count as f32;
                }
            }
        }
    }

    let mut out_dims = dims.to_vec();
    out_dims[0] = num_segments;
    Ok((out, Shape::new(out_dims)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reshape_infers_dim() {
        // [2, 3] -> [3, -1]
        let (idx, shape) = sparse_reshape(&[0, 0, 1, 2], &[2, 3], &[3, -1]).unwrap();
        assert_eq!(shape, vec![3, 2]);
        assert_eq!(idx, vec![0, 0, 2, 1]);
    }

    #[test]
    fn test_reshape_errors() {
        assert!(sparse_reshape(&[], &[2, 3], &[-1, -1]).is_err());
        assert!(matches!(
            sparse_reshape(&[], &[2, 3], &[-2, 3]),
            Err(Error::InvalidSize { value: -2, .. })
        ));
        assert!(sparse_reshape(&[], &[2, 3], &[4, 2]).is_err());
    }

    #[test]
    fn test_segment_sum_and_mean() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let shape = Shape::from((3, 2));
        let (sum, s) = sparse_segment_reduce(&data, &shape, &[0, 2, 1], &[0, 0, 2], false).unwrap();
        assert_eq!(s.dims(), &[3, 2]);
        assert_eq!(sum, vec![6.0, 8.0, 0.0, 0.0, 3.0, 4.0]);
        let (mean, _) = sparse_segment_reduce(&data, &shape, &[0, 2, 1], &[0, 0, 2], true).unwrap();
        assert_eq!(mean, vec![3.0, 4.0, 0.0, 0.0, 3.0, 4.0]);
    }

    #[test]
    fn test_segment_ids_must_be_sorted() {
        let err = sparse_segment_reduce(&[1.0, 2.0], &Shape::from(2), &[0, 1], &[1, 0], false)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SegmentIdsNotSorted {
                position: 1,
                previous: 1,
                current: 0
            }
        ));
    }
}
