use vole_core::{Element, Error, Layout, Result, Shape};

// Data movement kernels
//
// These kernels never look at element values, so they are generic over
// `T: Clone` and serve every dtype including strings. Views that need no
// arithmetic (transpose, broadcast, slice) are expressed as a Layout over
// the source buffer and materialized by walking `strided_indices`.

fn materialize<T: Clone>(data: &[T], layout: &Layout) -> Vec<T> {
    layout.strided_indices().map(|i| data[i].clone()).collect()
}

/// Permute dimensions: output dim `i` is input dim `perm[i]`.
pub fn transpose<T: Clone>(data: &[T], shape: &Shape, perm: &[usize]) -> Result<(Vec<T>, Shape)> {
    let view = Layout::contiguous(shape.clone()).permute(perm)?;
    let out_shape = view.shape().clone();
    if view.is_contiguous() {
        return Ok((data.to_vec(), out_shape));
    }
    Ok((materialize(data, &view), out_shape))
}

/// Expand `data` to the broadcast shape `target`.
pub fn broadcast_to<T: Clone>(data: &[T], shape: &Shape, target: &Shape) -> Result<Vec<T>> {
    let view = Layout::contiguous(shape.clone()).broadcast_as(target)?;
    Ok(materialize(data, &view))
}

/// Resolve `begin`/`size` (size `-1` = to the end) into concrete sizes.
pub fn resolve_slice(shape: &Shape, begin: &[usize], size: &[isize]) -> Result<Vec<usize>> {
    let rank = shape.rank();
    if begin.len() != rank || size.len() != rank {
        return Err(Error::msg(format!(
            "slice: begin {:?} and size {:?} must both have rank {}",
            begin, size, rank
        )));
    }
    let mut out = Vec::with_capacity(rank);
    for d in 0..rank {
        let dim = shape.dims()[d];
        if begin[d] > dim {
            return Err(Error::IndexOutOfRange {
                op: "slice",
                index: begin[d] as i64,
                limit: dim + 1,
            });
        }
        let len = if size[d] < 0 {
            dim - begin[d]
        } else {
            size[d] as usize
        };
        if begin[d] + len > dim {
            return Err(Error::msg(format!(
                "slice: begin {} + size {} exceeds dim {} of size {}",
                begin[d], len, d, dim
            )));
        }
        out.push(len);
    }
    Ok(out)
}

/// Contiguous block of `data` starting at `begin` with extent `size`.
pub fn slice<T: Clone>(data: &[T], shape: &Shape, begin: &[usize], size: &[usize]) -> Result<Vec<T>> {
    let mut view = Layout::contiguous(shape.clone());
    for d in 0..shape.rank() {
        view = view.narrow(d, begin[d], size[d])?;
    }
    Ok(materialize(data, &view))
}

/// Join tensors along `axis`. All inputs must share rank and every other dim.
pub fn concat<T: Clone>(inputs: &[(&[T], &Shape)], axis: usize) -> Result<(Vec<T>, Shape)> {
    let (_, first) = inputs
        .first()
        .ok_or_else(|| Error::msg("concat: empty input list"))?;
    let rank = first.rank();
    if axis >= rank {
        return Err(Error::DimOutOfRange {
            axis: axis as isize,
            rank,
        });
    }
    for (i, (data, shape)) in inputs.iter().enumerate() {
        if shape.rank() != rank {
            return Err(Error::msg(format!(
                "concat: input {} has rank {} but expected {}",
                i,
                shape.rank(),
                rank
            )));
        }
        for d in 0..rank {
            if d != axis && shape.dims()[d] != first.dims()[d] {
                return Err(Error::ShapeMismatch {
                    expected: (*first).clone(),
                    got: (*shape).clone(),
                });
            }
        }
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                shape: (*shape).clone(),
                expected: shape.elem_count(),
                got: data.len(),
            });
        }
    }

    let mut out_dims = first.dims().to_vec();
    out_dims[axis] = inputs.iter().map(|(_, s)| s.dims()[axis]).sum();
    let out_shape = Shape::new(out_dims);
    let outer: usize = first.dims()[..axis].iter().product();
    let inner: usize = first.dims()[axis + 1..].iter().product();

    let mut out = Vec::with_capacity(out_shape.elem_count());
    for o in 0..outer {
        for (data, shape) in inputs {
            let chunk = shape.dims()[axis] * inner;
            out.extend_from_slice(&data[o * chunk..(o + 1) * chunk]);
        }
    }
    Ok((out, out_shape))
}

/// Split along `axis` into pieces of the given sizes.
pub fn split<T: Clone>(
    data: &[T],
    shape: &Shape,
    sizes: &[usize],
    axis: usize,
) -> Result<Vec<(Vec<T>, Shape)>> {
    let dim = shape.dim(axis)?;
    if sizes.iter().sum::<usize>() != dim {
        return Err(Error::msg(format!(
            "split: sizes {:?} do not sum to dim {} of size {}",
            sizes, axis, dim
        )));
    }
    let mut begin = vec![0usize; shape.rank()];
    let mut pieces = Vec::with_capacity(sizes.len());
    for &len in sizes {
        let mut size = shape.dims().to_vec();
        size[axis] = len;
        let piece = slice(data, shape, &begin, &size)?;
        pieces.push((piece, Shape::new(size)));
        begin[axis] += len;
    }
    Ok(pieces)
}

/// Constant padding; `paddings[d] = [before, after]`.
pub fn pad<T: Clone>(data: &[T], shape: &Shape, paddings: &[[usize; 2]], constant: T) -> Result<(Vec<T>, Shape)> {
    let rank = shape.rank();
    if paddings.len() != rank {
        return Err(Error::msg(format!(
            "pad: {} padding pairs for rank {}",
            paddings.len(),
            rank
        )));
    }
    let out_dims: Vec<usize> = shape
        .dims()
        .iter()
        .zip(paddings)
        .map(|(&d, &[b, a])| d + b + a)
        .collect();
    let out_shape = Shape::new(out_dims);
    let out_strides = out_shape.stride_contiguous();
    let in_strides = shape.stride_contiguous();
    let mut out = vec![constant; out_shape.elem_count()];
    let mut loc = vec![0usize; rank];
    for (i, v) in data.iter().enumerate() {
        shape.index_to_loc_into(i, &in_strides, &mut loc);
        for d in 0..rank {
            loc[d] += paddings[d][0];
        }
        out[Shape::loc_to_index(&loc, &out_strides)] = v.clone();
    }
    Ok((out, out_shape))
}

/// Repeat the tensor `reps[d]` times along each dimension.
pub fn tile<T: Clone>(data: &[T], shape: &Shape, reps: &[usize]) -> Result<(Vec<T>, Shape)> {
    let rank = shape.rank();
    if reps.len() != rank {
        return Err(Error::msg(format!(
            "tile: {} repetitions for rank {}",
            reps.len(),
            rank
        )));
    }
    let out_shape = Shape::new(shape.dims().iter().zip(reps).map(|(&d, &r)| d * r).collect());
    let out_strides = out_shape.stride_contiguous();
    let in_strides = shape.stride_contiguous();
    let mut loc = vec![0usize; rank];
    let mut out = Vec::with_capacity(out_shape.elem_count());
    for i in 0..out_shape.elem_count() {
        out_shape.index_to_loc_into(i, &out_strides, &mut loc);
        for d in 0..rank {
            loc[d] %= shape.dims()[d];
        }
        out.push(data[Shape::loc_to_index(&loc, &in_strides)].clone());
    }
    Ok((out, out_shape))
}

/// Reverse the order of elements along each axis in `axes`.
pub fn reverse<T: Clone>(data: &[T], shape: &Shape, axes: &[usize]) -> Vec<T> {
    let strides = shape.stride_contiguous();
    let mut loc = vec![0usize; shape.rank()];
    (0..data.len())
        .map(|i| {
            shape.index_to_loc_into(i, &strides, &mut loc);
            for &a in axes {
                loc[a] = shape.dims()[a] - 1 - loc[a];
            }
            data[Shape::loc_to_index(&loc, &strides)].clone()
        })
        .collect()
}

/// Gather slices along `axis` using `indices`, with `batch_dims` leading
/// dimensions shared between `data` and `indices`.
///
/// Output shape: `data[..axis] ++ indices[batch_dims..] ++ data[axis+1..]`.
pub fn gather<T: Clone>(
    data: &[T],
    shape: &Shape,
    indices: &[i32],
    indices_shape: &Shape,
    axis: usize,
    batch_dims: usize,
) -> Result<(Vec<T>, Shape)> {
    let dims = shape.dims();
    if axis >= dims.len() {
        return Err(Error::DimOutOfRange {
            axis: axis as isize,
            rank: dims.len(),
        });
    }
    if batch_dims > axis || batch_dims > indices_shape.rank() {
        return Err(Error::msg(format!(
            "gather: batch_dims {} must be <= axis {} and <= indices rank {}",
            batch_dims,
            axis,
            indices_shape.rank()
        )));
    }
    for d in 0..batch_dims {
        if dims[d] != indices_shape.dims()[d] {
            return Err(Error::ShapeMismatch {
                expected: shape.clone(),
                got: indices_shape.clone(),
            });
        }
    }

    let batch: usize = dims[..batch_dims].iter().product();
    let outer: usize = dims[batch_dims..axis].iter().product();
    let dim_size = dims[axis];
    let slice_size: usize = dims[axis + 1..].iter().product();
    let n: usize = indices_shape.dims()[batch_dims..].iter().product();

    let mut out_dims = dims[..axis].to_vec();
    out_dims.extend_from_slice(&indices_shape.dims()[batch_dims..]);
    out_dims.extend_from_slice(&dims[axis + 1..]);

    let mut out = Vec::with_capacity(batch * outer * n * slice_size);
    for b in 0..batch {
        for o in 0..outer {
            for j in 0..n {
                let idx = indices[b * n + j];
                if idx < 0 || idx as usize >= dim_size {
                    return Err(Error::IndexOutOfRange {
                        op: "gather",
                        index: idx as i64,
                        limit: dim_size,
                    });
                }
                let start = ((b * outer + o) * dim_size + idx as usize) * slice_size;
                out.extend_from_slice(&data[start..start + slice_size]);
            }
        }
    }
    Ok((out, Shape::new(out_dims)))
}

/// Gather slices addressed by the innermost dimension of `indices`.
pub fn gather_nd<T: Clone>(
    data: &[T],
    shape: &Shape,
    indices: &[i32],
    indices_shape: &Shape,
) -> Result<(Vec<T>, Shape)> {
    let idims = indices_shape.dims();
    let depth = *idims
        .last()
        .ok_or_else(|| Error::msg("gather_nd: indices must have rank >= 1"))?;
    if depth > shape.rank() {
        return Err(Error::msg(format!(
            "gather_nd: index depth {} exceeds data rank {}",
            depth,
            shape.rank()
        )));
    }
    let num_slices: usize = idims[..idims.len() - 1].iter().product();
    let slice_size: usize = shape.dims()[depth..].iter().product();
    let strides = shape.stride_contiguous();

    let mut out = Vec::with_capacity(num_slices * slice_size);
    for s in 0..num_slices {
        let mut flat = 0usize;
        for j in 0..depth {
            let idx = indices[s * depth + j];
            let limit = shape.dims()[j];
            if idx < 0 || idx as usize >= limit {
                return Err(Error::IndexOutOfRange {
                    op: "gather_nd",
                    index: idx as i64,
                    limit,
                });
            }
            flat += idx as usize * strides[j];
        }
        out.extend_from_slice(&data[flat..flat + slice_size]);
    }
    let mut out_dims = idims[..idims.len() - 1].to_vec();
    out_dims.extend_from_slice(&shape.dims()[depth..]);
    Ok((out, Shape::new(out_dims)))
}

/// Scatter `updates` into a zero tensor of `shape`; duplicates accumulate.
pub fn scatter_nd<T: Element>(
    indices: &[i32],
    indices_shape: &Shape,
    updates: &[T],
    shape: &Shape,
) -> Result<Vec<T>> {
    let idims = indices_shape.dims();
    let depth = idims.last().copied().unwrap_or(0);
    if depth > shape.rank() {
        return Err(Error::msg(format!(
            "scatter_nd: index depth {} exceeds output rank {}",
            depth,
            shape.rank()
        )));
    }
    let num_updates: usize = idims[..idims.len().saturating_sub(1)].iter().product();
    let slice_size: usize = shape.dims()[depth..].iter().product();
    if updates.len() != num_updates * slice_size {
        return Err(Error::msg(format!(
            "scatter_nd: expected {} update values, got {}",
            num_updates * slice_size,
            updates.len()
        )));
    }
    let strides = shape.stride_contiguous();
    let mut out = vec![T::zero(); shape.elem_count()];
    for u in 0..num_updates {
        let mut flat = 0usize;
        for j in 0..depth {
            let idx = indices[u * depth + j];
            let limit = shape.dims()[j];
            if idx < 0 || idx as usize >= limit {
                return Err(Error::IndexOutOfRange {
                    op: "scatter_nd",
                    index: idx as i64,
                    limit,
                });
            }
            flat += idx as usize * strides[j];
        }
        for k in 0..slice_size {
            let cur = out[flat + k];
            out[flat + k] = T::from_f64(cur.as_f64() + updates[u * slice_size + k].as_f64());
        }
    }
    Ok(out)
}

/// One-hot encode along a new trailing axis. Out-of-range indices produce
/// an all-`off` row.
pub fn one_hot<T: Copy>(indices: &[i32], depth: usize, on: T, off: T) -> Vec<T> {
    let mut out = vec![off; indices.len() * depth];
    for (i, &idx) in indices.iter().enumerate() {
        if idx >= 0 && (idx as usize) < depth {
            out[i * depth + idx as usize] = on;
        }
    }
    out
}

/// `[start, start + step, ...)` stopping before `stop`.
pub fn range(start: f32, stop: f32, step: f32) -> Result<Vec<f32>> {
    if step == 0.0 {
        return Err(Error::InvalidSize {
            op: "range",
            value: 0,
            reason: "step must be non-zero".into(),
        });
    }
    let n = ((stop - start) / step).ceil();
    let n = if n > 0.0 { n as usize } else { 0 };
    Ok((0..n).map(|i| start + i as f32 * step).collect())
}

/// The `k` largest entries along the last dimension, with their indices.
/// Ties go to the lower index and NaN ranks above every number. With `sorted == false` the selected entries
/// keep their original order.
pub fn top_k<T: Element>(data: &[T], shape: &Shape, k: usize, sorted: bool) -> Result<(Vec<T>, Vec<i32>)> {
    let last = shape.dims().last().copied().unwrap_or(1);
    if k > last {
        return Err(Error::InvalidSize {
            op: "top_k",
            value: k as i64,
            reason: format!("k must be <= last dimension {}", last),
        });
    }
    let rows = if last == 0 { 0 } else { data.len() / last };
    let mut values = Vec::with_capacity(rows * k);
    let mut indices = Vec::with_capacity(rows * k);
    for r in 0..rows {
        let row = &data[r * last..(r + 1) * last];
        let mut order: Vec<usize> = (0..last).collect();
        order.sort_by(|&a, &b| row[b].sort_cmp(&row[a]).then(a.cmp(&b)));
        let mut chosen: Vec<usize> = order[..k].to_vec();
        if !sorted {
            chosen.sort_unstable();
        }
        for j in chosen {
            values.push(row[j]);
            indices.push(j as i32);
        }
    }
    Ok((values, indices))
}

/// Count occurrences of each value in `[0, size)`, optionally weighted.
/// Values `>= size` are ignored; negative values are an error.
pub fn bincount(x: &[i32], weights: Option<&[f32]>, size: usize) -> Result<Vec<f32>> {
    check_weights("bincount", x, weights)?;
    let mut out = vec![0f32; size];
    for (i, &v) in x.iter().enumerate() {
        if v < 0 {
            return Err(Error::IndexOutOfRange {
                op: "bincount",
                index: v as i64,
                limit: size,
            });
        }
        if (v as usize) < size {
            let w = match weights {
                Some(w) if !w.is_empty() => w[i],
                _ => 1.0,
            };
            out[v as usize] += w;
        }
    }
    Ok(out)
}

// Empty weights mean unweighted counts.
fn check_weights(op: &str, x: &[i32], weights: Option<&[f32]>) -> Result<()> {
    match weights {
        Some(w) if !w.is_empty() && w.len() != x.len() => Err(Error::msg(format!(
            "{op}: weights have {} elements but input has {}",
            w.len(),
            x.len()
        ))),
        _ => Ok(()),
    }
}

/// Row-wise bincount of a 2-D input. `binary_output` records presence
/// instead of counts.
pub fn dense_bincount_2d(
    x: &[i32],
    rows: usize,
    weights: Option<&[f32]>,
    size: usize,
    binary_output: bool,
) -> Result<Vec<f32>> {
    check_weights("dense_bincount", x, weights)?;
    let cols = if rows == 0 { 0 } else { x.len() / rows };
    let mut out = vec![0f32; rows * size];
    for r in 0..rows {
        for c in 0..cols {
            let v = x[r * cols + c];
            if v < 0 {
                return Err(Error::IndexOutOfRange {
                    op: "dense_bincount",
                    index: v as i64,
                    limit: size,
                });
            }
            if (v as usize) < size {
                let slot = &mut out[r * size + v as usize];
                if binary_output {
                    *slot = 1.0;
                } else {
                    *slot += match weights {
                        Some(w) if !w.is_empty() => w[r * cols + c],
                        _ => 1.0,
                    };
                }
            }
        }
    }
    Ok(out)
}
