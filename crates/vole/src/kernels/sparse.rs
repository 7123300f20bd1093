// Sparse reshape and segment reductions

use vole_core::{DType, Error, Result, Shape, TensorInfo};
use vole_cpu::sparse;

use super::{expect_dtype, expect_rank, wrong_op};
use crate::engine::Engine;
use crate::op::Op;

fn read_i64(engine: &Engine, t: &TensorInfo) -> Result<Vec<i64>> {
    Ok(engine.read_i32(t)?.into_iter().map(i64::from).collect())
}

/// `(indices [N, rank], shape [rank], new_shape [k]) -> (indices [N, k], shape [k])`.
pub(crate) fn sparse_reshape(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::SparseReshape = op else {
        return Err(wrong_op("sparse_reshape", op));
    };
    let (indices, shape, new_shape) = (&inputs[0], &inputs[1], &inputs[2]);
    expect_rank("SparseReshape", indices, 2)?;
    expect_rank("SparseReshape", shape, 1)?;
    expect_rank("SparseReshape", new_shape, 1)?;
    let rank = shape.elem_count();
    if indices.dims()[1] != rank {
        return Err(Error::ShapeMismatch {
            expected: Shape::from((indices.dims()[0], rank)),
            got: indices.shape.clone(),
        });
    }
    let idx = engine.read_i32(indices)?;
    let input_shape = read_i64(engine, shape)?;
    let target = read_i64(engine, new_shape)?;
    let (out_indices, out_shape) = sparse::sparse_reshape(&idx, &input_shape, &target)?;

    let nnz = indices.dims()[0];
    let new_rank = out_shape.len();
    let out_shape = out_shape
        .into_iter()
        .map(|d| {
            i32::try_from(d).map_err(|_| Error::InvalidSize {
                op: "SparseReshape",
                value: d,
                reason: "dimension does not fit in i32".into(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let indices = engine.write_i32(out_indices, Shape::from((nnz, new_rank)))?;
    let shape = engine.write_i32(out_shape, Shape::from(new_rank))?;
    Ok(vec![indices, shape])
}

/// `(data, indices, segment_ids)`; rows of `data` picked by `indices` are
/// summed (or averaged) into the row named by the matching segment id.
pub(crate) fn sparse_segment_reduce(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let (name, mean) = match op {
        Op::SparseSegmentSum => ("SparseSegmentSum", false),
        Op::SparseSegmentMean => ("SparseSegmentMean", true),
        _ => return Err(wrong_op("sparse_segment_reduce", op)),
    };
    let (data, indices, segment_ids) = (&inputs[0], &inputs[1], &inputs[2]);
    expect_dtype(name, data, &[DType::F32, DType::I32])?;
    expect_rank(name, indices, 1)?;
    expect_rank(name, segment_ids, 1)?;
    let values = engine.read_f32(data)?;
    let idx = engine.read_i32(indices)?;
    let seg = engine.read_i32(segment_ids)?;
    let (out, shape) = sparse::sparse_segment_reduce(&values, &data.shape, &idx, &seg, mean)?;
    Ok(vec![engine.write_f32(out, shape)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_reshape_infers_dim() {
        let mut e = Engine::default();
        let indices = e.tensor_i32(vec![0, 0, 0, 1, 1, 2], (3, 2)).unwrap();
        let shape = e.tensor_i32(vec![2, 3], 2).unwrap();
        let new_shape = e.tensor_i32(vec![3, -1], 2).unwrap();
        let out = e.execute(&Op::SparseReshape, &[indices, shape, new_shape]).unwrap();
        assert_eq!(out[0].dims(), &[3, 2]);
        assert_eq!(e.read_i32(&out[1]).unwrap(), vec![3, 2]);
        // flat offsets 0, 1, 5 in a [3, 2] layout
        assert_eq!(e.read_i32(&out[0]).unwrap(), vec![0, 0, 0, 1, 2, 1]);
    }

    #[test]
    fn test_sparse_reshape_rejects_two_unknowns() {
        let mut e = Engine::default();
        let indices = e.tensor_i32(vec![0, 0], (1, 2)).unwrap();
        let shape = e.tensor_i32(vec![2, 3], 2).unwrap();
        let new_shape = e.tensor_i32(vec![-1, -1], 2).unwrap();
        assert!(e.execute(&Op::SparseReshape, &[indices, shape, new_shape]).is_err());
    }

    #[test]
    fn test_segment_sum_and_mean() {
        let mut e = Engine::default();
        let data = e.tensor_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (3, 2)).unwrap();
        let idx = e.tensor_i32(vec![0, 2, 1], 3).unwrap();
        let seg = e.tensor_i32(vec![0, 0, 1], 3).unwrap();
        let sum = e
            .execute_one(&Op::SparseSegmentSum, &[data.clone(), idx.clone(), seg.clone()])
            .unwrap();
        assert_eq!(sum.dims(), &[2, 2]);
        assert_eq!(e.read_f32(&sum).unwrap(), vec![6.0, 8.0, 3.0, 4.0]);
        let mean = e.execute_one(&Op::SparseSegmentMean, &[data, idx, seg]).unwrap();
        assert_eq!(e.read_f32(&mean).unwrap(), vec![3.0, 4.0, 3.0, 4.0]);
    }

    #[test]
    fn test_segment_ids_must_be_sorted() {
        let mut e = Engine::default();
        let data = e.tensor_f32(vec![1.0, 2.0], 2).unwrap();
        let idx = e.tensor_i32(vec![0, 1], 2).unwrap();
        let seg = e.tensor_i32(vec![1, 0], 2).unwrap();
        let err = e.execute(&Op::SparseSegmentSum, &[data, idx, seg]).unwrap_err();
        assert!(matches!(err, Error::SegmentIdsNotSorted { .. }));
    }
}
