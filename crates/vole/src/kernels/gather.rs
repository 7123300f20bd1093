// Gather, scatter, top-k and bincount kernels.
//
// Index tensors are read as i32 whatever their stored dtype. Out-of-range
// indices are reported by the vole-cpu functions as `IndexOutOfRange`.

use vole_core::axes::parse_axis;
use vole_core::{DType, Error, Result, Shape, TensorInfo, Values};
use vole_cpu::array;

use super::{expect_rank, map_values_shaped, wrong_op};
use crate::engine::Engine;
use crate::op::Op;

pub(crate) fn gather(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let (x, indices) = (&inputs[0], &inputs[1]);
    let idx = engine.values(indices)?.to_i32_vec()?;
    let values = engine.values(x)?;
    let (values, shape) = match op {
        Op::Gather(attrs) => {
            let axis = parse_axis(attrs.axis, x.rank())?;
            map_values_shaped!(values, |d| array::gather(
                d,
                &x.shape,
                &idx,
                &indices.shape,
                axis,
                attrs.batch_dims
            )?)
        }
        Op::GatherNd => map_values_shaped!(values, |d| array::gather_nd(d, &x.shape, &idx, &indices.shape)?),
        _ => return Err(wrong_op("gather", op)),
    };
    Ok(vec![engine.write(values, shape)?])
}

/// Scatter `updates` into zeros of `shape`; duplicate indices add.
pub(crate) fn scatter_nd(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::ScatterNd(attrs) = op else {
        return Err(wrong_op("scatter_nd", op));
    };
    let (indices, updates) = (&inputs[0], &inputs[1]);
    let idx = engine.values(indices)?.to_i32_vec()?;
    let shape = Shape::new(attrs.shape.clone());
    let values = match engine.values(updates)? {
        Values::F32(u) => Values::F32(array::scatter_nd(&idx, &indices.shape, u, &shape)?),
        Values::I32(u) => Values::I32(array::scatter_nd(&idx, &indices.shape, u, &shape)?),
        other => {
            return Err(Error::UnsupportedDType {
                op: "ScatterNd",
                dtype: other.dtype(),
            })
        }
    };
    Ok(vec![engine.write(values, shape)?])
}

/// Largest `k` entries of the last axis: `(values, indices)`.
pub(crate) fn top_k(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::TopK(attrs) = op else {
        return Err(wrong_op("top_k", op));
    };
    let x = &inputs[0];
    if x.rank() == 0 {
        return Err(Error::RankMismatch {
            op: "TopK",
            expected: 1,
            got: 0,
        });
    }
    let (values, indices) = match engine.values(x)? {
        Values::F32(d) => {
            let (v, i) = array::top_k(d, &x.shape, attrs.k, attrs.sorted)?;
            (Values::F32(v), i)
        }
        Values::I32(d) => {
            let (v, i) = array::top_k(d, &x.shape, attrs.k, attrs.sorted)?;
            (Values::I32(v), i)
        }
        other => {
            return Err(Error::UnsupportedDType {
                op: "TopK",
                dtype: other.dtype(),
            })
        }
    };
    let mut dims = x.dims().to_vec();
    if let Some(last) = dims.last_mut() {
        *last = attrs.k;
    }
    let shape = Shape::new(dims);
    let values = engine.write(values, shape.clone())?;
    let indices = engine.write_i32(indices, shape)?;
    Ok(vec![values, indices])
}

fn bin_size(op: &'static str, size: i64) -> Result<usize> {
    usize::try_from(size).map_err(|_| Error::InvalidSize {
        op,
        value: size,
        reason: "size must be non-negative".into(),
    })
}

fn optional_weights(engine: &Engine, inputs: &[TensorInfo]) -> Result<Option<Vec<f32>>> {
    inputs
        .get(1)
        .map(|w| engine.values(w)?.to_f32_vec())
        .transpose()
}

/// Count occurrences of each value of a 1-D int tensor in `[0, size)`,
/// optionally summing weights instead of ones.
pub(crate) fn bincount(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let x = &inputs[0];
    if matches!(x.dtype, DType::F32 | DType::Complex64 | DType::String) {
        return Err(Error::UnsupportedDType {
            op: "Bincount",
            dtype: x.dtype,
        });
    }
    let data = engine.values(x)?.to_i32_vec()?;
    let weights = optional_weights(engine, inputs)?;
    let out = match op {
        Op::Bincount(attrs) => {
            let size = bin_size("Bincount", attrs.size)?;
            expect_rank("Bincount", x, 1)?;
            let counts = array::bincount(&data, weights.as_deref(), size)?;
            engine.write_f32(counts, Shape::from(size))?
        }
        Op::DenseBincount(attrs) => {
            let size = bin_size("DenseBincount", attrs.size)?;
            match x.rank() {
                1 => {
                    let counts = array::dense_bincount_2d(&data, 1, weights.as_deref(), size, attrs.binary_output)?;
                    engine.write_f32(counts, Shape::from(size))?
                }
                2 => {
                    let rows = x.dims()[0];
                    let counts =
                        array::dense_bincount_2d(&data, rows, weights.as_deref(), size, attrs.binary_output)?;
                    engine.write_f32(counts, Shape::from((rows, size)))?
                }
                got => {
                    return Err(Error::RankMismatch {
                        op: "DenseBincount",
                        expected: 2,
                        got,
                    })
                }
            }
        }
        _ => return Err(wrong_op("bincount", op)),
    };
    Ok(vec![out])
}
