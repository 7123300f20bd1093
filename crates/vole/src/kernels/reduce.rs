// Reduction kernels
//
// Reductions only ever collapse trailing dimensions: when the requested
// axes are not innermost the input is transposed so they are, after which
// every output element reads one contiguous window of `reduce_size` values.
//
//   x: [2, 3, 4], axes [0]  ->  transpose [1, 2, 0]  ->  [3, 4, 2]
//   out[i] = reduce(window[i * 2 .. i * 2 + 2])       ->  [3, 4]

use vole_core::axes::{
    axes_permutation, expand_shape_to_keep_dim, inner_most_axes, out_and_reduce_shapes, parse_axes, parse_axis,
};
use vole_core::{DType, Element, Error, Result, Shape, TensorInfo, Values};
use vole_cpu::array;
use vole_cpu::reduce::{arg_reduce_inner, cumulative, logical_inner, mean_inner, reduce_inner};
use vole_cpu::{BinaryOp, ReduceOp, UnaryOp};

use super::{map_values_shaped, wrong_op};
use crate::engine::Engine;
use crate::op::{Op, ReduceAttrs};

/// Input values with `axes` moved innermost, plus the permuted dims.
fn innermost(engine: &Engine, x: &TensorInfo, axes: &[usize]) -> Result<(Values, Vec<usize>)> {
    let values = engine.values(x)?;
    match axes_permutation(axes, x.rank()) {
        Some(perm) => {
            let (values, shape) = map_values_shaped!(values, |d| array::transpose(d, &x.shape, &perm)?);
            Ok((values, shape.into_dims()))
        }
        None => Ok((values.clone(), x.dims().to_vec())),
    }
}

/// Value of a reduction over an empty window.
fn identity<T: Element>(op: ReduceOp) -> T {
    match op {
        ReduceOp::Prod => T::one(),
        ReduceOp::Max => T::lowest(),
        ReduceOp::Min => T::highest(),
        ReduceOp::Mean => T::from_f64(f64::NAN),
        _ => T::zero(),
    }
}

fn reduce_typed<T: Element>(data: &[T], reduce_size: usize, out_size: usize, op: ReduceOp) -> Vec<T> {
    if reduce_size == 0 {
        vec![identity(op); out_size]
    } else {
        reduce_inner(data, reduce_size, op)
    }
}

pub(crate) fn reduce(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Reduce(attrs) = op else {
        return Err(wrong_op("reduce", op));
    };
    let x = &inputs[0];
    if x.dtype == DType::Complex64 {
        return reduce_complex(engine, attrs, x);
    }
    let rank = x.rank();
    let axes = parse_axes(&attrs.axes, rank)?;
    let (values, dims) = innermost(engine, x, &axes)?;
    let (out_dims, reduce_dims) = out_and_reduce_shapes(&dims, &inner_most_axes(axes.len(), rank));
    let reduce_size: usize = reduce_dims.iter().product();
    let out_size: usize = out_dims.iter().product();

    let out = match (attrs.op, values) {
        (ReduceOp::All | ReduceOp::Any, v) => {
            let data = v.to_bool_vec()?;
            Values::Bool(if reduce_size == 0 {
                vec![attrs.op == ReduceOp::All; out_size]
            } else {
                logical_inner(&data, reduce_size, attrs.op)
            })
        }
        (ReduceOp::Mean, v) => {
            let data = v.to_f32_vec()?;
            Values::F32(if reduce_size == 0 {
                vec![f32::NAN; out_size]
            } else {
                mean_inner(&data, reduce_size)
            })
        }
        (op, Values::F32(data)) => Values::F32(reduce_typed(&data, reduce_size, out_size, op)),
        (op, Values::String(_)) => {
            return Err(Error::UnsupportedDType {
                op: op.name(),
                dtype: DType::String,
            })
        }
        (op, v) => Values::I32(reduce_typed(&v.to_i32_vec()?, reduce_size, out_size, op)),
    };

    let out_shape = if attrs.keep_dims {
        expand_shape_to_keep_dim(&out_dims, &axes)
    } else {
        out_dims
    };
    Ok(vec![engine.write(out, Shape::new(out_shape))?])
}

/// Sum and Mean of a complex tensor reduce each plane independently.
fn reduce_complex(engine: &mut Engine, attrs: &ReduceAttrs, x: &TensorInfo) -> Result<Vec<TensorInfo>> {
    if !matches!(attrs.op, ReduceOp::Sum | ReduceOp::Mean) {
        return Err(Error::UnsupportedDType {
            op: attrs.op.name(),
            dtype: DType::Complex64,
        });
    }
    let (re, im) = engine.parts(x)?;
    let op = Op::Reduce(attrs.clone());
    let re_out = engine.execute_one(&op, &[re])?;
    let im_out = match engine.execute_one(&op, &[im]) {
        Ok(t) => t,
        Err(e) => {
            engine.dispose(&re_out)?;
            return Err(e);
        }
    };
    Ok(vec![engine.complex_from_parts(re_out, im_out)?])
}

/// ArgMax / ArgMin along one axis; the first extreme wins.
pub(crate) fn arg_reduce(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::ArgReduce(attrs) = op else {
        return Err(wrong_op("arg reduce", op));
    };
    let x = &inputs[0];
    let rank = x.rank();
    // A scalar is its own extreme; axis 0 (or -1) names it.
    let axes = if rank == 0 {
        parse_axis(attrs.axis, 1)?;
        Vec::new()
    } else {
        vec![parse_axis(attrs.axis, rank)?]
    };
    let (values, dims) = innermost(engine, x, &axes)?;
    let (out_dims, reduce_dims) = out_and_reduce_shapes(&dims, &inner_most_axes(axes.len(), rank));
    let reduce_size: usize = reduce_dims.iter().product();
    if reduce_size == 0 {
        return Err(Error::InvalidSize {
            op: attrs.op.name(),
            value: 0,
            reason: "cannot take the arg extreme of an empty axis".into(),
        });
    }
    let data = match values {
        Values::F32(d) => arg_reduce_inner(&d, reduce_size, attrs.op),
        Values::String(_) => {
            return Err(Error::UnsupportedDType {
                op: attrs.op.name(),
                dtype: DType::String,
            })
        }
        v => arg_reduce_inner(&v.to_i32_vec()?, reduce_size, attrs.op),
    };
    Ok(vec![engine.write_i32(data, Shape::new(out_dims))?])
}

pub(crate) fn cumulative_op(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Cumulative(attrs) = op else {
        return Err(wrong_op("cumulative", op));
    };
    let x = &inputs[0];
    // A scalar accumulates as a single-element vector.
    let dims: &[usize] = if x.rank() == 0 { &[1] } else { x.dims() };
    let axis = parse_axis(attrs.axis, dims.len())?;
    let out = match engine.values(x)? {
        Values::F32(d) => Values::F32(cumulative(d, dims, axis, attrs.op, attrs.exclusive, attrs.reverse)),
        Values::String(_) => {
            return Err(Error::UnsupportedDType {
                op: "Cumulative",
                dtype: DType::String,
            })
        }
        v => Values::I32(cumulative(&v.to_i32_vec()?, dims, axis, attrs.op, attrs.exclusive, attrs.reverse)),
    };
    Ok(vec![engine.write(out, x.shape.clone())?])
}

/// `exp(x - max(x)) / sum(exp(x - max(x)))` along `dim`, built from other
/// ops. Every intermediate is disposed before returning.
pub(crate) fn softmax(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Softmax(attrs) = op else {
        return Err(wrong_op("softmax", op));
    };
    let x = &inputs[0];
    let reduce = |op| {
        Op::Reduce(ReduceAttrs {
            op,
            axes: vec![attrs.dim],
            keep_dims: true,
        })
    };
    let mut temps = Vec::new();
    let result = (|| -> Result<TensorInfo> {
        let max = engine.execute_one(&reduce(ReduceOp::Max), std::slice::from_ref(x))?;
        temps.push(max.clone());
        let shifted = engine.execute_one(&Op::Binary(BinaryOp::Sub), &[x.clone(), max])?;
        temps.push(shifted.clone());
        let exp = engine.execute_one(&Op::Unary(UnaryOp::Exp), &[shifted])?;
        temps.push(exp.clone());
        let sum = engine.execute_one(&reduce(ReduceOp::Sum), std::slice::from_ref(&exp))?;
        temps.push(sum.clone());
        engine.execute_one(&Op::Binary(BinaryOp::RealDiv), &[exp, sum])
    })();
    engine.dispose_all(&temps)?;
    Ok(vec![result?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use vole_cpu::{ArgOp, CumulativeOp};

    use crate::op::{ArgReduceAttrs, CumulativeAttrs, SoftmaxAttrs};

    fn reduce_op(op: ReduceOp, axes: Vec<isize>, keep_dims: bool) -> Op {
        Op::Reduce(ReduceAttrs { op, axes, keep_dims })
    }

    #[test]
    fn test_sum_over_outer_axis() {
        let mut e = Engine::default();
        let x = e.tensor_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3)).unwrap();
        let s = e.execute_one(&reduce_op(ReduceOp::Sum, vec![0], false), &[x.clone()]).unwrap();
        assert_eq!(s.dims(), &[3]);
        assert_eq!(e.read_f32(&s).unwrap(), vec![5.0, 7.0, 9.0]);
        let k = e.execute_one(&reduce_op(ReduceOp::Max, vec![-1], true), &[x]).unwrap();
        assert_eq!(k.dims(), &[2, 1]);
        assert_eq!(e.read_f32(&k).unwrap(), vec![3.0, 6.0]);
    }

    #[test]
    fn test_reduce_all_axes_to_scalar() {
        let mut e = Engine::default();
        let x = e.tensor_i32(vec![2, 3, 4], 3).unwrap();
        let p = e.execute_one(&reduce_op(ReduceOp::Prod, vec![], false), &[x.clone()]).unwrap();
        assert_eq!(p.rank(), 0);
        assert_eq!(p.dtype, DType::I32);
        assert_eq!(e.read_i32(&p).unwrap(), vec![24]);
        let m = e.execute_one(&reduce_op(ReduceOp::Mean, vec![], false), &[x]).unwrap();
        assert_eq!(e.read_f32(&m).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_scalar_reductions() {
        let mut e = Engine::default();
        let x = e.tensor_f32(vec![4.5], ()).unwrap();
        let s = e.execute_one(&reduce_op(ReduceOp::Sum, vec![], false), &[x.clone()]).unwrap();
        assert_eq!(s.rank(), 0);
        assert_eq!(e.read_f32(&s).unwrap(), vec![4.5]);
        let err = e.execute_one(&reduce_op(ReduceOp::Sum, vec![0], false), &[x.clone()]).unwrap_err();
        assert!(matches!(err, Error::DimOutOfRange { axis: 0, rank: 0 }));

        let arg = Op::ArgReduce(ArgReduceAttrs { op: ArgOp::ArgMax, axis: 0 });
        let a = e.execute_one(&arg, &[x.clone()]).unwrap();
        assert_eq!(e.read_i32(&a).unwrap(), vec![0]);
        let cum = Op::Cumulative(CumulativeAttrs {
            op: CumulativeOp::Sum,
            axis: 0,
            exclusive: false,
            reverse: false,
        });
        let c = e.execute_one(&cum, &[x]).unwrap();
        assert_eq!(c.rank(), 0);
        assert_eq!(e.read_f32(&c).unwrap(), vec![4.5]);
    }

    #[test]
    fn test_integer_sum_wraps_like_add() {
        let mut e = Engine::default();
        let x = e.tensor_i32(vec![i32::MAX, 5], 2).unwrap();
        let s = e.execute_one(&reduce_op(ReduceOp::Sum, vec![], false), &[x]).unwrap();
        let a = e.tensor_i32(vec![i32::MAX], ()).unwrap();
        let b = e.tensor_i32(vec![5], ()).unwrap();
        let added = e.execute_one(&Op::Binary(BinaryOp::Add), &[a, b]).unwrap();
        assert_eq!(e.read_i32(&s).unwrap(), vec![i32::MIN + 4]);
        assert_eq!(e.read_i32(&s).unwrap(), e.read_i32(&added).unwrap());
    }

    #[test]
    fn test_empty_window_yields_identity() {
        let mut e = Engine::default();
        let x = e.tensor_f32(vec![], (2, 0)).unwrap();
        let s = e.execute_one(&reduce_op(ReduceOp::Sum, vec![1], false), &[x.clone()]).unwrap();
        assert_eq!(e.read_f32(&s).unwrap(), vec![0.0, 0.0]);
        let p = e.execute_one(&reduce_op(ReduceOp::Prod, vec![1], false), &[x]).unwrap();
        assert_eq!(e.read_f32(&p).unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_logical_reductions() {
        let mut e = Engine::default();
        let x = e.tensor_bool(vec![true, false, true, true], (2, 2)).unwrap();
        let all = e.execute_one(&reduce_op(ReduceOp::All, vec![1], false), &[x.clone()]).unwrap();
        let any = e.execute_one(&reduce_op(ReduceOp::Any, vec![0], false), &[x]).unwrap();
        assert_eq!(e.read_bool(&all).unwrap(), vec![false, true]);
        assert_eq!(e.read_bool(&any).unwrap(), vec![true, true]);
    }

    #[test]
    fn test_complex_sum() {
        let mut e = Engine::default();
        let c = e.write_complex(vec![1.0, 2.0], vec![3.0, -1.0], Shape::from(2)).unwrap();
        let s = e.execute_one(&reduce_op(ReduceOp::Sum, vec![], false), &[c]).unwrap();
        assert_eq!(e.read_complex(&s).unwrap(), (vec![3.0], vec![2.0]));
    }

    #[test]
    fn test_arg_max_first_occurrence() {
        let mut e = Engine::default();
        let x = e.tensor_f32(vec![1.0, 5.0, 5.0, 7.0, 0.0, 7.0], (2, 3)).unwrap();
        let op = Op::ArgReduce(ArgReduceAttrs { op: ArgOp::ArgMax, axis: 1 });
        let a = e.execute_one(&op, &[x.clone()]).unwrap();
        assert_eq!(e.read_i32(&a).unwrap(), vec![1, 0]);
        let op = Op::ArgReduce(ArgReduceAttrs { op: ArgOp::ArgMin, axis: 0 });
        let b = e.execute_one(&op, &[x]).unwrap();
        assert_eq!(e.read_i32(&b).unwrap(), vec![0, 1, 0]);
    }

    #[test]
    fn test_cumsum_exclusive() {
        let mut e = Engine::default();
        let x = e.tensor_i32(vec![1, 2, 3], 3).unwrap();
        let op = Op::Cumulative(CumulativeAttrs {
            op: CumulativeOp::Sum,
            axis: 0,
            exclusive: true,
            reverse: false,
        });
        let c = e.execute_one(&op, &[x]).unwrap();
        assert_eq!(e.read_i32(&c).unwrap(), vec![0, 1, 3]);
    }

    #[test]
    fn test_softmax_disposes_intermediates() {
        let mut e = Engine::default();
        let x = e.tensor_f32(vec![1.0, 2.0, 3.0, 1.0, 1.0, 1.0], (2, 3)).unwrap();
        let y = e.execute_one(&Op::Softmax(SoftmaxAttrs::default()), &[x.clone()]).unwrap();
        assert_eq!(e.num_data_ids(), 2);
        let out = e.read_f32(&y).unwrap();
        for row in out.chunks(3) {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        }
        assert!((out[3] - 1.0 / 3.0).abs() < 1e-6);
        assert!(out[2] > out[1] && out[1] > out[0]);
    }
}
