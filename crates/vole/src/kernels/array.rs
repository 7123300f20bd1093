// Array movement kernels
//
// Reshape, Identity, ExpandDims and Squeeze never copy: they hand out a new
// handle on the same buffer (retained) with a different shape. Everything
// else materializes a fresh contiguous buffer.
//
// Complex tensors carry no bytes of their own, so a movement op on one runs
// the same op on the real and imaginary children and wraps the two results
// in a new complex parent.

use vole_core::axes::{parse_axes, parse_axis};
use vole_core::{DType, Error, Result, Shape, TensorInfo, Values};
use vole_cpu::array;

use super::{map_values, map_values_shaped, wrong_op};
use crate::engine::Engine;
use crate::op::{Op, PadAttrs};

/// Run `re_op` over the real children and `im_op` over the imaginary
/// children of complex `inputs`, pairing the outputs back up.
fn complex_passthrough(engine: &mut Engine, re_op: &Op, im_op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let mut re_in = Vec::with_capacity(inputs.len());
    let mut im_in = Vec::with_capacity(inputs.len());
    for t in inputs {
        if t.dtype != DType::Complex64 {
            return Err(Error::DTypeMismatch {
                expected: DType::Complex64,
                got: t.dtype,
            });
        }
        let (re, im) = engine.parts(t)?;
        re_in.push(re);
        im_in.push(im);
    }
    let re_out = engine.execute(re_op, &re_in)?;
    let im_out = match engine.execute(im_op, &im_in) {
        Ok(out) => out,
        Err(e) => {
            engine.dispose_all(&re_out)?;
            return Err(e);
        }
    };
    re_out
        .into_iter()
        .zip(im_out)
        .map(|(re, im)| engine.complex_from_parts(re, im))
        .collect()
}

fn is_complex(inputs: &[TensorInfo]) -> bool {
    inputs.iter().any(|t| t.dtype == DType::Complex64)
}

/// Resolve a reshape target against `count` elements; one `-1` is inferred.
fn infer_shape(target: &[isize], count: usize) -> Result<Shape> {
    let mut unknown = None;
    let mut known = 1usize;
    for (d, &size) in target.iter().enumerate() {
        match size {
            -1 if unknown.is_some() => {
                return Err(Error::InvalidSize {
                    op: "Reshape",
                    value: -1,
                    reason: "only one dimension may be -1".into(),
                })
            }
            -1 => unknown = Some(d),
            s if s < 0 => {
                return Err(Error::InvalidSize {
                    op: "Reshape",
                    value: s as i64,
                    reason: "dimensions must be non-negative".into(),
                })
            }
            s => known *= s as usize,
        }
    }
    let mut dims: Vec<usize> = target.iter().map(|&s| s.max(0) as usize).collect();
    if let Some(d) = unknown {
        if known == 0 || count % known != 0 {
            return Err(Error::InvalidSize {
                op: "Reshape",
                value: -1,
                reason: format!("cannot infer a dimension: {count} elements into {target:?}"),
            });
        }
        dims[d] = count / known;
    }
    Ok(Shape::new(dims))
}

pub(crate) fn reshape(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let x = &inputs[0];
    let shape = match op {
        Op::Reshape(attrs) => infer_shape(&attrs.shape, x.elem_count())?,
        Op::Identity => x.shape.clone(),
        Op::ExpandDims(attrs) => {
            let axis = parse_axis(attrs.axis, x.rank() + 1)?;
            x.shape.expand_dims(axis)
        }
        Op::Squeeze(attrs) => squeeze_shape(x, &attrs.axes)?,
        _ => return Err(wrong_op("reshape", op)),
    };
    Ok(vec![engine.alias(x, shape)?])
}

fn squeeze_shape(x: &TensorInfo, axes: &[isize]) -> Result<Shape> {
    let dims = x.dims();
    if axes.is_empty() {
        return Ok(Shape::new(dims.iter().copied().filter(|&d| d != 1).collect()));
    }
    let axes = parse_axes(axes, x.rank())?;
    for &a in &axes {
        if dims[a] != 1 {
            return Err(Error::InvalidSize {
                op: "Squeeze",
                value: dims[a] as i64,
                reason: format!("cannot squeeze axis {a} of shape {}", x.shape),
            });
        }
    }
    Ok(Shape::new(
        dims.iter()
            .enumerate()
            .filter(|(i, _)| !axes.contains(i))
            .map(|(_, &d)| d)
            .collect(),
    ))
}

pub(crate) fn transpose(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Transpose(attrs) = op else {
        return Err(wrong_op("transpose", op));
    };
    if is_complex(inputs) {
        return complex_passthrough(engine, op, op, inputs);
    }
    let x = &inputs[0];
    let (values, shape) = map_values_shaped!(engine.values(x)?, |d| array::transpose(d, &x.shape, &attrs.perm)?);
    Ok(vec![engine.write(values, shape)?])
}

/// Pair each input's typed slice with its shape.
fn typed_parts<'a, T: 'a>(
    engine: &'a Engine,
    inputs: &'a [TensorInfo],
    shapes: &'a [Shape],
    get: impl Fn(&'a Values) -> Option<&'a [T]>,
) -> Result<Vec<(&'a [T], &'a Shape)>> {
    inputs
        .iter()
        .zip(shapes)
        .map(|(t, shape)| {
            let values = engine.values(t)?;
            let data = get(values).ok_or(Error::DTypeMismatch {
                expected: inputs[0].dtype,
                got: t.dtype,
            })?;
            Ok((data, shape))
        })
        .collect()
}

/// Concatenate `inputs` (read as `shapes`) along `axis`.
fn concat_values(engine: &Engine, inputs: &[TensorInfo], shapes: &[Shape], axis: usize) -> Result<(Values, Shape)> {
    Ok(match inputs[0].dtype {
        DType::F32 => {
            let (d, s) = array::concat(&typed_parts(engine, inputs, shapes, Values::as_f32_slice)?, axis)?;
            (Values::F32(d), s)
        }
        DType::I32 => {
            let (d, s) = array::concat(&typed_parts(engine, inputs, shapes, Values::as_i32_slice)?, axis)?;
            (Values::I32(d), s)
        }
        DType::Bool => {
            let (d, s) = array::concat(&typed_parts(engine, inputs, shapes, Values::as_bool_slice)?, axis)?;
            (Values::Bool(d), s)
        }
        DType::String => {
            let (d, s) = array::concat(&typed_parts(engine, inputs, shapes, Values::as_string_slice)?, axis)?;
            (Values::String(d), s)
        }
        DType::Complex64 => {
            return Err(Error::UnsupportedDType {
                op: "Concat",
                dtype: DType::Complex64,
            })
        }
    })
}

fn check_same_dtype(inputs: &[TensorInfo]) -> Result<()> {
    let first = inputs[0].dtype;
    match inputs.iter().find(|t| t.dtype != first) {
        Some(t) => Err(Error::DTypeMismatch {
            expected: first,
            got: t.dtype,
        }),
        None => Ok(()),
    }
}

pub(crate) fn concat(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Concat(attrs) = op else {
        return Err(wrong_op("concat", op));
    };
    check_same_dtype(inputs)?;
    if is_complex(inputs) {
        return complex_passthrough(engine, op, op, inputs);
    }
    let axis = parse_axis(attrs.axis, inputs[0].rank())?;
    let shapes: Vec<Shape> = inputs.iter().map(|t| t.shape.clone()).collect();
    let (values, shape) = concat_values(engine, inputs, &shapes, axis)?;
    Ok(vec![engine.write(values, shape)?])
}

/// Stack same-shaped tensors along a new `axis`.
pub(crate) fn pack(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Pack(attrs) = op else {
        return Err(wrong_op("pack", op));
    };
    check_same_dtype(inputs)?;
    let first = &inputs[0];
    if let Some(t) = inputs.iter().find(|t| t.shape != first.shape) {
        return Err(Error::ShapeMismatch {
            expected: first.shape.clone(),
            got: t.shape.clone(),
        });
    }
    if is_complex(inputs) {
        return complex_passthrough(engine, op, op, inputs);
    }
    let axis = parse_axis(attrs.axis, first.rank() + 1)?;
    let shapes: Vec<Shape> = inputs.iter().map(|t| t.shape.expand_dims(axis)).collect();
    let (values, shape) = concat_values(engine, inputs, &shapes, axis)?;
    Ok(vec![engine.write(values, shape)?])
}

fn split_values(values: &Values, shape: &Shape, sizes: &[usize], axis: usize) -> Result<Vec<(Values, Shape)>> {
    macro_rules! split_as {
        ($variant:ident, $data:expr) => {
            array::split($data, shape, sizes, axis)?
                .into_iter()
                .map(|(d, s)| (Values::$variant(d), s))
                .collect()
        };
    }
    Ok(match values {
        Values::F32(d) => split_as!(F32, d),
        Values::I32(d) => split_as!(I32, d),
        Values::Bool(d) => split_as!(Bool, d),
        Values::String(d) => split_as!(String, d),
    })
}

pub(crate) fn split(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    if is_complex(inputs) {
        return complex_passthrough(engine, op, op, inputs);
    }
    let x = &inputs[0];
    let (sizes, axis, drop_axis) = match op {
        Op::Split(attrs) => (attrs.sizes.clone(), parse_axis(attrs.axis, x.rank())?, false),
        Op::Unpack(attrs) => {
            let axis = parse_axis(attrs.axis, x.rank())?;
            (vec![1; x.shape.dim(axis)?], axis, true)
        }
        _ => return Err(wrong_op("split", op)),
    };
    let pieces = split_values(engine.values(x)?, &x.shape, &sizes, axis)?;
    let mut outputs = Vec::with_capacity(pieces.len());
    for (values, shape) in pieces {
        let shape = if drop_axis {
            let mut dims = shape.into_dims();
            dims.remove(axis);
            Shape::new(dims)
        } else {
            shape
        };
        match engine.write(values, shape) {
            Ok(t) => outputs.push(t),
            Err(e) => {
                engine.dispose_all(&outputs)?;
                return Err(e);
            }
        }
    }
    Ok(outputs)
}

pub(crate) fn slice(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Slice(attrs) = op else {
        return Err(wrong_op("slice", op));
    };
    if is_complex(inputs) {
        return complex_passthrough(engine, op, op, inputs);
    }
    let x = &inputs[0];
    let size = array::resolve_slice(&x.shape, &attrs.begin, &attrs.size)?;
    let values = map_values!(engine.values(x)?, |d| array::slice(d, &x.shape, &attrs.begin, &size)?);
    Ok(vec![engine.write(values, Shape::new(size))?])
}

pub(crate) fn pad(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Pad(attrs) = op else {
        return Err(wrong_op("pad", op));
    };
    if is_complex(inputs) {
        let im_op = Op::Pad(PadAttrs {
            paddings: attrs.paddings.clone(),
            constant: 0.0,
        });
        return complex_passthrough(engine, op, &im_op, inputs);
    }
    let x = &inputs[0];
    let c = attrs.constant;
    let (values, shape) = match engine.values(x)? {
        Values::F32(d) => {
            let (d, s) = array::pad(d, &x.shape, &attrs.paddings, c)?;
            (Values::F32(d), s)
        }
        Values::I32(d) => {
            let (d, s) = array::pad(d, &x.shape, &attrs.paddings, c as i32)?;
            (Values::I32(d), s)
        }
        Values::Bool(d) => {
            let (d, s) = array::pad(d, &x.shape, &attrs.paddings, c != 0.0)?;
            (Values::Bool(d), s)
        }
        Values::String(d) => {
            let (d, s) = array::pad(d, &x.shape, &attrs.paddings, Vec::new())?;
            (Values::String(d), s)
        }
    };
    Ok(vec![engine.write(values, shape)?])
}

pub(crate) fn tile(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Tile(attrs) = op else {
        return Err(wrong_op("tile", op));
    };
    if is_complex(inputs) {
        return complex_passthrough(engine, op, op, inputs);
    }
    let x = &inputs[0];
    let (values, shape) = map_values_shaped!(engine.values(x)?, |d| array::tile(d, &x.shape, &attrs.reps)?);
    Ok(vec![engine.write(values, shape)?])
}

pub(crate) fn reverse(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Reverse(attrs) = op else {
        return Err(wrong_op("reverse", op));
    };
    if is_complex(inputs) {
        return complex_passthrough(engine, op, op, inputs);
    }
    let x = &inputs[0];
    let axes = parse_axes(&attrs.axes, x.rank())?;
    let values = map_values!(engine.values(x)?, |d| array::reverse(d, &x.shape, &axes));
    Ok(vec![engine.write(values, x.shape.clone())?])
}

pub(crate) fn broadcast_to(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::BroadcastTo(attrs) = op else {
        return Err(wrong_op("broadcast_to", op));
    };
    if is_complex(inputs) {
        return complex_passthrough(engine, op, op, inputs);
    }
    let x = &inputs[0];
    let target = Shape::new(attrs.shape.clone());
    let values = map_values!(engine.values(x)?, |d| array::broadcast_to(d, &x.shape, &target)?);
    Ok(vec![engine.write(values, target)?])
}

/// Fill, Range, OneHot, ZerosLike, OnesLike.
pub(crate) fn generate(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let out = match op {
        Op::Fill(attrs) => {
            let shape = Shape::new(attrs.shape.clone());
            let n = shape.elem_count();
            let values = match attrs.dtype {
                DType::F32 => Values::F32(vec![attrs.value; n]),
                DType::I32 => Values::I32(vec![attrs.value as i32; n]),
                DType::Bool => Values::Bool(vec![attrs.value != 0.0; n]),
                other => return Err(Error::UnsupportedDType { op: "Fill", dtype: other }),
            };
            engine.write(values, shape)?
        }
        Op::Range(attrs) => {
            let data = array::range(attrs.start, attrs.stop, attrs.step)?;
            let shape = Shape::from(data.len());
            let values = match attrs.dtype {
                DType::F32 => Values::F32(data),
                DType::I32 => Values::I32(data.into_iter().map(|v| v as i32).collect()),
                other => return Err(Error::UnsupportedDType { op: "Range", dtype: other }),
            };
            engine.write(values, shape)?
        }
        Op::OneHot(attrs) => {
            let indices = &inputs[0];
            let idx = engine.values(indices)?.to_i32_vec()?;
            let data = array::one_hot(&idx, attrs.depth, attrs.on_value, attrs.off_value);
            let mut dims = indices.dims().to_vec();
            dims.push(attrs.depth);
            engine.write_f32(data, Shape::new(dims))?
        }
        Op::ZerosLike | Op::OnesLike => {
            let x = &inputs[0];
            let one = matches!(op, Op::OnesLike);
            let n = x.elem_count();
            let shape = x.shape.clone();
            let values = match x.dtype {
                DType::Complex64 => {
                    let re = vec![if one { 1.0 } else { 0.0 }; n];
                    return Ok(vec![engine.write_complex(re, vec![0.0; n], shape)?]);
                }
                DType::F32 if one => Values::F32(vec![1.0; n]),
                DType::I32 if one => Values::I32(vec![1; n]),
                DType::Bool if one => Values::Bool(vec![true; n]),
                DType::String if one => {
                    return Err(Error::UnsupportedDType {
                        op: "OnesLike",
                        dtype: DType::String,
                    })
                }
                dtype => Values::zeros(dtype, n)?,
            };
            engine.write(values, shape)?
        }
        _ => return Err(wrong_op("generate", op)),
    };
    Ok(vec![out])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{
        AxisAttrs, BroadcastToAttrs, FillAttrs, OneHotAttrs, RangeAttrs, ReshapeAttrs, ReverseAttrs, SliceAttrs,
        SplitAttrs, SqueezeAttrs, TileAttrs, TransposeAttrs,
    };

    #[test]
    fn test_reshape_infers_and_aliases() {
        let mut e = Engine::default();
        let x = e.tensor_f32(vec![1.0; 6], (2, 3)).unwrap();
        let y = e
            .execute_one(&Op::Reshape(ReshapeAttrs { shape: vec![3, -1] }), &[x.clone()])
            .unwrap();
        assert_eq!(y.dims(), &[3, 2]);
        assert_eq!(y.id, x.id);
        assert!(e
            .execute(&Op::Reshape(ReshapeAttrs { shape: vec![-1, -1] }), &[x.clone()])
            .is_err());
        assert!(e
            .execute(&Op::Reshape(ReshapeAttrs { shape: vec![4, -1] }), &[x])
            .is_err());
    }

    #[test]
    fn test_expand_and_squeeze() {
        let mut e = Engine::default();
        let x = e.tensor_i32(vec![1, 2, 3], 3).unwrap();
        let y = e.execute_one(&Op::ExpandDims(AxisAttrs { axis: -1 }), &[x]).unwrap();
        assert_eq!(y.dims(), &[3, 1]);
        let z = e.execute_one(&Op::Squeeze(SqueezeAttrs::default()), &[y.clone()]).unwrap();
        assert_eq!(z.dims(), &[3]);
        let err = e.execute(&Op::Squeeze(SqueezeAttrs { axes: vec![0] }), &[y]);
        assert!(matches!(err, Err(Error::InvalidSize { .. })));
    }

    #[test]
    fn test_transpose_complex() {
        let mut e = Engine::default();
        let c = e
            .write_complex(vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0], Shape::from((2, 2)))
            .unwrap();
        let t = e
            .execute_one(&Op::Transpose(TransposeAttrs { perm: vec![1, 0] }), &[c])
            .unwrap();
        assert_eq!(t.dtype, DType::Complex64);
        assert_eq!(
            e.read_complex(&t).unwrap(),
            (vec![1.0, 3.0, 2.0, 4.0], vec![5.0, 7.0, 6.0, 8.0])
        );
    }

    #[test]
    fn test_concat_rejects_mixed_dtypes() {
        let mut e = Engine::default();
        let a = e.tensor_f32(vec![1.0], 1).unwrap();
        let b = e.tensor_i32(vec![1], 1).unwrap();
        let err = e.execute(&Op::Concat(AxisAttrs { axis: 0 }), &[a, b]);
        assert!(matches!(err, Err(Error::DTypeMismatch { .. })));
    }

    #[test]
    fn test_pack_unpack() {
        let mut e = Engine::default();
        let a = e.tensor_i32(vec![1, 2], 2).unwrap();
        let b = e.tensor_i32(vec![3, 4], 2).unwrap();
        let p = e.execute_one(&Op::Pack(AxisAttrs { axis: 1 }), &[a, b]).unwrap();
        assert_eq!(p.dims(), &[2, 2]);
        assert_eq!(e.read_i32(&p).unwrap(), vec![1, 3, 2, 4]);
        let parts = e.execute(&Op::Unpack(AxisAttrs { axis: 0 }), &[p]).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].dims(), &[2]);
        assert_eq!(e.read_i32(&parts[1]).unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_split_sizes() {
        let mut e = Engine::default();
        let x = e.tensor_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0], 5).unwrap();
        let parts = e
            .execute(&Op::Split(SplitAttrs { sizes: vec![2, 3], axis: 0 }), &[x])
            .unwrap();
        assert_eq!(e.read_f32(&parts[0]).unwrap(), vec![1.0, 2.0]);
        assert_eq!(e.read_f32(&parts[1]).unwrap(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_slice_to_end() {
        let mut e = Engine::default();
        let x = e.tensor_i32((0..6).collect(), (2, 3)).unwrap();
        let op = Op::Slice(SliceAttrs {
            begin: vec![0, 1],
            size: vec![-1, 2],
        });
        let y = e.execute_one(&op, &[x]).unwrap();
        assert_eq!(y.dims(), &[2, 2]);
        assert_eq!(e.read_i32(&y).unwrap(), vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_pad_complex_imag_is_zero() {
        let mut e = Engine::default();
        let c = e.write_complex(vec![1.0], vec![2.0], Shape::from(1)).unwrap();
        let op = Op::Pad(PadAttrs {
            paddings: vec![[1, 1]],
            constant: 9.0,
        });
        let p = e.execute_one(&op, &[c]).unwrap();
        assert_eq!(
            e.read_complex(&p).unwrap(),
            (vec![9.0, 1.0, 9.0], vec![0.0, 2.0, 0.0])
        );
    }

    #[test]
    fn test_tile_reverse_broadcast() {
        let mut e = Engine::default();
        let x = e.tensor_i32(vec![1, 2], 2).unwrap();
        let t = e.execute_one(&Op::Tile(TileAttrs { reps: vec![2] }), &[x.clone()]).unwrap();
        assert_eq!(e.read_i32(&t).unwrap(), vec![1, 2, 1, 2]);
        let r = e.execute_one(&Op::Reverse(ReverseAttrs { axes: vec![0] }), &[x.clone()]).unwrap();
        assert_eq!(e.read_i32(&r).unwrap(), vec![2, 1]);
        let b = e
            .execute_one(&Op::BroadcastTo(BroadcastToAttrs { shape: vec![2, 2] }), &[x])
            .unwrap();
        assert_eq!(e.read_i32(&b).unwrap(), vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_generators() {
        let mut e = Engine::default();
        let f = e
            .execute_one(
                &Op::Fill(FillAttrs {
                    shape: vec![2],
                    value: 3.0,
                    dtype: DType::I32,
                }),
                &[],
            )
            .unwrap();
        assert_eq!(e.read_i32(&f).unwrap(), vec![3, 3]);
        let r = e
            .execute_one(
                &Op::Range(RangeAttrs {
                    start: 0.0,
                    stop: 1.0,
                    step: 0.25,
                    dtype: DType::F32,
                }),
                &[],
            )
            .unwrap();
        assert_eq!(e.read_f32(&r).unwrap(), vec![0.0, 0.25, 0.5, 0.75]);
        let idx = e.tensor_i32(vec![0, 2], 2).unwrap();
        let oh = e
            .execute_one(
                &Op::OneHot(OneHotAttrs {
                    depth: 3,
                    on_value: 1.0,
                    off_value: 0.0,
                }),
                &[idx.clone()],
            )
            .unwrap();
        assert_eq!(oh.dims(), &[2, 3]);
        assert_eq!(e.read_f32(&oh).unwrap(), vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        let ones = e.execute_one(&Op::OnesLike, &[idx]).unwrap();
        assert_eq!(e.read_i32(&ones).unwrap(), vec![1, 1]);
    }
}
