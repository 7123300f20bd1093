// Element-wise kernels: binary arithmetic, comparison, logic, unary math,
// casts, select and the complex constructors/accessors.
//
// Binary operands are promoted with `DType::upcast` and computed in the
// promoted type: i32 natively, f32 otherwise. Ops that only make sense for
// floats (RealDiv, Atan2) always compute in f32. If either side is complex
// the complex template runs over split real/imaginary planes.

use num_complex::Complex32;
use vole_core::{DType, Error, Result, TensorInfo, Values};
use vole_cpu::binary::{self, broadcast_binary, broadcast_complex_binary};
use vole_cpu::{BinaryOp, UnaryOp};

use super::{expect_dtype, wrong_op};
use crate::engine::Engine;
use crate::op::Op;

/// Same dtype stays as is; otherwise the promoted dtype.
fn common_dtype(a: DType, b: DType) -> Result<DType> {
    if a == b {
        Ok(a)
    } else {
        DType::upcast(a, b)
    }
}

pub(crate) fn binary(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Binary(bop) = op else {
        return Err(wrong_op("binary", op));
    };
    let (a, b) = (&inputs[0], &inputs[1]);
    let mut dtype = DType::upcast(a.dtype, b.dtype)?;
    if dtype == DType::Complex64 {
        return complex_binary(engine, *bop, a, b);
    }
    if bop.is_float_only() {
        dtype = DType::F32;
    }
    let out = match dtype {
        DType::I32 => {
            let x = engine.values(a)?.to_i32_vec()?;
            let y = engine.values(b)?.to_i32_vec()?;
            let (data, shape) = broadcast_binary(&x, &a.shape, &y, &b.shape, |p, q| bop.apply_i32(p, q))?;
            engine.write_i32(data, shape)?
        }
        DType::F32 => {
            let x = engine.values(a)?.to_f32_vec()?;
            let y = engine.values(b)?.to_f32_vec()?;
            let (data, shape) = broadcast_binary(&x, &a.shape, &y, &b.shape, |p, q| bop.apply_f32(p, q))?;
            engine.write_f32(data, shape)?
        }
        other => {
            return Err(Error::UnsupportedDType {
                op: bop.name(),
                dtype: other,
            })
        }
    };
    Ok(vec![out])
}

fn complex_binary(engine: &mut Engine, bop: BinaryOp, a: &TensorInfo, b: &TensorInfo) -> Result<Vec<TensorInfo>> {
    if bop.apply_complex(Complex32::default(), Complex32::default()).is_none() {
        return Err(Error::UnsupportedDType {
            op: bop.name(),
            dtype: DType::Complex64,
        });
    }
    let (ar, ai) = engine.read_complex(a)?;
    let (br, bi) = engine.read_complex(b)?;
    let (re, im, shape) = broadcast_complex_binary((&ar, &ai), &a.shape, (&br, &bi), &b.shape, |x, y| {
        bop.apply_complex(x, y).unwrap_or(x)
    })?;
    Ok(vec![engine.write_complex(re, im, shape)?])
}

pub(crate) fn compare(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Compare(cmp) = op else {
        return Err(wrong_op("compare", op));
    };
    let (a, b) = (&inputs[0], &inputs[1]);
    let dtype = common_dtype(a.dtype, b.dtype)?;
    let (data, shape) = match dtype {
        DType::I32 | DType::Bool => {
            let x = engine.values(a)?.to_i32_vec()?;
            let y = engine.values(b)?.to_i32_vec()?;
            broadcast_binary(&x, &a.shape, &y, &b.shape, |p, q| cmp.apply(p, q))?
        }
        DType::F32 => {
            let x = engine.values(a)?.to_f32_vec()?;
            let y = engine.values(b)?.to_f32_vec()?;
            broadcast_binary(&x, &a.shape, &y, &b.shape, |p, q| cmp.apply(p, q))?
        }
        other => {
            return Err(Error::UnsupportedDType {
                op: cmp.name(),
                dtype: other,
            })
        }
    };
    Ok(vec![engine.write(Values::Bool(data), shape)?])
}

pub(crate) fn logical(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let out = match op {
        Op::Logical(lop) => {
            let (a, b) = (&inputs[0], &inputs[1]);
            let x = engine.values(a)?.to_bool_vec()?;
            let y = engine.values(b)?.to_bool_vec()?;
            let (data, shape) = broadcast_binary(&x, &a.shape, &y, &b.shape, |p, q| lop.apply(p, q))?;
            engine.write(Values::Bool(data), shape)?
        }
        Op::LogicalNot => {
            let x = &inputs[0];
            let data = engine.values(x)?.to_bool_vec()?.into_iter().map(|v| !v).collect();
            engine.write(Values::Bool(data), x.shape.clone())?
        }
        _ => return Err(wrong_op("logical", op)),
    };
    Ok(vec![out])
}

/// `x < 0 ? x * alpha : x`, with `alpha` broadcast against `x`.
pub(crate) fn prelu(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    if !matches!(op, Op::Prelu) {
        return Err(wrong_op("prelu", op));
    }
    let (x, alpha) = (&inputs[0], &inputs[1]);
    let xv = engine.values(x)?.to_f32_vec()?;
    let av = engine.values(alpha)?.to_f32_vec()?;
    let (data, shape) = broadcast_binary(&xv, &x.shape, &av, &alpha.shape, |v, a| if v < 0.0 { v * a } else { v })?;
    Ok(vec![engine.write_f32(data, shape)?])
}

pub(crate) fn unary(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Unary(uop) = op else {
        return Err(wrong_op("unary", op));
    };
    let x = &inputs[0];
    if x.dtype == DType::Complex64 && *uop == UnaryOp::Abs {
        return complex_abs(engine, &Op::ComplexAbs, inputs);
    }
    expect_dtype(uop.name(), x, &[DType::F32, DType::I32, DType::Bool])?;
    let values = match engine.values(x)? {
        Values::I32(v) if uop.preserves_int() => Values::I32(v.iter().map(|&e| uop.apply_i32(e)).collect()),
        other => Values::F32(other.to_f32_vec()?.into_iter().map(|e| uop.apply_f32(e)).collect()),
    };
    Ok(vec![engine.write(values, x.shape.clone())?])
}

pub(crate) fn predicate(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Predicate(pred) = op else {
        return Err(wrong_op("predicate", op));
    };
    let x = &inputs[0];
    let data = engine
        .values(x)?
        .to_f32_vec()?
        .into_iter()
        .map(|v| pred.apply(v))
        .collect();
    Ok(vec![engine.write(Values::Bool(data), x.shape.clone())?])
}

/// Numeric -> bool is `v != 0`; complex -> real keeps the real part.
pub(crate) fn cast(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Cast(attrs) = op else {
        return Err(wrong_op("cast", op));
    };
    let x = &inputs[0];
    let shape = x.shape.clone();
    if x.dtype == attrs.dtype {
        return Ok(vec![engine.alias(x, shape)?]);
    }
    if attrs.dtype == DType::Complex64 {
        let re = engine.values(x)?.to_f32_vec()?;
        let im = vec![0.0; re.len()];
        return Ok(vec![engine.write_complex(re, im, shape)?]);
    }
    let source = if x.dtype == DType::Complex64 {
        engine.parts(x)?.0
    } else {
        x.clone()
    };
    let values = engine.values(&source)?;
    let out = match attrs.dtype {
        DType::F32 => Values::F32(values.to_f32_vec()?),
        DType::I32 => Values::I32(values.to_i32_vec()?),
        DType::Bool => Values::Bool(values.to_bool_vec()?),
        other => {
            return Err(Error::UnsupportedDType {
                op: "Cast",
                dtype: other,
            })
        }
    };
    Ok(vec![engine.write(out, shape)?])
}

/// `cond ? a : b`. `cond` is either the full shape, a scalar, or a vector
/// over the leading dimension.
pub(crate) fn select(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    if !matches!(op, Op::Select) {
        return Err(wrong_op("select", op));
    }
    let (c, a, b) = (&inputs[0], &inputs[1], &inputs[2]);
    if a.shape != b.shape {
        return Err(Error::ShapeMismatch {
            expected: a.shape.clone(),
            got: b.shape.clone(),
        });
    }
    let cond = engine.values(c)?.to_bool_vec()?;
    let dtype = common_dtype(a.dtype, b.dtype)?;
    let (va, vb) = (engine.values(a)?, engine.values(b)?);
    let values = match dtype {
        DType::F32 => Values::F32(binary::select(&cond, &c.shape, &va.to_f32_vec()?, &vb.to_f32_vec()?, &a.shape)?),
        DType::I32 => Values::I32(binary::select(&cond, &c.shape, &va.to_i32_vec()?, &vb.to_i32_vec()?, &a.shape)?),
        DType::Bool => Values::Bool(binary::select(&cond, &c.shape, &va.to_bool_vec()?, &vb.to_bool_vec()?, &a.shape)?),
        DType::String => match (va, vb) {
            (Values::String(x), Values::String(y)) => Values::String(binary::select(&cond, &c.shape, x, y, &a.shape)?),
            (x, y) => {
                return Err(Error::DTypeMismatch {
                    expected: x.dtype(),
                    got: y.dtype(),
                })
            }
        },
        DType::Complex64 => {
            return Err(Error::UnsupportedDType {
                op: "Select",
                dtype: DType::Complex64,
            })
        }
    };
    Ok(vec![engine.write(values, a.shape.clone())?])
}

pub(crate) fn complex(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    if !matches!(op, Op::Complex) {
        return Err(wrong_op("complex", op));
    }
    let (re, im) = (&inputs[0], &inputs[1]);
    if re.shape != im.shape {
        return Err(Error::ShapeMismatch {
            expected: re.shape.clone(),
            got: im.shape.clone(),
        });
    }
    let r = engine.values(re)?.to_f32_vec()?;
    let i = engine.values(im)?.to_f32_vec()?;
    Ok(vec![engine.write_complex(r, i, re.shape.clone())?])
}

/// `Real` and `Imag`. On a real tensor, `Real` is the identity (as f32)
/// and `Imag` is zeros.
pub(crate) fn complex_part(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let x = &inputs[0];
    let take_real = match op {
        Op::Real => true,
        Op::Imag => false,
        _ => return Err(wrong_op("complex part", op)),
    };
    let out = if x.dtype == DType::Complex64 {
        let (re, im) = engine.parts(x)?;
        let part = if take_real { re } else { im };
        engine.alias(&part, x.shape.clone())?
    } else if take_real {
        let data = engine.values(x)?.to_f32_vec()?;
        engine.write_f32(data, x.shape.clone())?
    } else {
        engine.write_f32(vec![0.0; x.elem_count()], x.shape.clone())?
    };
    Ok(vec![out])
}

pub(crate) fn complex_abs(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    if !matches!(op, Op::ComplexAbs) {
        return Err(wrong_op("complex abs", op));
    }
    let x = &inputs[0];
    let (re, im) = engine.read_complex(x)?;
    let data = re.iter().zip(&im).map(|(r, i)| r.hypot(*i)).collect();
    Ok(vec![engine.write_f32(data, x.shape.clone())?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use vole_cpu::{CmpOp, LogicalOp};

    use vole_core::Shape;

    use crate::op::CastAttrs;

    fn run(engine: &mut Engine, op: Op, inputs: &[TensorInfo]) -> TensorInfo {
        engine.execute_one(&op, inputs).unwrap()
    }

    #[test]
    fn test_int_arithmetic_stays_int() {
        let mut e = Engine::default();
        let a = e.tensor_i32(vec![-7, 7], 2).unwrap();
        let b = e.tensor_i32(vec![2, -2], 2).unwrap();
        let q = run(&mut e, Op::Binary(BinaryOp::FloorDiv), &[a.clone(), b.clone()]);
        let m = run(&mut e, Op::Binary(BinaryOp::Mod), &[a, b]);
        assert_eq!(q.dtype, DType::I32);
        assert_eq!(e.read_i32(&q).unwrap(), vec![-4, -4]);
        assert_eq!(e.read_i32(&m).unwrap(), vec![1, -1]);
    }

    #[test]
    fn test_mixed_dtypes_promote() {
        let mut e = Engine::default();
        let a = e.tensor_i32(vec![1, 2], 2).unwrap();
        let b = e.tensor_f32(vec![0.5], 1).unwrap();
        let c = run(&mut e, Op::Binary(BinaryOp::Add), &[a.clone(), b]);
        assert_eq!(c.dtype, DType::F32);
        assert_eq!(e.read_f32(&c).unwrap(), vec![1.5, 2.5]);

        let t = e.tensor_bool(vec![true, false], 2).unwrap();
        let s = run(&mut e, Op::Binary(BinaryOp::Add), &[t.clone(), t]);
        assert_eq!(s.dtype, DType::I32);
        assert_eq!(e.read_i32(&s).unwrap(), vec![2, 0]);

        let d = run(&mut e, Op::Binary(BinaryOp::RealDiv), &[a.clone(), a]);
        assert_eq!(d.dtype, DType::F32);
    }

    #[test]
    fn test_complex_multiply() {
        let mut e = Engine::default();
        let a = e.write_complex(vec![1.0], vec![2.0], Shape::from(1)).unwrap();
        let b = e.write_complex(vec![3.0], vec![-1.0], Shape::from(1)).unwrap();
        let c = run(&mut e, Op::Binary(BinaryOp::Mul), &[a, b]);
        assert_eq!(c.dtype, DType::Complex64);
        assert_eq!(e.read_complex(&c).unwrap(), (vec![5.0], vec![5.0]));
    }

    #[test]
    fn test_complex_rejects_floor_div() {
        let mut e = Engine::default();
        let a = e.write_complex(vec![1.0], vec![2.0], Shape::from(1)).unwrap();
        let err = e.execute(&Op::Binary(BinaryOp::FloorDiv), &[a.clone(), a]);
        assert!(matches!(err, Err(Error::UnsupportedDType { .. })));
    }

    #[test]
    fn test_compare_and_logical() {
        let mut e = Engine::default();
        let a = e.tensor_f32(vec![1.0, 2.0, 3.0], 3).unwrap();
        let b = e.tensor_f32(vec![2.0], 1).unwrap();
        let lt = run(&mut e, Op::Compare(CmpOp::Less), &[a.clone(), b.clone()]);
        let ge = run(&mut e, Op::Compare(CmpOp::GreaterEqual), &[a, b]);
        assert_eq!(e.read_bool(&lt).unwrap(), vec![true, false, false]);
        let or = run(&mut e, Op::Logical(LogicalOp::Or), &[lt.clone(), ge]);
        assert_eq!(e.read_bool(&or).unwrap(), vec![true, true, true]);
        let not = run(&mut e, Op::LogicalNot, &[lt]);
        assert_eq!(e.read_bool(&not).unwrap(), vec![false, true, true]);
    }

    #[test]
    fn test_unary_int_and_float() {
        let mut e = Engine::default();
        let a = e.tensor_i32(vec![-3, 4], 2).unwrap();
        let abs = run(&mut e, Op::Unary(UnaryOp::Abs), &[a.clone()]);
        assert_eq!(abs.dtype, DType::I32);
        assert_eq!(e.read_i32(&abs).unwrap(), vec![3, 4]);
        let sq = run(&mut e, Op::Unary(UnaryOp::Sqrt), &[abs]);
        assert_eq!(sq.dtype, DType::F32);
        assert!((e.read_f32(&sq).unwrap()[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cast_to_bool() {
        let mut e = Engine::default();
        let a = e.tensor_f32(vec![0.0, -0.5, 2.0], 3).unwrap();
        let b = run(&mut e, Op::Cast(CastAttrs { dtype: DType::Bool }), &[a]);
        assert_eq!(e.read_bool(&b).unwrap(), vec![false, true, true]);
    }

    #[test]
    fn test_select_with_scalar_condition() {
        let mut e = Engine::default();
        let c = e.tensor_bool(vec![false], ()).unwrap();
        let a = e.tensor_i32(vec![1, 2], 2).unwrap();
        let b = e.tensor_i32(vec![3, 4], 2).unwrap();
        let out = run(&mut e, Op::Select, &[c, a.clone(), b.clone()]);
        assert_eq!(out.dims(), &[2]);
        assert_eq!(e.read_i32(&out).unwrap(), vec![3, 4]);
        let c = e.tensor_bool(vec![true], ()).unwrap();
        let out = run(&mut e, Op::Select, &[c, a, b]);
        assert_eq!(e.read_i32(&out).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_real_imag_abs() {
        let mut e = Engine::default();
        let c = e.write_complex(vec![3.0, 0.0], vec![4.0, -2.0], Shape::from(2)).unwrap();
        let re = run(&mut e, Op::Real, &[c.clone()]);
        let im = run(&mut e, Op::Imag, &[c.clone()]);
        let abs = run(&mut e, Op::ComplexAbs, &[c.clone()]);
        assert_eq!(e.read_f32(&re).unwrap(), vec![3.0, 0.0]);
        assert_eq!(e.read_f32(&im).unwrap(), vec![4.0, -2.0]);
        assert_eq!(e.read_f32(&abs).unwrap(), vec![5.0, 2.0]);
        for t in [re, im, abs, c] {
            e.dispose(&t).unwrap();
        }
        assert_eq!(e.num_data_ids(), 0);
    }
}
