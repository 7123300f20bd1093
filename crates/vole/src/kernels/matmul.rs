// Matrix multiply, fused ops and batch normalization
//
// BatchMatMul collapses both operands to `[batch, rows, cols]`. Leading
// dims broadcast: if one side has a single matrix it is reused directly,
// otherwise both sides are materialized to the full broadcast batch shape
// before the blocked multiply.
//
// The fused ops run their core op, then add the bias and apply the
// activation as separate steps over engine tensors, disposing each
// intermediate as soon as the next step has consumed it.

use vole_core::{DType, Error, Result, Shape, TensorInfo, Values};
use vole_cpu::array;
use vole_cpu::matmul::{batch_matmul, MatMulDims};
use vole_cpu::norm::batch_norm;
use vole_cpu::{Activation, BinaryOp};

use super::wrong_op;
use crate::engine::Engine;
use crate::op::{MatMulAttrs, Op};

fn matrix_dims<'a>(op: &'static str, t: &'a TensorInfo) -> Result<(&'a [usize], usize, usize)> {
    let dims = t.dims();
    if dims.len() < 2 {
        return Err(Error::RankMismatch {
            op,
            expected: 2,
            got: dims.len(),
        });
    }
    let r = dims.len();
    Ok((&dims[..r - 2], dims[r - 2], dims[r - 1]))
}

fn expand_batch(data: &[f32], shape: &Shape, lead: &Shape, rows: usize, cols: usize) -> Result<Vec<f32>> {
    let mut target = lead.dims().to_vec();
    target.extend_from_slice(&[rows, cols]);
    array::broadcast_to(data, shape, &Shape::new(target))
}

fn matmul(engine: &Engine, attrs: MatMulAttrs, a: &TensorInfo, b: &TensorInfo) -> Result<(Vec<f32>, Shape)> {
    let (a_lead, a_rows, a_cols) = matrix_dims("BatchMatMul", a)?;
    let (b_lead, b_rows, b_cols) = matrix_dims("BatchMatMul", b)?;
    let (m, k1) = if attrs.transpose_a { (a_cols, a_rows) } else { (a_rows, a_cols) };
    let (k2, n) = if attrs.transpose_b { (b_cols, b_rows) } else { (b_rows, b_cols) };
    if k1 != k2 {
        return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
    }

    let a_lead_shape = Shape::from(a_lead);
    let b_lead_shape = Shape::from(b_lead);
    let lead = Shape::broadcast_shape(&a_lead_shape, &b_lead_shape)?;
    let mut a_data = engine.values(a)?.to_f32_vec()?;
    let mut b_data = engine.values(b)?.to_f32_vec()?;
    let mut a_batch = a_lead_shape.elem_count();
    let mut b_batch = b_lead_shape.elem_count();
    // A side with a single matrix is reused as is; any other side whose
    // leading dims differ from the broadcast batch is expanded to it.
    if a_batch != 1 && a_lead_shape != lead {
        a_data = expand_batch(&a_data, &a.shape, &lead, a_rows, a_cols)?;
        a_batch = lead.elem_count();
    }
    if b_batch != 1 && b_lead_shape != lead {
        b_data = expand_batch(&b_data, &b.shape, &lead, b_rows, b_cols)?;
        b_batch = lead.elem_count();
    }

    let dims = MatMulDims {
        a_batch,
        b_batch,
        m,
        k: k1,
        n,
        transpose_a: attrs.transpose_a,
        transpose_b: attrs.transpose_b,
    };
    let config = engine.config();
    let out = batch_matmul(&a_data, &b_data, &dims, config.matmul_block_size, config.parallel);
    let mut out_dims = lead.into_dims();
    out_dims.extend_from_slice(&[m, n]);
    Ok((out, Shape::new(out_dims)))
}

pub(crate) fn batch_matmul_kernel(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::BatchMatMul(attrs) = op else {
        return Err(wrong_op("batch_matmul", op));
    };
    let (a, b) = (&inputs[0], &inputs[1]);
    let (data, shape) = matmul(engine, *attrs, a, b)?;
    let values = if a.dtype == DType::I32 && b.dtype == DType::I32 {
        Values::I32(data.into_iter().map(|v| v as i32).collect())
    } else {
        Values::F32(data)
    };
    Ok(vec![engine.write(values, shape)?])
}

/// Bias add and activation on top of an already computed `core` tensor.
/// Consumes `core`; every replaced intermediate is disposed.
fn fused_tail(
    engine: &mut Engine,
    core: TensorInfo,
    bias: Option<&TensorInfo>,
    activation: Activation,
    prelu_weights: Option<&TensorInfo>,
) -> Result<TensorInfo> {
    let mut current = core;
    if let Some(bias) = bias {
        let biased = engine.execute_one(&Op::Binary(BinaryOp::Add), &[current.clone(), bias.clone()]);
        engine.dispose(&current)?;
        current = biased?;
    }
    if activation == Activation::Linear {
        return Ok(current);
    }
    let mut data = engine.read_f32(&current)?;
    match (activation, prelu_weights) {
        (Activation::Prelu, Some(w)) => Activation::apply_prelu(&mut data, &engine.read_f32(w)?),
        (Activation::Prelu, None) => {
            engine.dispose(&current)?;
            return Err(Error::msg("prelu activation requires prelu weights"));
        }
        (act, _) => act.apply(&mut data),
    }
    let activated = engine.write_f32(data, current.shape.clone());
    engine.dispose(&current)?;
    activated
}

/// Split the optional trailing inputs `[bias], [prelu_weights]`.
fn extras(inputs: &[TensorInfo], has_bias: bool) -> (Option<&TensorInfo>, Option<&TensorInfo>) {
    let rest = &inputs[2..];
    if has_bias {
        (rest.first(), rest.get(1))
    } else {
        (None, rest.first())
    }
}

pub(crate) fn fused_matmul(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::FusedMatMul(attrs) = op else {
        return Err(wrong_op("fused_matmul", op));
    };
    let core_op = Op::BatchMatMul(MatMulAttrs {
        transpose_a: attrs.transpose_a,
        transpose_b: attrs.transpose_b,
    });
    let core = engine.execute_one(&core_op, &inputs[..2])?;
    let (bias, prelu) = extras(inputs, attrs.has_bias);
    Ok(vec![fused_tail(engine, core, bias, attrs.activation, prelu)?])
}

pub(crate) fn fused_conv2d(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let (attrs, core_op) = match op {
        Op::FusedConv2d(attrs) => (attrs, Op::Conv2d(attrs.conv.clone())),
        Op::FusedDepthwiseConv2d(attrs) => (attrs, Op::DepthwiseConv2d(attrs.conv.clone())),
        _ => return Err(wrong_op("fused_conv2d", op)),
    };
    let core = engine.execute_one(&core_op, &inputs[..2])?;
    let (bias, prelu) = extras(inputs, attrs.has_bias);
    Ok(vec![fused_tail(engine, core, bias, attrs.activation, prelu)?])
}

/// `offset + (x - mean) * scale / sqrt(variance + epsilon)`.
pub(crate) fn fused_batch_norm(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::FusedBatchNorm(attrs) = op else {
        return Err(wrong_op("fused_batch_norm", op));
    };
    let read = |t: &TensorInfo| engine.values(t)?.to_f32_vec();
    let x = read(&inputs[0])?;
    let mean = read(&inputs[1])?;
    let variance = read(&inputs[2])?;
    let mut rest = inputs[3..].iter();
    let offset = if attrs.has_offset { rest.next().map(read).transpose()? } else { None };
    let scale = if attrs.has_scale { rest.next().map(read).transpose()? } else { None };
    let out = batch_norm(
        &x,
        &mean,
        &variance,
        offset.as_deref(),
        scale.as_deref(),
        attrs.epsilon,
    );
    Ok(vec![engine.write_f32(out, inputs[0].shape.clone())?])
}
