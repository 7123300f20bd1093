// Convolution and pooling kernels
//
// vole-cpu computes everything channels-last (NHWC / NDHWC) with HWIO
// filters. A channels-first Conv2d input is transposed to NHWC on the way
// in and the result transposed back to NCHW on the way out.

use vole_core::conv::{compute_conv2d_info, compute_conv3d_info, compute_pool2d_info, compute_pool3d_info};
use vole_core::{ConvInfo, DataFormat, Error, Result, Shape, TensorInfo};
use vole_cpu::{array, conv, pool};

use super::wrong_op;
use crate::engine::Engine;
use crate::op::{Conv2dAttrs, Op, Pool2dAttrs};

const NCHW_TO_NHWC: [usize; 4] = [0, 2, 3, 1];
const NHWC_TO_NCHW: [usize; 4] = [0, 3, 1, 2];

fn read_f32(engine: &Engine, t: &TensorInfo) -> Result<Vec<f32>> {
    engine.values(t)?.to_f32_vec()
}

fn check_shape(expected: &[usize], got: &TensorInfo) -> Result<()> {
    if expected != got.dims() {
        return Err(Error::ShapeMismatch {
            expected: Shape::from(expected),
            got: got.shape.clone(),
        });
    }
    Ok(())
}

/// Forward 2D convolution (regular or depthwise) of `x` by `w`, returning
/// the output values and shape in the caller's data format.
pub(crate) fn conv2d_forward(
    engine: &Engine,
    attrs: &Conv2dAttrs,
    depthwise: bool,
    x: &TensorInfo,
    w: &TensorInfo,
) -> Result<(Vec<f32>, Shape)> {
    let mut data = read_f32(engine, x)?;
    let mut in_shape = x.shape.clone();
    if attrs.data_format == DataFormat::ChannelsFirst {
        let (d, s) = array::transpose(&data, &in_shape, &NCHW_TO_NHWC)?;
        data = d;
        in_shape = s;
    }
    let info = compute_conv2d_info(
        in_shape.dims(),
        w.dims(),
        attrs.strides,
        attrs.dilations,
        &attrs.padding,
        depthwise,
        DataFormat::ChannelsLast,
    )?;
    let filter = read_f32(engine, w)?;
    let parallel = engine.config().parallel;
    let out = if depthwise {
        conv::depthwise_conv2d(&data, &filter, &info, parallel)
    } else {
        conv::conv2d(&data, &filter, &info, parallel)
    };
    let out_shape = Shape::new(info.out_shape_nhwc());
    if attrs.data_format == DataFormat::ChannelsFirst {
        return array::transpose(&out, &out_shape, &NHWC_TO_NCHW);
    }
    Ok((out, out_shape))
}

pub(crate) fn conv2d(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let (attrs, depthwise) = match op {
        Op::Conv2d(attrs) => (attrs, false),
        Op::DepthwiseConv2d(attrs) => (attrs, true),
        _ => return Err(wrong_op("conv2d", op)),
    };
    let (data, shape) = conv2d_forward(engine, attrs, depthwise, &inputs[0], &inputs[1])?;
    Ok(vec![engine.write_f32(data, shape)?])
}

/// Gradients of Conv2d with respect to its input or its filter.
pub(crate) fn conv2d_backprop(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let (out, shape) = match op {
        Op::Conv2dBackpropInput(attrs) => {
            let (dy, w) = (&inputs[0], &inputs[1]);
            let info = compute_conv2d_info(
                &attrs.shape,
                w.dims(),
                attrs.strides,
                attrs.dilations,
                &attrs.padding,
                false,
                DataFormat::ChannelsLast,
            )?;
            check_shape(&info.out_shape, dy)?;
            let dx = conv::conv2d_backprop_input(&read_f32(engine, dy)?, &read_f32(engine, w)?, &info);
            (dx, Shape::new(attrs.shape.clone()))
        }
        Op::Conv2dBackpropFilter(attrs) => {
            let (x, dy) = (&inputs[0], &inputs[1]);
            let info = compute_conv2d_info(
                x.dims(),
                &attrs.shape,
                attrs.strides,
                attrs.dilations,
                &attrs.padding,
                false,
                DataFormat::ChannelsLast,
            )?;
            check_shape(&info.out_shape, dy)?;
            let dw = conv::conv2d_backprop_filter(&read_f32(engine, x)?, &read_f32(engine, dy)?, &info);
            (dw, Shape::new(attrs.shape.clone()))
        }
        _ => return Err(wrong_op("conv2d backprop", op)),
    };
    Ok(vec![engine.write_f32(out, shape)?])
}

pub(crate) fn conv3d(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let (out, shape) = match op {
        Op::Conv3d(attrs) => {
            let (x, w) = (&inputs[0], &inputs[1]);
            let info = compute_conv3d_info(x.dims(), w.dims(), attrs.strides, attrs.dilations, &attrs.padding)?;
            let y = conv::conv3d(
                &read_f32(engine, x)?,
                &read_f32(engine, w)?,
                &info,
                engine.config().parallel,
            );
            (y, Shape::new(info.out_shape))
        }
        Op::Conv3dBackpropInput(attrs) => {
            let (dy, w) = (&inputs[0], &inputs[1]);
            let info = compute_conv3d_info(&attrs.shape, w.dims(), attrs.strides, attrs.dilations, &attrs.padding)?;
            check_shape(&info.out_shape, dy)?;
            let dx = conv::conv3d_backprop_input(&read_f32(engine, dy)?, &read_f32(engine, w)?, &info);
            (dx, Shape::new(attrs.shape.clone()))
        }
        Op::Conv3dBackpropFilter(attrs) => {
            let (x, dy) = (&inputs[0], &inputs[1]);
            let info = compute_conv3d_info(x.dims(), &attrs.shape, attrs.strides, attrs.dilations, &attrs.padding)?;
            check_shape(&info.out_shape, dy)?;
            let dw = conv::conv3d_backprop_filter(&read_f32(engine, x)?, &read_f32(engine, dy)?, &info);
            (dw, Shape::new(attrs.shape.clone()))
        }
        _ => return Err(wrong_op("conv3d", op)),
    };
    Ok(vec![engine.write_f32(out, shape)?])
}

fn pool2d_info(x: &TensorInfo, attrs: &Pool2dAttrs) -> Result<ConvInfo> {
    compute_pool2d_info(x.dims(), attrs.filter_size, attrs.strides, [1, 1], &attrs.padding)
}

pub(crate) fn pool2d(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let x = &inputs[0];
    let data = read_f32(engine, x)?;
    match op {
        Op::MaxPool(attrs) | Op::AvgPool(attrs) => {
            let info = pool2d_info(x, attrs)?;
            let out = if matches!(op, Op::MaxPool(_)) {
                pool::max_pool2d(&data, &info)
            } else {
                pool::avg_pool2d(&data, &info)
            };
            Ok(vec![engine.write_f32(out, Shape::new(info.out_shape))?])
        }
        Op::MaxPoolWithArgmax(attrs) => {
            let info = pool2d_info(x, &attrs.pool)?;
            let (values, positions) = pool::max_pool_with_argmax(&data, &info, attrs.include_batch_in_index);
            let shape = Shape::new(info.out_shape);
            let values = engine.write_f32(values, shape.clone())?;
            let positions = engine.write_i32(positions, shape)?;
            Ok(vec![values, positions])
        }
        _ => Err(wrong_op("pool2d", op)),
    }
}

pub(crate) fn pool3d(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let (Op::MaxPool3d(attrs) | Op::AvgPool3d(attrs)) = op else {
        return Err(wrong_op("pool3d", op));
    };
    let x = &inputs[0];
    let info = compute_pool3d_info(x.dims(), attrs.filter_size, attrs.strides, [1, 1, 1], &attrs.padding)?;
    let data = read_f32(engine, x)?;
    let out = if matches!(op, Op::MaxPool3d(_)) {
        pool::max_pool3d(&data, &info)
    } else {
        pool::avg_pool3d(&data, &info)
    };
    Ok(vec![engine.write_f32(out, Shape::new(info.out_shape))?])
}
