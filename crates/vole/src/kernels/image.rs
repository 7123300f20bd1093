// Image and detection kernels: projective transform, resize and NMS.
//
// Images are NHWC. The resize kernels also accept a single HWC image and
// treat it as a batch of one.

use vole_core::{DType, Error, Result, Shape, TensorInfo, Values};
use vole_cpu::image::{self, ResizeOptions, TransformOptions};

use super::{expect_dtype, expect_rank, wrong_op};
use crate::engine::Engine;
use crate::op::Op;

fn nhwc(op: &'static str, t: &TensorInfo, allow_hwc: bool) -> Result<[usize; 4]> {
    match *t.dims() {
        [b, h, w, c] => Ok([b, h, w, c]),
        [h, w, c] if allow_hwc => Ok([1, h, w, c]),
        _ => Err(Error::RankMismatch {
            op,
            expected: 4,
            got: t.rank(),
        }),
    }
}

pub(crate) fn transform(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Transform(attrs) = op else {
        return Err(wrong_op("transform", op));
    };
    let (images, transforms) = (&inputs[0], &inputs[1]);
    let dims = nhwc("Transform", images, false)?;
    expect_rank("Transform", transforms, 2)?;
    let [batch, height, width, channels] = dims;
    let [out_height, out_width] = attrs.output_shape.unwrap_or([height, width]);
    let opts = TransformOptions {
        interpolation: attrs.interpolation,
        fill_mode: attrs.fill_mode,
        fill_value: attrs.fill_value,
        out_height,
        out_width,
    };
    let data = engine.read_f32(images)?;
    let coeffs = engine.read_f32(transforms)?;
    let out = image::transform(&data, dims, &coeffs, &opts)?;
    Ok(vec![engine.write_f32(out, Shape::from((batch, out_height, out_width, channels)))?])
}

pub(crate) fn resize(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let (attrs, name) = match op {
        Op::ResizeBilinear(attrs) => (attrs, "ResizeBilinear"),
        Op::ResizeNearestNeighbor(attrs) => (attrs, "ResizeNearestNeighbor"),
        _ => return Err(wrong_op("resize", op)),
    };
    let x = &inputs[0];
    let dims = nhwc(name, x, true)?;
    if attrs.align_corners && attrs.half_pixel_centers {
        return Err(Error::msg(format!(
            "{name}: align_corners and half_pixel_centers cannot both be set"
        )));
    }
    let opts = ResizeOptions {
        new_height: attrs.size[0],
        new_width: attrs.size[1],
        align_corners: attrs.align_corners,
        half_pixel_centers: attrs.half_pixel_centers,
    };
    let values = match op {
        Op::ResizeBilinear(_) => {
            expect_dtype(name, x, &[DType::F32, DType::I32])?;
            Values::F32(image::resize_bilinear(&engine.read_f32(x)?, dims, &opts))
        }
        _ => match engine.values(x)? {
            Values::F32(d) => Values::F32(image::resize_nearest_neighbor(d, dims, &opts)),
            Values::I32(d) => Values::I32(image::resize_nearest_neighbor(d, dims, &opts)),
            other => {
                return Err(Error::UnsupportedDType {
                    op: name,
                    dtype: other.dtype(),
                })
            }
        },
    };
    let mut out_dims = x.dims().to_vec();
    let r = out_dims.len();
    out_dims[r - 3] = opts.new_height;
    out_dims[r - 2] = opts.new_width;
    Ok(vec![engine.write(values, Shape::new(out_dims))?])
}

/// `(boxes [n, 4], scores [n]) -> (indices [k], scores [k], valid_outputs [])`.
pub(crate) fn non_max_suppression(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::NonMaxSuppression(opts) = op else {
        return Err(wrong_op("non_max_suppression", op));
    };
    let (boxes, scores) = (&inputs[0], &inputs[1]);
    expect_rank("NonMaxSuppression", boxes, 2)?;
    expect_rank("NonMaxSuppression", scores, 1)?;
    if boxes.dims()[1] != 4 {
        return Err(Error::ShapeMismatch {
            expected: Shape::from((scores.elem_count(), 4)),
            got: boxes.shape.clone(),
        });
    }
    let result = image::non_max_suppression(&engine.read_f32(boxes)?, &engine.read_f32(scores)?, opts)?;
    let k = result.selected_indices.len();
    let indices = engine.write_i32(result.selected_indices, Shape::from(k))?;
    let scores = engine.write_f32(result.selected_scores, Shape::from(k))?;
    let valid = engine.write_i32(vec![result.valid_outputs as i32], Shape::scalar())?;
    Ok(vec![indices, scores, valid])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{ResizeAttrs, TransformAttrs};
    use vole_cpu::image::{FillMode, Interpolation, NmsOptions};

    #[test]
    fn test_identity_transform_every_batch() {
        let mut e = Engine::default();
        let images = e
            .tensor_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], (2, 2, 2, 1))
            .unwrap();
        let t = e
            .tensor_f32(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0], (1, 8))
            .unwrap();
        let op = Op::Transform(TransformAttrs {
            interpolation: Interpolation::Nearest,
            fill_mode: FillMode::Constant,
            fill_value: 0.0,
            output_shape: None,
        });
        let y = e.execute_one(&op, &[images, t]).unwrap();
        assert_eq!(y.dims(), &[2, 2, 2, 1]);
        assert_eq!(
            e.read_f32(&y).unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn test_resize_nearest_keeps_int_and_hwc_rank() {
        let mut e = Engine::default();
        let x = e.tensor_i32(vec![1, 2, 3, 4], (2, 2, 1)).unwrap();
        let op = Op::ResizeNearestNeighbor(ResizeAttrs {
            size: [4, 4],
            align_corners: false,
            half_pixel_centers: false,
        });
        let y = e.execute_one(&op, &[x]).unwrap();
        assert_eq!(y.dims(), &[4, 4, 1]);
        assert_eq!(y.dtype, DType::I32);
        let out = e.read_i32(&y).unwrap();
        assert_eq!(&out[..4], &[1, 1, 2, 2]);
        assert_eq!(&out[12..], &[3, 3, 4, 4]);
    }

    #[test]
    fn test_resize_bilinear_same_size() {
        let mut e = Engine::default();
        let x = e.tensor_f32(vec![1.0, 2.0, 3.0, 4.0], (1, 2, 2, 1)).unwrap();
        let op = Op::ResizeBilinear(ResizeAttrs {
            size: [2, 2],
            align_corners: false,
            half_pixel_centers: false,
        });
        let y = e.execute_one(&op, &[x]).unwrap();
        assert_eq!(e.read_f32(&y).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        let mut e = Engine::default();
        let boxes = e
            .tensor_f32(
                vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.05, 1.0, 1.05, 2.0, 2.0, 3.0, 3.0],
                (3, 4),
            )
            .unwrap();
        let scores = e.tensor_f32(vec![0.9, 0.8, 0.7], 3).unwrap();
        let op = Op::NonMaxSuppression(NmsOptions {
            max_output_size: 3,
            iou_threshold: 0.5,
            score_threshold: 0.0,
            soft_nms_sigma: 0.0,
            pad_to_max_output_size: false,
        });
        let out = e.execute(&op, &[boxes, scores]).unwrap();
        assert_eq!(e.read_i32(&out[0]).unwrap(), vec![0, 2]);
        assert_eq!(e.read_f32(&out[1]).unwrap(), vec![0.9, 0.7]);
        assert_eq!(e.read_i32(&out[2]).unwrap(), vec![2]);
        assert_eq!(out[2].rank(), 0);
    }
}
