// Engine tests: end-to-end operator execution through Engine::execute

use vole::{
    Activation, AxisAttrs, BinaryOp, Conv2dAttrs, DType, Engine, EngineConfig, Error, FusedMatMulAttrs,
    GatherAttrs, MatMulAttrs, Op, OpKind, ReduceAttrs, ReduceOp, ReshapeAttrs, SoftmaxAttrs, TensorInfo,
};

fn assert_close(got: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(got.len(), expected.len(), "length mismatch");
    for (i, (g, e)) in got.iter().zip(expected).enumerate() {
        assert!((g - e).abs() <= tol, "index {i}: got {g}, expected {e}");
    }
}

fn run_one(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> TensorInfo {
    let mut out = engine.execute(op, inputs).expect("execute failed");
    assert_eq!(out.len(), 1, "{op} returned {} outputs", out.len());
    out.remove(0)
}

// Broadcasting

#[test]
fn test_binary_broadcast_matches_index_mapping() {
    let mut e = Engine::new(EngineConfig::default());
    // a: [2, 1, 3], b: [4, 1] -> [2, 4, 3]
    let a_data: Vec<f32> = (0..6).map(|v| v as f32).collect();
    let b_data: Vec<f32> = (0..4).map(|v| 10.0 * v as f32).collect();
    let a = e.tensor_f32(a_data.clone(), (2, 1, 3)).unwrap();
    let b = e.tensor_f32(b_data.clone(), (4, 1)).unwrap();
    let c = run_one(&mut e, &Op::Binary(BinaryOp::Add), &[a, b]);
    assert_eq!(c.dims(), &[2, 4, 3]);
    let out = e.read_f32(&c).unwrap();
    for i in 0..2 {
        for j in 0..4 {
            for k in 0..3 {
                let expected = a_data[i * 3 + k] + b_data[j];
                assert_eq!(out[(i * 4 + j) * 3 + k], expected);
            }
        }
    }
}

#[test]
fn test_binary_incompatible_shapes_fail() {
    let mut e = Engine::default();
    let a = e.tensor_f32(vec![1.0, 2.0], 2).unwrap();
    let b = e.tensor_f32(vec![1.0, 2.0, 3.0], 3).unwrap();
    assert!(e.execute(&Op::Binary(BinaryOp::Mul), &[a, b]).is_err());
}

// Floored division

#[test]
fn test_floor_div_and_mod_follow_divisor() {
    let mut e = Engine::default();
    for dtype in [DType::F32, DType::I32] {
        let (a, b) = match dtype {
            DType::I32 => (
                e.tensor_i32(vec![-7], 1).unwrap(),
                e.tensor_i32(vec![2], 1).unwrap(),
            ),
            _ => (
                e.tensor_f32(vec![-7.0], 1).unwrap(),
                e.tensor_f32(vec![2.0], 1).unwrap(),
            ),
        };
        let q = run_one(&mut e, &Op::Binary(BinaryOp::FloorDiv), &[a.clone(), b.clone()]);
        let r = run_one(&mut e, &Op::Binary(BinaryOp::Mod), &[a, b]);
        assert_eq!(e.read_f32(&q).unwrap(), vec![-4.0], "{dtype}");
        assert_eq!(e.read_f32(&r).unwrap(), vec![1.0], "{dtype}");
    }
}

// Reductions

#[test]
fn test_sum_of_constant_is_n_times_c() {
    let mut e = Engine::default();
    let n = 37;
    let x = e.tensor_f32(vec![0.25; n], n).unwrap();
    let op = Op::Reduce(ReduceAttrs {
        op: ReduceOp::Sum,
        axes: vec![],
        keep_dims: false,
    });
    let s = run_one(&mut e, &op, &[x]);
    assert_eq!(s.rank(), 0);
    assert_close(&e.read_f32(&s).unwrap(), &[n as f32 * 0.25], 1e-5);
}

#[test]
fn test_max_and_min_propagate_nan() {
    let mut e = Engine::default();
    let x = e.tensor_f32(vec![1.0, f32::NAN, 3.0, 4.0, 5.0, 6.0], (2, 3)).unwrap();
    for op in [ReduceOp::Max, ReduceOp::Min] {
        let attrs = ReduceAttrs {
            op,
            axes: vec![-1],
            keep_dims: false,
        };
        let y = run_one(&mut e, &Op::Reduce(attrs), &[x.clone()]);
        let out = e.read_f32(&y).unwrap();
        assert!(out[0].is_nan());
        assert!(!out[1].is_nan());
    }
}

// FFT

#[test]
fn test_ifft_of_fft_round_trips() {
    let mut e = Engine::default();
    for n in [8usize, 6] {
        let re: Vec<f32> = (0..n).map(|i| (i as f32 * 0.7).sin()).collect();
        let im: Vec<f32> = (0..n).map(|i| i as f32 * 0.1 - 0.2).collect();
        let r = e.tensor_f32(re.clone(), n).unwrap();
        let i = e.tensor_f32(im.clone(), n).unwrap();
        let c = e.complex(&r, &i).unwrap();
        let f = run_one(&mut e, &Op::Fft, &[c]);
        let back = run_one(&mut e, &Op::Ifft, &[f]);
        let (br, bi) = e.read_complex(&back).unwrap();
        assert_close(&br, &re, 1e-4);
        assert_close(&bi, &im, 1e-4);
    }
}

// Convolution

#[test]
fn test_pointwise_conv_equals_per_pixel_matmul() {
    let mut e = Engine::default();
    let x_data: Vec<f32> = (0..18).map(|v| v as f32 * 0.5 - 3.0).collect();
    let w_data: Vec<f32> = (0..8).map(|v| (v as f32 - 4.0) * 0.25).collect();
    let x = e.tensor_f32(x_data, (1, 3, 3, 2)).unwrap();
    let w = e.tensor_f32(w_data, (1, 1, 2, 4)).unwrap();

    let conv = run_one(&mut e, &Op::Conv2d(Conv2dAttrs::default()), &[x.clone(), w.clone()]);
    assert_eq!(conv.dims(), &[1, 3, 3, 4]);

    let pixels = run_one(&mut e, &Op::Reshape(ReshapeAttrs { shape: vec![9, 2] }), &[x]);
    let weights = run_one(&mut e, &Op::Reshape(ReshapeAttrs { shape: vec![2, 4] }), &[w]);
    let mm = run_one(&mut e, &Op::BatchMatMul(MatMulAttrs::default()), &[pixels, weights]);

    assert_close(&e.read_f32(&conv).unwrap(), &e.read_f32(&mm).unwrap(), 1e-5);
}

// Array movement

#[test]
fn test_concat_rows() {
    let mut e = Engine::default();
    let a = e.tensor_f32(vec![1.0, 2.0, 3.0, 4.0], (2, 2)).unwrap();
    let b = e.tensor_f32(vec![5.0, 6.0], (1, 2)).unwrap();
    let c = run_one(&mut e, &Op::Concat(AxisAttrs { axis: 0 }), &[a, b]);
    assert_eq!(c.dims(), &[3, 2]);
    assert_eq!(e.read_f32(&c).unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn test_concat_mixed_dtypes_fail() {
    let mut e = Engine::default();
    let a = e.tensor_f32(vec![1.0], 1).unwrap();
    let b = e.tensor_i32(vec![1], 1).unwrap();
    assert!(e.execute(&Op::Concat(AxisAttrs { axis: 0 }), &[a, b]).is_err());
}

// Errors

#[test]
fn test_gather_error_names_index_and_range() {
    let mut e = Engine::default();
    let x = e.tensor_f32(vec![1.0, 2.0, 3.0], 3).unwrap();
    let idx = e.tensor_i32(vec![0, 7], 2).unwrap();
    let err = e.execute(&Op::Gather(GatherAttrs::default()), &[x, idx]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains('7'), "{msg}");
    assert!(msg.contains("[0, 3)"), "{msg}");
}

#[test]
fn test_wrong_arity_is_reported() {
    let mut e = Engine::default();
    let a = e.tensor_f32(vec![1.0], 1).unwrap();
    let err = e.execute(&Op::Binary(BinaryOp::Add), &[a]).unwrap_err();
    assert!(matches!(err, Error::Arity { got: 1, .. }));
}

#[test]
fn test_unknown_names_are_rejected() {
    assert!(matches!("NoSuchOp".parse::<OpKind>(), Err(Error::UnknownOp(_))));
    assert_eq!("FusedMatMul".parse::<OpKind>().unwrap(), OpKind::FusedMatMul);
    assert!(matches!(
        "swish".parse::<Activation>(),
        Err(Error::UnsupportedActivation(_))
    ));
}

#[test]
fn test_disposed_handle_is_unknown() {
    let mut e = Engine::default();
    let a = e.tensor_f32(vec![1.0], 1).unwrap();
    e.dispose(&a).unwrap();
    let err = e.execute(&Op::Unary(vole::UnaryOp::Neg), &[a]).unwrap_err();
    assert!(matches!(err, Error::UnknownDataId(_)));
}

// Refcount discipline

#[test]
fn test_releasing_everything_frees_all_buffers() {
    let mut e = Engine::default();
    let mut handles = Vec::new();

    let x = e.tensor_f32(vec![1.0, -2.0, 3.0, -4.0, 5.0, -6.0], (2, 3)).unwrap();
    let w = e.tensor_f32(vec![0.5; 6], (3, 2)).unwrap();
    let bias = e.tensor_f32(vec![0.1, 0.2], 2).unwrap();
    handles.extend([x.clone(), w.clone(), bias.clone()]);

    let reshaped = run_one(&mut e, &Op::Reshape(ReshapeAttrs { shape: vec![3, 2] }), &[x.clone()]);
    let soft = run_one(&mut e, &Op::Softmax(SoftmaxAttrs::default()), &[x.clone()]);
    let fused = run_one(
        &mut e,
        &Op::FusedMatMul(FusedMatMulAttrs {
            has_bias: true,
            activation: Activation::Relu,
            ..Default::default()
        }),
        &[x.clone(), w, bias],
    );
    handles.extend([reshaped, soft, fused]);

    let im = e.tensor_f32(vec![0.0; 6], (2, 3)).unwrap();
    let c = e.complex(&x, &im).unwrap();
    let spectrum = run_one(&mut e, &Op::Fft, &[c.clone()]);
    let transposed = run_one(
        &mut e,
        &Op::Transpose(vole::TransposeAttrs { perm: vec![1, 0] }),
        &[spectrum.clone()],
    );
    handles.extend([im, c, spectrum, transposed]);
    assert!(e.num_data_ids() > 0);

    for h in &handles {
        e.dispose(h).unwrap();
    }
    assert_eq!(e.num_data_ids(), 0);
    assert_eq!(e.num_bytes(), 0);
}

#[test]
fn test_check_numerics_rejects_nan_outputs() {
    let mut e = Engine::new(EngineConfig::default().with_check_numerics(true));
    let a = e.tensor_f32(vec![0.0], 1).unwrap();
    let before = e.num_data_ids();
    let err = e.execute(&Op::Binary(BinaryOp::RealDiv), &[a.clone(), a]).unwrap_err();
    assert!(err.to_string().contains("NaN"), "{err}");
    assert_eq!(e.num_data_ids(), before);
}
