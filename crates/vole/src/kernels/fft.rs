// FFT kernels over the innermost axis.
//
// Fft/Ifft keep the shape; Rfft shrinks the last dim to n/2 + 1 complex
// bins; Irfft grows m bins back to 2 * (m - 1) reals.

use vole_core::{DType, Error, Result, Shape, TensorInfo};
use vole_cpu::fft;

use super::{expect_dtype, wrong_op};
use crate::engine::Engine;
use crate::op::Op;

fn last_dim(op: &'static str, t: &TensorInfo) -> Result<usize> {
    t.dims().last().copied().ok_or(Error::RankMismatch {
        op,
        expected: 1,
        got: 0,
    })
}

fn with_last_dim(shape: &Shape, last: usize) -> Shape {
    let mut dims = shape.dims().to_vec();
    if let Some(d) = dims.last_mut() {
        *d = last;
    }
    Shape::new(dims)
}

pub(crate) fn fft_kernel(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let x = &inputs[0];
    let out = match op {
        Op::Fft | Op::Ifft => {
            let n = last_dim(op_name(op), x)?;
            let (re, im) = engine.read_complex(x)?;
            let (re, im) = fft::fft(&re, &im, n, matches!(op, Op::Ifft));
            engine.write_complex(re, im, x.shape.clone())?
        }
        Op::Rfft => {
            expect_dtype("Rfft", x, &[DType::F32, DType::I32])?;
            let n = last_dim("Rfft", x)?;
            let data = engine.read_f32(x)?;
            let (re, im) = fft::rfft(&data, n);
            engine.write_complex(re, im, with_last_dim(&x.shape, n / 2 + 1))?
        }
        Op::Irfft => {
            let m = last_dim("Irfft", x)?;
            if m < 2 {
                return Err(Error::InvalidSize {
                    op: "Irfft",
                    value: m as i64,
                    reason: "needs at least two frequency bins".into(),
                });
            }
            let (re, im) = engine.read_complex(x)?;
            let out = fft::irfft(&re, &im, m);
            engine.write_f32(out, with_last_dim(&x.shape, 2 * (m - 1)))?
        }
        _ => return Err(wrong_op("fft", op)),
    };
    Ok(vec![out])
}

fn op_name(op: &Op) -> &'static str {
    match op {
        Op::Ifft => "Ifft",
        _ => "Fft",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn test_fft_of_impulse_is_flat() {
        let mut e = Engine::default();
        let re = e.tensor_f32(vec![1.0, 0.0, 0.0, 0.0], 4).unwrap();
        let im = e.tensor_f32(vec![0.0; 4], 4).unwrap();
        let c = e.complex(&re, &im).unwrap();
        let y = e.execute_one(&Op::Fft, &[c]).unwrap();
        assert_eq!(y.dtype, DType::Complex64);
        let (yr, yi) = e.read_complex(&y).unwrap();
        assert!(close(&yr, &[1.0; 4]));
        assert!(close(&yi, &[0.0; 4]));
    }

    #[test]
    fn test_ifft_inverts_fft_for_odd_rows() {
        let mut e = Engine::default();
        let re = e.tensor_f32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3)).unwrap();
        let im = e.tensor_f32(vec![0.5, 0.0, -1.0, 2.0, 0.0, 1.0], (2, 3)).unwrap();
        let c = e.complex(&re, &im).unwrap();
        let f = e.execute_one(&Op::Fft, &[c]).unwrap();
        let back = e.execute_one(&Op::Ifft, &[f]).unwrap();
        let (br, bi) = e.read_complex(&back).unwrap();
        assert!(close(&br, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        assert!(close(&bi, &[0.5, 0.0, -1.0, 2.0, 0.0, 1.0]));
    }

    #[test]
    fn test_rfft_shape_and_irfft_roundtrip() {
        let mut e = Engine::default();
        let x = e.tensor_f32(vec![1.0, 2.0, 0.0, -1.0, 3.0, 0.5], 6).unwrap();
        let f = e.execute_one(&Op::Rfft, &[x]).unwrap();
        assert_eq!(f.dims(), &[4]);
        let (fr, fi) = e.read_complex(&f).unwrap();
        assert!((fr[0] - 5.5).abs() < 1e-4);
        assert!(fi[0].abs() < 1e-4);
        let back = e.execute_one(&Op::Irfft, &[f]).unwrap();
        assert_eq!(back.dims(), &[6]);
        assert!(close(&e.read_f32(&back).unwrap(), &[1.0, 2.0, 0.0, -1.0, 3.0, 0.5]));
    }

    #[test]
    fn test_irfft_needs_two_bins() {
        let mut e = Engine::default();
        let x = e.tensor_f32(vec![1.0], 1).unwrap();
        assert!(matches!(e.execute(&Op::Irfft, &[x]), Err(Error::InvalidSize { .. })));
    }
}
