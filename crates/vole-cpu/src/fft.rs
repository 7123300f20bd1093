use num_complex::Complex32;
use std::f32::consts::PI;

// Discrete Fourier transforms over the innermost axis
//
// Complex data arrives as separate real and imaginary planes; each row of
// `n` elements is transformed independently.
//
//   power of two:  recursive radix-2 Cooley-Tukey, inverse scaled by 1/n
//                  once the whole row is done
//   otherwise:     direct O(n^2) DFT, inverse scaled inside the sum
//
// The real-input variants reuse the complex path: rfft keeps the n/2 + 1
// non-redundant bins, irfft rebuilds the Hermitian spectrum of length
// 2 * (m - 1) before inverting.

fn is_power_of_two(n: usize) -> bool {
    n != 0 && n & (n - 1) == 0
}

fn twiddle(k: usize, n: usize, inverse: bool) -> Complex32 {
    let sign = if inverse { 1.0 } else { -1.0 };
    Complex32::from_polar(1.0, sign * 2.0 * PI * k as f32 / n as f32)
}

fn radix2(row: &[Complex32], inverse: bool) -> Vec<Complex32> {
    let n = row.len();
    if n <= 1 {
        return row.to_vec();
    }
    let even: Vec<Complex32> = row.iter().step_by(2).copied().collect();
    let odd: Vec<Complex32> = row.iter().skip(1).step_by(2).copied().collect();
    let even = radix2(&even, inverse);
    let odd = radix2(&odd, inverse);
    let half = n / 2;
    let mut out = vec![Complex32::new(0.0, 0.0); n];
    for k in 0..half {
        let t = twiddle(k, n, inverse) * odd[k];
        out[k] = even[k] + t;
        out[k + half] = even[k] - t;
    }
    out
}

fn dft(row: &[Complex32], inverse: bool) -> Vec<Complex32> {
    let n = row.len();
    let scale = if inverse { 1.0 / n as f32 } else { 1.0 };
    (0..n)
        .map(|k| {
            row.iter()
                .enumerate()
                .fold(Complex32::new(0.0, 0.0), |acc, (t, &x)| {
                    acc + x * twiddle((k * t) % n, n, inverse) * scale
                })
        })
        .collect()
}

/// Transform one row of complex values.
pub fn fft_row(row: &[Complex32], inverse: bool) -> Vec<Complex32> {
    let n = row.len();
    if is_power_of_two(n) {
        let mut out = radix2(row, inverse);
        if inverse {
            let scale = 1.0 / n as f32;
            for v in out.iter_mut() {
                *v *= scale;
            }
        }
        out
    } else {
        dft(row, inverse)
    }
}

/// Forward or inverse FFT of every length-`n` row. Returns new real and
/// imaginary planes of the same size.
pub fn fft(re: &[f32], im: &[f32], n: usize, inverse: bool) -> (Vec<f32>, Vec<f32>) {
    let mut out_re = Vec::with_capacity(re.len());
    let mut out_im = Vec::with_capacity(im.len());
    if n == 0 {
        return (out_re, out_im);
    }
    for (r, i) in re.chunks(n).zip(im.chunks(n)) {
        let row: Vec<Complex32> = r.iter().zip(i).map(|(&a, &b)| Complex32::new(a, b)).collect();
        for v in fft_row(&row, inverse) {
            out_re.push(v.re);
            out_im.push(v.im);
        }
    }
    (out_re, out_im)
}

/// Real-input FFT: each row of `n` reals becomes `n / 2 + 1` complex bins.
pub fn rfft(x: &[f32], n: usize) -> (Vec<f32>, Vec<f32>) {
    let bins = n / 2 + 1;
    let mut out_re = Vec::new();
    let mut out_im = Vec::new();
    if n == 0 {
        return (out_re, out_im);
    }
    for r in x.chunks(n) {
        let row: Vec<Complex32> = r.iter().map(|&a| Complex32::new(a, 0.0)).collect();
        for v in fft_row(&row, false).into_iter().take(bins) {
            out_re.push(v.re);
            out_im.push(v.im);
        }
    }
    (out_re, out_im)
}

/// Inverse of [`rfft`]: rows of `m` complex bins become `2 * (m - 1)` reals.
pub fn irfft(re: &[f32], im: &[f32], m: usize) -> Vec<f32> {
    if m < 2 {
        return Vec::new();
    }
    let n = 2 * (m - 1);
    let mut out = Vec::with_capacity(re.len() / m * n);
    for (r, i) in re.chunks(m).zip(im.chunks(m)) {
        let mut full: Vec<Complex32> = r.iter().zip(i).map(|(&a, &b)| Complex32::new(a, b)).collect();
        for k in (1..m - 1).rev() {
            full.push(full[k].conj());
        }
        out.extend(fft_row(&full, true).into_iter().map(|v| v.re));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f32], b: &[f32], tol: f32) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!((x - y).abs() < tol, "index {i}: {x} vs {y}");
        }
    }

    #[test]
    fn test_impulse_is_flat() {
        let (re, im) = fft(&[1.0, 0.0, 0.0, 0.0], &[0.0; 4], 4, false);
        assert_close(&re, &[1.0; 4], 1e-6);
        assert_close(&im, &[0.0; 4], 1e-6);
    }

    #[test]
    fn test_radix2_matches_dft() {
        let row: Vec<Complex32> = (0..8)
            .map(|i| Complex32::new((i as f32).sin(), (i as f32 * 0.5).cos()))
            .collect();
        let a = radix2(&row, false);
        let b = dft(&row, false);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).norm() < 1e-4);
        }
    }

    #[test]
    fn test_roundtrip_non_power_of_two() {
        let re = [1.0, -2.0, 3.5, 0.0, 4.0, 2.0];
        let im = [0.5, 0.0, -1.0, 2.0, 0.0, 1.0];
        let (fr, fi) = fft(&re, &im, 6, false);
        let (br, bi) = fft(&fr, &fi, 6, true);
        assert_close(&br, &re, 1e-4);
        assert_close(&bi, &im, 1e-4);
    }

    #[test]
    fn test_rfft_irfft() {
        let x = [1.0, 2.0, 3.0, 4.0, 0.0, -1.0, -2.0, 5.0];
        let (re, im) = rfft(&x, 8);
        assert_eq!(re.len(), 5);
        assert!((re[0] - 12.0).abs() < 1e-5);
        assert!(im[0].abs() < 1e-5);
        let back = irfft(&re, &im, 5);
        assert_close(&back, &x, 1e-4);
    }
}
