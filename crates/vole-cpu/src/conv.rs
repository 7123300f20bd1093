use rayon::prelude::*;
use vole_core::{Conv3dInfo, ConvInfo};

// Convolution kernels
//
// Inputs are channels-last (NHWC / NDHWC) and filters HWIO / DHWIO. A
// ConvInfo from vole_core::conv carries every resolved size, so the kernels
// are plain nested loops over it. Taps that land in the padding contribute
// nothing.
//
// Forward convolutions write one output image per batch element, which makes
// the batch the natural unit of parallel work: with `parallel` set, each
// batch slice of the output is filled on the rayon pool.

fn for_each_batch<F>(out: &mut [f32], batch_len: usize, parallel: bool, f: F)
where
    F: Fn(usize, &mut [f32]) + Sync + Send,
{
    if batch_len == 0 {
        return;
    }
    if parallel {
        out.par_chunks_mut(batch_len)
            .enumerate()
            .for_each(|(b, chunk)| f(b, chunk));
    } else {
        out.chunks_mut(batch_len)
            .enumerate()
            .for_each(|(b, chunk)| f(b, chunk));
    }
}

/// Input coordinate of output position `o` and filter tap `k`, or `None`
/// when it falls in the padding.
#[inline]
fn source(o: usize, k: usize, stride: usize, dilation: usize, pad: usize, limit: usize) -> Option<usize> {
    let pos = (o * stride + k * dilation) as isize - pad as isize;
    if pos < 0 || pos as usize >= limit {
        None
    } else {
        Some(pos as usize)
    }
}

/// 2D convolution. `x` is `[N, H, W, C_in]`, `w` is `[fH, fW, C_in, C_out]`.
pub fn conv2d(x: &[f32], w: &[f32], info: &ConvInfo, parallel: bool) -> Vec<f32> {
    let (ih, iw, ic) = (info.in_height, info.in_width, info.in_channels);
    let (oh, ow, oc) = (info.out_height, info.out_width, info.out_channels);
    let mut out = vec![0f32; info.batch_size * oh * ow * oc];
    for_each_batch(&mut out, oh * ow * oc, parallel, |b, y| {
        let xb = &x[b * ih * iw * ic..(b + 1) * ih * iw * ic];
        for yr in 0..oh {
            for fr in 0..info.filter_height {
                let Some(xr) = source(yr, fr, info.stride_height, info.dilation_height, info.pad.top, ih)
                else {
                    continue;
                };
                for yc in 0..ow {
                    let y_off = (yr * ow + yc) * oc;
                    for fc in 0..info.filter_width {
                        let Some(xc) =
                            source(yc, fc, info.stride_width, info.dilation_width, info.pad.left, iw)
                        else {
                            continue;
                        };
                        let x_off = (xr * iw + xc) * ic;
                        let w_off = (fr * info.filter_width + fc) * ic * oc;
                        for d1 in 0..ic {
                            let xv = xb[x_off + d1];
                            let wrow = &w[w_off + d1 * oc..w_off + (d1 + 1) * oc];
                            for (acc, &wv) in y[y_off..y_off + oc].iter_mut().zip(wrow) {
                                *acc += xv * wv;
                            }
                        }
                    }
                }
            }
        }
    });
    out
}

/// Gradient of [`conv2d`] with respect to its input, given `dy` of the
/// forward output shape.
pub fn conv2d_backprop_input(dy: &[f32], w: &[f32], info: &ConvInfo) -> Vec<f32> {
    let (ih, iw, ic) = (info.in_height, info.in_width, info.in_channels);
    let (oh, ow, oc) = (info.out_height, info.out_width, info.out_channels);
    let mut dx = vec![0f32; info.batch_size * ih * iw * ic];
    for b in 0..info.batch_size {
        for yr in 0..oh {
            for fr in 0..info.filter_height {
                let Some(xr) = source(yr, fr, info.stride_height, info.dilation_height, info.pad.top, ih)
                else {
                    continue;
                };
                for yc in 0..ow {
                    let dy_off = ((b * oh + yr) * ow + yc) * oc;
                    for fc in 0..info.filter_width {
                        let Some(xc) =
                            source(yc, fc, info.stride_width, info.dilation_width, info.pad.left, iw)
                        else {
                            continue;
                        };
                        let dx_off = ((b * ih + xr) * iw + xc) * ic;
                        let w_off = (fr * info.filter_width + fc) * ic * oc;
                        for d1 in 0..ic {
                            let wrow = &w[w_off + d1 * oc..w_off + (d1 + 1) * oc];
                            let g: f32 = dy[dy_off..dy_off + oc]
                                .iter()
                                .zip(wrow)
                                .map(|(&g, &wv)| g * wv)
                                .sum();
                            dx[dx_off + d1] += g;
                        }
                    }
                }
            }
        }
    }
    dx
}

/// Gradient of [`conv2d`] with respect to its filter.
pub fn conv2d_backprop_filter(x: &[f32], dy: &[f32], info: &ConvInfo) -> Vec<f32> {
    let (ih, iw, ic) = (info.in_height, info.in_width, info.in_channels);
    let (oh, ow, oc) = (info.out_height, info.out_width, info.out_channels);
    let mut dw = vec![0f32; info.filter_height * info.filter_width * ic * oc];
    for b in 0..info.batch_size {
        for yr in 0..oh {
            for fr in 0..info.filter_height {
                let Some(xr) = source(yr, fr, info.stride_height, info.dilation_height, info.pad.top, ih)
                else {
                    continue;
                };
                for yc in 0..ow {
                    let dy_off = ((b * oh + yr) * ow + yc) * oc;
                    for fc in 0..info.filter_width {
                        let Some(xc) =
                            source(yc, fc, info.stride_width, info.dilation_width, info.pad.left, iw)
                        else {
                            continue;
                        };
                        let x_off = ((b * ih + xr) * iw + xc) * ic;
                        let w_off = (fr * info.filter_width + fc) * ic * oc;
                        for d1 in 0..ic {
                            let xv = x[x_off + d1];
                            for d2 in 0..oc {
                                dw[w_off + d1 * oc + d2] += xv * dy[dy_off + d2];
                            }
                        }
                    }
                }
            }
        }
    }
    dw
}

/// Depthwise 2D convolution. `w` is `[fH, fW, C_in, multiplier]` and output
/// channel `d1 * multiplier + q` only reads input channel `d1`.
pub fn depthwise_conv2d(x: &[f32], w: &[f32], info: &ConvInfo, parallel: bool) -> Vec<f32> {
    let (ih, iw, ic) = (info.in_height, info.in_width, info.in_channels);
    let (oh, ow, oc) = (info.out_height, info.out_width, info.out_channels);
    let mult = if ic == 0 { 0 } else { oc / ic };
    let mut out = vec![0f32; info.batch_size * oh * ow * oc];
    for_each_batch(&mut out, oh * ow * oc, parallel, |b, y| {
        let xb = &x[b * ih * iw * ic..(b + 1) * ih * iw * ic];
        for yr in 0..oh {
            for fr in 0..info.filter_height {
                let Some(xr) = source(yr, fr, info.stride_height, info.dilation_height, info.pad.top, ih)
                else {
                    continue;
                };
                for yc in 0..ow {
                    let y_off = (yr * ow + yc) * oc;
                    for fc in 0..info.filter_width {
                        let Some(xc) =
                            source(yc, fc, info.stride_width, info.dilation_width, info.pad.left, iw)
                        else {
                            continue;
                        };
                        let x_off = (xr * iw + xc) * ic;
                        let w_off = (fr * info.filter_width + fc) * ic * mult;
                        for d1 in 0..ic {
                            let xv = xb[x_off + d1];
                            for q in 0..mult {
                                y[y_off + d1 * mult + q] += xv * w[w_off + d1 * mult + q];
                            }
                        }
                    }
                }
            }
        }
    });
    out
}

/// 3D convolution. `x` is `[N, D, H, W, C_in]`, `w` is `[fD, fH, fW, C_in, C_out]`.
pub fn conv3d(x: &[f32], w: &[f32], info: &Conv3dInfo, parallel: bool) -> Vec<f32> {
    let (id, ih, iw, ic) = (info.in_depth, info.in_height, info.in_width, info.in_channels);
    let (od, oh, ow, oc) = (info.out_depth, info.out_height, info.out_width, info.out_channels);
    let in_len = id * ih * iw * ic;
    let mut out = vec![0f32; info.batch_size * od * oh * ow * oc];
    for_each_batch(&mut out, od * oh * ow * oc, parallel, |b, y| {
        let xb = &x[b * in_len..(b + 1) * in_len];
        visit_conv3d_taps(info, |y_pos, x_pos, w_pos| {
            let y_off = y_pos * oc;
            let x_off = x_pos * ic;
            let w_off = w_pos * ic * oc;
            for d1 in 0..ic {
                let xv = xb[x_off + d1];
                for d2 in 0..oc {
                    y[y_off + d2] += xv * w[w_off + d1 * oc + d2];
                }
            }
        });
    });
    out
}

/// Gradient of [`conv3d`] with respect to its input.
pub fn conv3d_backprop_input(dy: &[f32], w: &[f32], info: &Conv3dInfo) -> Vec<f32> {
    let in_len = info.in_depth * info.in_height * info.in_width * info.in_channels;
    let out_len = info.out_depth * info.out_height * info.out_width * info.out_channels;
    let (ic, oc) = (info.in_channels, info.out_channels);
    let mut dx = vec![0f32; info.batch_size * in_len];
    for b in 0..info.batch_size {
        let dyb = &dy[b * out_len..(b + 1) * out_len];
        let dxb = &mut dx[b * in_len..(b + 1) * in_len];
        visit_conv3d_taps(info, |y_pos, x_pos, w_pos| {
            for d1 in 0..ic {
                let mut g = 0f32;
                for d2 in 0..oc {
                    g += dyb[y_pos * oc + d2] * w[(w_pos * ic + d1) * oc + d2];
                }
                dxb[x_pos * ic + d1] += g;
            }
        });
    }
    dx
}

/// Gradient of [`conv3d`] with respect to its filter.
pub fn conv3d_backprop_filter(x: &[f32], dy: &[f32], info: &Conv3dInfo) -> Vec<f32> {
    let in_len = info.in_depth * info.in_height * info.in_width * info.in_channels;
    let out_len = info.out_depth * info.out_height * info.out_width * info.out_channels;
    let (ic, oc) = (info.in_channels, info.out_channels);
    let mut dw = vec![0f32; info.filter_depth * info.filter_height * info.filter_width * ic * oc];
    for b in 0..info.batch_size {
        let xb = &x[b * in_len..(b + 1) * in_len];
        let dyb = &dy[b * out_len..(b + 1) * out_len];
        visit_conv3d_taps(info, |y_pos, x_pos, w_pos| {
            for d1 in 0..ic {
                let xv = xb[x_pos * ic + d1];
                for d2 in 0..oc {
                    dw[(w_pos * ic + d1) * oc + d2] += xv * dyb[y_pos * oc + d2];
                }
            }
        });
    }
    dw
}

/// Call `f(output_pixel, input_pixel, filter_tap)` for every in-bounds
/// (output, tap) pair of one batch element. Indices are flat spatial
/// positions, not yet multiplied by a channel count.
fn visit_conv3d_taps<F: FnMut(usize, usize, usize)>(info: &Conv3dInfo, mut f: F) {
    let (id, ih, iw) = (info.in_depth, info.in_height, info.in_width);
    let (oh, ow) = (info.out_height, info.out_width);
    let (fh, fw) = (info.filter_height, info.filter_width);
    for yd in 0..info.out_depth {
        for fd in 0..info.filter_depth {
            let Some(xd) = source(yd, fd, info.stride_depth, info.dilation_depth, info.pad.front, id) else {
                continue;
            };
            for yr in 0..oh {
                for fr in 0..fh {
                    let Some(xr) = source(yr, fr, info.stride_height, info.dilation_height, info.pad.top, ih)
                    else {
                        continue;
                    };
                    for yc in 0..ow {
                        for fc in 0..fw {
                            let Some(xc) =
                                source(yc, fc, info.stride_width, info.dilation_width, info.pad.left, iw)
                            else {
                                continue;
                            };
                            let y_pos = (yd * oh + yr) * ow + yc;
                            let x_pos = (xd * ih + xr) * iw + xc;
                            let w_pos = (fd * fh + fr) * fw + fc;
                            f(y_pos, x_pos, w_pos);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vole_core::conv::{compute_conv2d_info, compute_conv3d_info};
    use vole_core::{DataFormat, Padding};

    fn info2d(x: &[usize], w: &[usize], stride: usize, padding: Padding) -> ConvInfo {
        compute_conv2d_info(x, w, [stride, stride], [1, 1], &padding, false, DataFormat::ChannelsLast)
            .unwrap()
    }

    #[test]
    fn test_conv2d_valid_sum_filter() {
        // 3x3 input of ones, 2x2 filter of ones -> every output is 4
        let info = info2d(&[1, 3, 3, 1], &[2, 2, 1, 1], 1, Padding::Valid);
        let out = conv2d(&[1.0; 9], &[1.0; 4], &info, false);
        assert_eq!(out, vec![4.0; 4]);
    }

    #[test]
    fn test_conv2d_same_padding_corners() {
        let info = info2d(&[1, 3, 3, 1], &[3, 3, 1, 1], 1, Padding::Same);
        let out = conv2d(&[1.0; 9], &[1.0; 9], &info, false);
        assert_eq!(out, vec![4.0, 6.0, 4.0, 6.0, 9.0, 6.0, 4.0, 6.0, 4.0]);
    }

    #[test]
    fn test_conv2d_parallel_matches_serial() {
        let info = info2d(&[3, 4, 4, 2], &[2, 2, 2, 3], 2, Padding::Same);
        let x: Vec<f32> = (0..96).map(|i| (i % 7) as f32 - 3.0).collect();
        let w: Vec<f32> = (0..24).map(|i| (i % 5) as f32 * 0.5).collect();
        assert_eq!(conv2d(&x, &w, &info, false), conv2d(&x, &w, &info, true));
    }

    #[test]
    fn test_backprop_input_is_adjoint() {
        // <conv(x, w), dy> == <x, backprop_input(dy, w)>
        let info = info2d(&[1, 4, 4, 2], &[3, 3, 2, 2], 1, Padding::Same);
        let x: Vec<f32> = (0..32).map(|i| (i as f32 * 0.37).sin()).collect();
        let w: Vec<f32> = (0..36).map(|i| (i as f32 * 0.11).cos()).collect();
        let dy: Vec<f32> = (0..32).map(|i| (i % 3) as f32 - 1.0).collect();
        let y = conv2d(&x, &w, &info, false);
        let dx = conv2d_backprop_input(&dy, &w, &info);
        let lhs: f32 = y.iter().zip(&dy).map(|(a, b)| a * b).sum();
        let rhs: f32 = x.iter().zip(&dx).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-3, "{lhs} vs {rhs}");

        let dw = conv2d_backprop_filter(&x, &dy, &info);
        let rhs_w: f32 = w.iter().zip(&dw).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs_w).abs() < 1e-3, "{lhs} vs {rhs_w}");
    }

    #[test]
    fn test_depthwise_multiplier() {
        let info = compute_conv2d_info(
            &[1, 2, 2, 2],
            &[1, 1, 2, 2],
            [1, 1],
            [1, 1],
            &Padding::Valid,
            true,
            DataFormat::ChannelsLast,
        )
        .unwrap();
        assert_eq!(info.out_channels, 4);
        let x = [1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0];
        let w = [1.0, 2.0, 0.5, -1.0];
        let out = depthwise_conv2d(&x, &w, &info, false);
        assert_eq!(&out[..4], &[1.0, 2.0, 5.0, -10.0]);
    }

    #[test]
    fn test_conv3d_matches_conv2d_for_unit_depth() {
        let info3 = compute_conv3d_info(&[1, 1, 3, 3, 1], &[1, 2, 2, 1, 1], [1, 1, 1], [1, 1, 1], &Padding::Valid)
            .unwrap();
        let x: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let w = [1.0, -1.0, 2.0, 0.5];
        let out3 = conv3d(&x, &w, &info3, false);
        let info2 = info2d(&[1, 3, 3, 1], &[2, 2, 1, 1], 1, Padding::Valid);
        assert_eq!(out3, conv2d(&x, &w, &info2, false));

        let dy = [1.0, 0.0, 0.0, 1.0];
        assert_eq!(
            conv3d_backprop_input(&dy, &w, &info3),
            conv2d_backprop_input(&dy, &w, &info2)
        );
        assert_eq!(
            conv3d_backprop_filter(&x, &dy, &info3),
            conv2d_backprop_filter(&x, &dy, &info2)
        );
    }
}
