use vole_core::{Conv3dInfo, ConvInfo};

// Pooling kernels
//
// Windows come from the same descriptors as convolution (channels are kept,
// so in_channels == out_channels). Average pooling divides by the number of
// in-bounds cells, so padding never dilutes the mean. A NaN in a max window
// wins. Max pooling over an all-padding window yields -inf.

/// Max or average reduction over each pooling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Max,
    Avg,
}

/// In-bounds input coordinates reached by output position `o`.
fn window(o: usize, stride: usize, pad: usize, filter: usize, dilation: usize, limit: usize) -> impl Iterator<Item = usize> {
    let start = (o * stride) as isize - pad as isize;
    (0..filter).filter_map(move |k| {
        let pos = start + (k * dilation) as isize;
        (pos >= 0 && (pos as usize) < limit).then_some(pos as usize)
    })
}

struct Accum {
    kind: PoolKind,
    value: f32,
    count: usize,
    arg: usize,
}

impl Accum {
    fn new(kind: PoolKind) -> Self {
        let value = match kind {
            PoolKind::Max => f32::NEG_INFINITY,
            PoolKind::Avg => 0.0,
        };
        Self {
            kind,
            value,
            count: 0,
            arg: 0,
        }
    }

    #[inline]
    fn push(&mut self, v: f32, index: usize) {
        match self.kind {
            PoolKind::Max => {
                if v > self.value || (v.is_nan() && !self.value.is_nan()) {
                    self.value = v;
                    self.arg = index;
                }
            }
            PoolKind::Avg => self.value += v,
        }
        self.count += 1;
    }

    fn finish(&self) -> f32 {
        match self.kind {
            PoolKind::Max => self.value,
            PoolKind::Avg if self.count == 0 => 0.0,
            PoolKind::Avg => self.value / self.count as f32,
        }
    }
}

/// Generic 2D pool over `[N, H, W, C]`. Returns the pooled values and, for
/// max pooling, the flat spatial index `(y * W + x) * C + c` of each winner
/// within its batch image.
fn pool2d_impl(x: &[f32], info: &ConvInfo, kind: PoolKind) -> (Vec<f32>, Vec<usize>) {
    let (ih, iw, c) = (info.in_height, info.in_width, info.in_channels);
    let (oh, ow) = (info.out_height, info.out_width);
    let mut out = Vec::with_capacity(info.batch_size * oh * ow * c);
    let mut args = Vec::with_capacity(out.capacity());
    for b in 0..info.batch_size {
        let xb = &x[b * ih * iw * c..(b + 1) * ih * iw * c];
        for yr in 0..oh {
            for yc in 0..ow {
                for d in 0..c {
                    let mut acc = Accum::new(kind);
                    for xr in window(yr, info.stride_height, info.pad.top, info.filter_height, info.dilation_height, ih) {
                        for xc in window(yc, info.stride_width, info.pad.left, info.filter_width, info.dilation_width, iw) {
                            let idx = (xr * iw + xc) * c + d;
                            acc.push(xb[idx], idx);
                        }
                    }
                    out.push(acc.finish());
                    args.push(acc.arg);
                }
            }
        }
    }
    (out, args)
}

pub fn max_pool2d(x: &[f32], info: &ConvInfo) -> Vec<f32> {
    pool2d_impl(x, info, PoolKind::Max).0
}

pub fn avg_pool2d(x: &[f32], info: &ConvInfo) -> Vec<f32> {
    pool2d_impl(x, info, PoolKind::Avg).0
}

/// Max pool plus the flattened position of every maximum. With
/// `include_batch_in_index` the position is `((b * H + y) * W + x) * C + c`,
/// otherwise the batch term is omitted.
pub fn max_pool_with_argmax(x: &[f32], info: &ConvInfo, include_batch_in_index: bool) -> (Vec<f32>, Vec<i32>) {
    let (values, args) = pool2d_impl(x, info, PoolKind::Max);
    let per_batch = info.out_height * info.out_width * info.out_channels;
    let image = info.in_height * info.in_width * info.in_channels;
    let positions = args
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            let b = if per_batch == 0 { 0 } else { i / per_batch };
            if include_batch_in_index {
                (b * image + a) as i32
            } else {
                a as i32
            }
        })
        .collect();
    (values, positions)
}

fn pool3d_impl(x: &[f32], info: &Conv3dInfo, kind: PoolKind) -> Vec<f32> {
    let (id, ih, iw, c) = (info.in_depth, info.in_height, info.in_width, info.in_channels);
    let in_len = id * ih * iw * c;
    let mut out = Vec::with_capacity(info.batch_size * info.out_depth * info.out_height * info.out_width * c);
    for b in 0..info.batch_size {
        let xb = &x[b * in_len..(b + 1) * in_len];
        for yd in 0..info.out_depth {
            for yr in 0..info.out_height {
                for yc in 0..info.out_width {
                    for d in 0..c {
                        let mut acc = Accum::new(kind);
                        for xd in window(yd, info.stride_depth, info.pad.front, info.filter_depth, info.dilation_depth, id) {
                            for xr in window(yr, info.stride_height, info.pad.top, info.filter_height, info.dilation_height, ih) {
                                for xc in window(yc, info.stride_width, info.pad.left, info.filter_width, info.dilation_width, iw) {
                                    let idx = ((xd * ih + xr) * iw + xc) * c + d;
                                    acc.push(xb[idx], idx);
                                }
                            }
                        }
                        out.push(acc.finish());
                    }
                }
            }
        }
    }
    out
}

pub fn max_pool3d(x: &[f32], info: &Conv3dInfo) -> Vec<f32> {
    pool3d_impl(x, info, PoolKind::Max)
}

pub fn avg_pool3d(x: &[f32], info: &Conv3dInfo) -> Vec<f32> {
    pool3d_impl(x, info, PoolKind::Avg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vole_core::conv::{compute_pool2d_info, compute_pool3d_info};
    use vole_core::Padding;

    #[test]
    fn test_max_and_avg_valid() {
        let info = compute_pool2d_info(&[1, 2, 2, 1], [2, 2], [1, 1], [1, 1], &Padding::Valid).unwrap();
        let x = [1.0, 4.0, 2.0, 3.0];
        assert_eq!(max_pool2d(&x, &info), vec![4.0]);
        assert_eq!(avg_pool2d(&x, &info), vec![2.5]);
    }

    #[test]
    fn test_avg_ignores_padding() {
        let info = compute_pool2d_info(&[1, 3, 3, 1], [3, 3], [1, 1], [1, 1], &Padding::Same).unwrap();
        let out = avg_pool2d(&[1.0; 9], &info);
        assert_eq!(out, vec![1.0; 9]);
    }

    #[test]
    fn test_argmax_positions() {
        let info = compute_pool2d_info(&[2, 2, 2, 1], [2, 2], [2, 2], [1, 1], &Padding::Valid).unwrap();
        let x = [1.0, 9.0, 2.0, 3.0, 5.0, 0.0, 7.0, 6.0];
        let (v, pos) = max_pool_with_argmax(&x, &info, false);
        assert_eq!(v, vec![9.0, 7.0]);
        assert_eq!(pos, vec![1, 2]);
        let (_, pos) = max_pool_with_argmax(&x, &info, true);
        assert_eq!(pos, vec![1, 6]);
    }

    #[test]
    fn test_pool3d() {
        let info = compute_pool3d_info(&[1, 2, 2, 2, 1], [2, 2, 2], [1, 1, 1], [1, 1, 1], &Padding::Valid).unwrap();
        let x: Vec<f32> = (1..=8).map(|i| i as f32).collect();
        assert_eq!(max_pool3d(&x, &info), vec![8.0]);
        assert_eq!(avg_pool3d(&x, &info), vec![4.5]);
    }
}
