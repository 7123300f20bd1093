use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::str::FromStr;

use vole_core::{bail, Element, Error, Result};

// Image kernels
//
// Images are NHWC f32. Sampling coordinates are computed in f32 and mapped
// back into the image according to a fill mode before reading.

/// Sampling used by [`transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

impl FromStr for Interpolation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nearest" => Ok(Interpolation::Nearest),
            "bilinear" => Ok(Interpolation::Bilinear),
            other => bail!("unknown interpolation '{other}'"),
        }
    }
}

/// How coordinates outside the image are mapped back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    /// Read `fill_value` outside the image.
    #[default]
    Constant,
    Reflect,
    Wrap,
    Nearest,
}

impl FromStr for FillMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "constant" => Ok(FillMode::Constant),
            "reflect" => Ok(FillMode::Reflect),
            "wrap" => Ok(FillMode::Wrap),
            "nearest" => Ok(FillMode::Nearest),
            other => bail!("unknown fill mode '{other}'"),
        }
    }
}

fn map_coord(c: f32, len: usize, mode: FillMode) -> f32 {
    let len_f = len as f32;
    let max = len_f - 1.0;
    let mapped = match mode {
        FillMode::Constant => return c,
        FillMode::Nearest => c,
        FillMode::Reflect => {
            let mut c = c;
            if len <= 1 {
                if c < 0.0 || c > max {
                    c = 0.0;
                }
            } else if c < 0.0 {
                let sz2 = 2.0 * len_f;
                if c < sz2 {
                    c += sz2 * (-c / sz2).trunc();
                }
                c = if c < -len_f { c + sz2 } else { -c - 1.0 };
            } else if c > max {
                let sz2 = 2.0 * len_f;
                c -= sz2 * (c / sz2).trunc();
                if c >= len_f {
                    c = sz2 - c - 1.0;
                }
            }
            c
        }
        FillMode::Wrap => {
            let mut c = c;
            if len <= 1 {
                if c < 0.0 || c > max {
                    c = 0.0;
                }
            } else if c < 0.0 {
                let sz = len_f - 1.0;
                c += len_f * ((-c / sz).trunc() + 1.0);
            } else if c > max {
                let sz = len_f - 1.0;
                c -= len_f * (c / sz).trunc();
            }
            c
        }
    };
    mapped.clamp(0.0, max.max(0.0))
}

/// Options for [`transform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformOptions {
    pub interpolation: Interpolation,
    pub fill_mode: FillMode,
    pub fill_value: f32,
    pub out_height: usize,
    pub out_width: usize,
}

/// Apply a projective transform to every image in the batch.
///
/// `transforms` holds 8 coefficients `[a0, a1, a2, b0, b1, b2, c0, c1]` per
/// batch (or one row shared by all). Output pixel `(x, y)` samples input
/// `((a0 x + a1 y + a2) / k, (b0 x + b1 y + b2) / k)` with
/// `k = c0 x + c1 y + 1`.
pub fn transform(images: &[f32], dims: [usize; 4], transforms: &[f32], opts: &TransformOptions) -> Result<Vec<f32>> {
    let [batch, height, width, channels] = dims;
    let rows = transforms.len() / 8;
    if transforms.len() % 8 != 0 || (rows != 1 && rows != batch) {
        bail!(
            "transform: expected transforms of shape [1, 8] or [{batch}, 8], got {} values",
            transforms.len()
        );
    }
    let (oh, ow) = (opts.out_height, opts.out_width);
    let image_len = height * width * channels;
    let mut out = Vec::with_capacity(batch * oh * ow * channels);

    for b in 0..batch {
        let t = &transforms[(if rows == 1 { 0 } else { b }) * 8..][..8];
        let img = &images[b * image_len..(b + 1) * image_len];
        let read = |y: f32, x: f32, c: usize| -> f32 {
            if y >= 0.0 && x >= 0.0 && (y as usize) < height && (x as usize) < width {
                img[((y as usize) * width + x as usize) * channels + c]
            } else {
                opts.fill_value
            }
        };
        for oy in 0..oh {
            for ox in 0..ow {
                let (xf, yf) = (ox as f32, oy as f32);
                let k = t[6] * xf + t[7] * yf + 1.0;
                for c in 0..channels {
                    if k == 0.0 {
                        out.push(opts.fill_value);
                        continue;
                    }
                    let in_x = (t[0] * xf + t[1] * yf + t[2]) / k;
                    let in_y = (t[3] * xf + t[4] * yf + t[5]) / k;
                    let x = map_coord(in_x, width, opts.fill_mode);
                    let y = map_coord(in_y, height, opts.fill_mode);
                    let v = match opts.interpolation {
                        Interpolation::Nearest => read(y.round(), x.round(), c),
                        Interpolation::Bilinear => {
                            let (y0, x0) = (y.floor(), x.floor());
                            let (y1, x1) = (y0 + 1.0, x0 + 1.0);
                            let top = (x1 - x) * read(y0, x0, c) + (x - x0) * read(y0, x1, c);
                            let bottom = (x1 - x) * read(y1, x0, c) + (x - x0) * read(y1, x1, c);
                            (y1 - y) * top + (y - y0) * bottom
                        }
                    };
                    out.push(v);
                }
            }
        }
    }
    Ok(out)
}

/// Options shared by the resize kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOptions {
    pub new_height: usize,
    pub new_width: usize,
    pub align_corners: bool,
    pub half_pixel_centers: bool,
}

impl ResizeOptions {
    fn scale(&self, old: usize, new: usize) -> f32 {
        let (eff_in, eff_out) = if self.align_corners && new > 1 {
            (old.saturating_sub(1), new - 1)
        } else {
            (old, new)
        };
        if eff_out == 0 {
            0.0
        } else {
            eff_in as f32 / eff_out as f32
        }
    }
}

/// Bilinear resize of `[N, H, W, C]` to `[N, new_h, new_w, C]`.
pub fn resize_bilinear(images: &[f32], dims: [usize; 4], opts: &ResizeOptions) -> Vec<f32> {
    let [batch, h, w, c] = dims;
    let (nh, nw) = (opts.new_height, opts.new_width);
    let hs = opts.scale(h, nh);
    let ws = opts.scale(w, nw);
    let source = |i: usize, scale: f32, limit: usize| -> (usize, usize, f32) {
        let frac = if opts.half_pixel_centers {
            scale * (i as f32 + 0.5) - 0.5
        } else {
            scale * i as f32
        };
        let lo = frac.floor().max(0.0);
        let hi = (frac.ceil() as usize).min(limit.saturating_sub(1));
        (lo as usize, hi, frac - lo)
    };
    let mut out = Vec::with_capacity(batch * nh * nw * c);
    for b in 0..batch {
        let img = &images[b * h * w * c..(b + 1) * h * w * c];
        let at = |y: usize, x: usize, ch: usize| img[(y * w + x) * c + ch];
        for r in 0..nh {
            let (r0, r1, rf) = source(r, hs, h);
            for col in 0..nw {
                let (c0, c1, cf) = source(col, ws, w);
                for ch in 0..c {
                    let top = at(r0, c0, ch) + (at(r0, c1, ch) - at(r0, c0, ch)) * cf;
                    let bottom = at(r1, c0, ch) + (at(r1, c1, ch) - at(r1, c0, ch)) * cf;
                    out.push(top + (bottom - top) * rf);
                }
            }
        }
    }
    out
}

/// Nearest-neighbor resize of `[N, H, W, C]` to `[N, new_h, new_w, C]`.
pub fn resize_nearest_neighbor<T: Copy>(images: &[T], dims: [usize; 4], opts: &ResizeOptions) -> Vec<T> {
    let [batch, h, w, c] = dims;
    let (nh, nw) = (opts.new_height, opts.new_width);
    let hs = opts.scale(h, nh);
    let ws = opts.scale(w, nw);
    let nearest = |i: usize, scale: f32, limit: usize| -> usize {
        let frac = if opts.half_pixel_centers {
            scale * (i as f32 + 0.5)
        } else {
            scale * i as f32
        };
        let src = if opts.align_corners {
            (frac + 0.5).floor()
        } else {
            frac.floor()
        };
        (src.max(0.0) as usize).min(limit.saturating_sub(1))
    };
    let mut out = Vec::with_capacity(batch * nh * nw * c);
    for b in 0..batch {
        let img = &images[b * h * w * c..(b + 1) * h * w * c];
        for r in 0..nh {
            let sr = nearest(r, hs, h);
            for col in 0..nw {
                let sc = nearest(col, ws, w);
                let off = (sr * w + sc) * c;
                out.extend_from_slice(&img[off..off + c]);
            }
        }
    }
    out
}

/// Options for [`non_max_suppression`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsOptions {
    pub max_output_size: usize,
    pub iou_threshold: f32,
    pub score_threshold: f32,
    /// Gaussian soft-NMS width; 0 disables soft suppression.
    pub soft_nms_sigma: f32,
    pub pad_to_max_output_size: bool,
}

/// Output of [`non_max_suppression`].
#[derive(Debug, Clone, PartialEq)]
pub struct NmsResult {
    pub selected_indices: Vec<i32>,
    pub selected_scores: Vec<f32>,
    /// Number of real (non-padding) selections.
    pub valid_outputs: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    index: usize,
    suppress_begin: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Higher score first; on ties the lower box index wins.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .sort_cmp(&other.score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

fn iou(boxes: &[f32], i: usize, j: usize) -> f32 {
    let a = &boxes[i * 4..i * 4 + 4];
    let b = &boxes[j * 4..j * 4 + 4];
    let (ay0, ay1) = (a[0].min(a[2]), a[0].max(a[2]));
    let (ax0, ax1) = (a[1].min(a[3]), a[1].max(a[3]));
    let (by0, by1) = (b[0].min(b[2]), b[0].max(b[2]));
    let (bx0, bx1) = (b[1].min(b[3]), b[1].max(b[3]));
    let area_a = (ay1 - ay0) * (ax1 - ax0);
    let area_b = (by1 - by0) * (bx1 - bx0);
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }
    let iy = (ay1.min(by1) - ay0.max(by0)).max(0.0);
    let ix = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
    let inter = iy * ix;
    inter / (area_a + area_b - inter)
}

/// Greedy (optionally soft) non-max suppression over `[num_boxes, 4]`
/// boxes given as `[y1, x1, y2, x2]`.
pub fn non_max_suppression(boxes: &[f32], scores: &[f32], opts: &NmsOptions) -> Result<NmsResult> {
    if boxes.len() != scores.len() * 4 {
        bail!(
            "non_max_suppression: {} scores need {} box coordinates, got {}",
            scores.len(),
            scores.len() * 4,
            boxes.len()
        );
    }
    let scale = if opts.soft_nms_sigma > 0.0 {
        -0.5 / opts.soft_nms_sigma
    } else {
        0.0
    };
    let mut queue: BinaryHeap<Candidate> = scores
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s > opts.score_threshold)
        .map(|(index, &score)| Candidate {
            score,
            index,
            suppress_begin: 0,
        })
        .collect();

    let mut selected: Vec<usize> = Vec::new();
    let mut selected_scores = Vec::new();
    while selected.len() < opts.max_output_size {
        let Some(mut cand) = queue.pop() else { break };
        let original = cand.score;
        if cand.score < opts.score_threshold {
            break;
        }
        let mut ignore = false;
        for j in (cand.suppress_begin..selected.len()).rev() {
            let overlap = iou(boxes, cand.index, selected[j]);
            if overlap >= opts.iou_threshold {
                ignore = true;
                break;
            }
            let weight = if overlap <= opts.iou_threshold {
                (scale * overlap * overlap).exp()
            } else {
                0.0
            };
            cand.score *= weight;
            if cand.score <= opts.score_threshold {
                break;
            }
        }
        cand.suppress_begin = selected.len();
        if !ignore {
            if cand.score == original {
                selected.push(cand.index);
                selected_scores.push(cand.score);
            } else if cand.score > opts.score_threshold {
                queue.push(cand);
            }
        }
    }

    let valid_outputs = selected.len();
    let mut selected_indices: Vec<i32> = selected.into_iter().map(|i| i as i32).collect();
    if opts.pad_to_max_output_size {
        selected_indices.resize(opts.max_output_size, 0);
        selected_scores.resize(opts.max_output_size, 0.0);
    }
    Ok(NmsResult {
        selected_indices,
        selected_scores,
        valid_outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_opts(mode: FillMode, interpolation: Interpolation) -> TransformOptions {
        TransformOptions {
            interpolation,
            fill_mode: mode,
            fill_value: -1.0,
            out_height: 2,
            out_width: 2,
        }
    }

    #[test]
    fn test_transform_processes_every_batch() {
        let images = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        // identity for both batches
        let t = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let out = transform(&images, [2, 2, 2, 1], &t, &identity_opts(FillMode::Constant, Interpolation::Nearest))
            .unwrap();
        assert_eq!(out, images.to_vec());
    }

    #[test]
    fn test_transform_shift_fill_modes() {
        let images = [1.0, 2.0, 3.0, 4.0];
        // shift right by one: in_x = x - 1
        let t = [1.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let constant =
            transform(&images, [1, 2, 2, 1], &t, &identity_opts(FillMode::Constant, Interpolation::Nearest)).unwrap();
        assert_eq!(constant, vec![-1.0, 1.0, -1.0, 3.0]);
        let nearest =
            transform(&images, [1, 2, 2, 1], &t, &identity_opts(FillMode::Nearest, Interpolation::Bilinear)).unwrap();
        assert_eq!(nearest, vec![1.0, 1.0, 3.0, 3.0]);
    }

    #[test]
    fn test_map_coord_reflect_and_wrap() {
        assert_eq!(map_coord(-1.0, 4, FillMode::Reflect), 0.0);
        assert_eq!(map_coord(4.0, 4, FillMode::Reflect), 3.0);
        assert_eq!(map_coord(5.0, 4, FillMode::Reflect), 2.0);
        assert_eq!(map_coord(4.0, 4, FillMode::Wrap), 0.0);
    }

    #[test]
    fn test_resize_bilinear_upsample() {
        let opts = ResizeOptions {
            new_height: 1,
            new_width: 4,
            align_corners: false,
            half_pixel_centers: false,
        };
        let out = resize_bilinear(&[0.0, 4.0], [1, 1, 2, 1], &opts);
        assert_eq!(out, vec![0.0, 2.0, 4.0, 4.0]);

        let aligned = ResizeOptions {
            align_corners: true,
            new_width: 3,
            ..opts
        };
        assert_eq!(resize_bilinear(&[0.0, 4.0], [1, 1, 2, 1], &aligned), vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_resize_nearest() {
        let opts = ResizeOptions {
            new_height: 2,
            new_width: 2,
            align_corners: false,
            half_pixel_centers: false,
        };
        let out = resize_nearest_neighbor(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16], [1, 4, 4, 1], &opts);
        assert_eq!(out, vec![1, 3, 9, 11]);
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let boxes = [
            0.0, 0.0, 1.0, 1.0, //
            0.0, 0.1, 1.0, 1.1, //
            0.0, -0.1, 1.0, 0.9, //
            0.0, 10.0, 1.0, 11.0, //
            0.0, 10.1, 1.0, 11.1, //
            0.0, 100.0, 1.0, 101.0,
        ];
        let scores = [0.9, 0.75, 0.6, 0.95, 0.5, 0.3];
        let opts = NmsOptions {
            max_output_size: 3,
            iou_threshold: 0.5,
            score_threshold: 0.0,
            soft_nms_sigma: 0.0,
            pad_to_max_output_size: false,
        };
        let res = non_max_suppression(&boxes, &scores, &opts).unwrap();
        assert_eq!(res.selected_indices, vec![3, 0, 5]);
        assert_eq!(res.valid_outputs, 3);

        let padded = non_max_suppression(
            &boxes,
            &scores,
            &NmsOptions {
                max_output_size: 5,
                pad_to_max_output_size: true,
                ..opts
            },
        )
        .unwrap();
        assert_eq!(padded.selected_indices, vec![3, 0, 5, 0, 0]);
        assert_eq!(padded.valid_outputs, 3);
    }
}
