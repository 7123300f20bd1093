/// Batch normalization:
///
///   out = offset + (x - mean) * scale / sqrt(variance + epsilon)
///
/// Every parameter is either a single value or a vector cycled over the
/// flat index of `x` (per-channel for channels-last data). A missing
/// `offset` is 0 and a missing `scale` is 1.
pub fn batch_norm(
    x: &[f32],
    mean: &[f32],
    variance: &[f32],
    offset: Option<&[f32]>,
    scale: Option<&[f32]>,
    epsilon: f32,
) -> Vec<f32> {
    let cycle = |v: &[f32], i: usize, default: f32| {
        if v.is_empty() {
            default
        } else {
            v[i % v.len()]
        }
    };
    let offset = offset.unwrap_or(&[]);
    let scale = scale.unwrap_or(&[]);
    x.iter()
        .enumerate()
        .map(|(i, &v)| {
            let m = cycle(mean, i, 0.0);
            let var = cycle(variance, i, 1.0);
            cycle(offset, i, 0.0) + (v - m) * cycle(scale, i, 1.0) / (var + epsilon).sqrt()
        })
        .collect()
}
