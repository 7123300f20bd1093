use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draw `num_samples` class indices per row of `[batch, num_classes]`
/// logits (or probabilities when `normalized`). The same seed always yields
/// the same samples.
pub fn multinomial(logits: &[f32], num_classes: usize, num_samples: usize, normalized: bool, seed: u64) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(seed);
    if num_classes == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(logits.len() / num_classes * num_samples);
    for row in logits.chunks(num_classes) {
        let probs = if normalized {
            row.to_vec()
        } else {
            softmax(row)
        };
        let mut cdf = Vec::with_capacity(num_classes);
        let mut acc = 0f32;
        for p in &probs {
            acc += p;
            cdf.push(acc);
        }
        for _ in 0..num_samples {
            let r: f32 = rng.gen::<f32>() * acc;
            let class = cdf.iter().position(|&c| r < c).unwrap_or(num_classes - 1);
            out.push(class as i32);
        }
    }
    out
}

fn softmax(row: &[f32]) -> Vec<f32> {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
