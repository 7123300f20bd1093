use vole_core::{Error, Result, Shape, TensorInfo};
use vole_cpu::random;

use super::wrong_op;
use crate::engine::Engine;
use crate::op::Op;

/// Categorical samples from `[batch, classes]` (or `[classes]`) logits.
pub(crate) fn multinomial(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::Multinomial(attrs) = op else {
        return Err(wrong_op("multinomial", op));
    };
    let logits = &inputs[0];
    let (batch, classes) = match *logits.dims() {
        [c] => (None, c),
        [b, c] => (Some(b), c),
        _ => {
            return Err(Error::RankMismatch {
                op: "Multinomial",
                expected: 2,
                got: logits.rank(),
            })
        }
    };
    if classes == 0 {
        return Err(Error::InvalidSize {
            op: "Multinomial",
            value: 0,
            reason: "need at least one class".into(),
        });
    }
    let data = engine.read_f32(logits)?;
    let samples = random::multinomial(&data, classes, attrs.num_samples, attrs.normalized, attrs.seed);
    let shape = match batch {
        Some(b) => Shape::from((b, attrs.num_samples)),
        None => Shape::from(attrs.num_samples),
    };
    Ok(vec![engine.write_i32(samples, shape)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::MultinomialAttrs;

    #[test]
    fn test_multinomial_is_seeded() {
        let mut e = Engine::default();
        let logits = e.tensor_f32(vec![0.0, 1.0, 2.0, 0.5, 0.5, 0.5], (2, 3)).unwrap();
        let op = Op::Multinomial(MultinomialAttrs {
            num_samples: 16,
            seed: 7,
            normalized: false,
        });
        let a = e.execute_one(&op, &[logits.clone()]).unwrap();
        let b = e.execute_one(&op, &[logits]).unwrap();
        assert_eq!(a.dims(), &[2, 16]);
        let samples = e.read_i32(&a).unwrap();
        assert_eq!(samples, e.read_i32(&b).unwrap());
        assert!(samples.iter().all(|&s| (0..3).contains(&s)));
    }

    #[test]
    fn test_multinomial_degenerate_probs() {
        let mut e = Engine::default();
        let probs = e.tensor_f32(vec![0.0, 1.0, 0.0], 3).unwrap();
        let op = Op::Multinomial(MultinomialAttrs {
            num_samples: 5,
            seed: 1,
            normalized: true,
        });
        let y = e.execute_one(&op, &[probs]).unwrap();
        assert_eq!(y.dims(), &[5]);
        assert_eq!(e.read_i32(&y).unwrap(), vec![1; 5]);
    }
}
