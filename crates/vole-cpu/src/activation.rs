use std::fmt;
use std::str::FromStr;

use vole_core::Error;

use crate::unary::{elu, relu, sigmoid};

/// Activation applied at the tail of a fused matmul or convolution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Relu6,
    Elu,
    LeakyRelu(f32),
    /// Per-channel slope taken from the extra `prelu_weights` input.
    Prelu,
    Sigmoid,
}

impl Activation {
    /// Apply in place. `Prelu` needs its weights and goes through
    /// [`Activation::apply_prelu`] instead; here it is a no-op.
    pub fn apply(&self, data: &mut [f32]) {
        let f: fn(f32) -> f32 = match *self {
            Activation::Linear | Activation::Prelu => return,
            Activation::Relu => relu,
            Activation::Relu6 => |x| relu(x).min(6.0),
            Activation::Elu => elu,
            Activation::Sigmoid => sigmoid,
            Activation::LeakyRelu(alpha) => {
                for v in data.iter_mut() {
                    if *v < 0.0 {
                        *v *= alpha;
                    }
                }
                return;
            }
        };
        for v in data.iter_mut() {
            *v = f(*v);
        }
    }

    /// `x < 0 ? alpha[c] * x : x` where `c` cycles over the last dimension.
    pub fn apply_prelu(data: &mut [f32], alpha: &[f32]) {
        if alpha.is_empty() {
            return;
        }
        for (i, v) in data.iter_mut().enumerate() {
            if *v < 0.0 {
                *v *= alpha[i % alpha.len()];
            }
        }
    }
}

impl FromStr for Activation {
    type Err = Error;

    /// Parse the lowercase activation names used by fused-op attributes.
    /// `leakyrelu` gets the default slope 0.2.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Activation::Linear),
            "relu" => Ok(Activation::Relu),
            "relu6" => Ok(Activation::Relu6),
            "elu" => Ok(Activation::Elu),
            "leakyrelu" => Ok(Activation::LeakyRelu(0.2)),
            "prelu" => Ok(Activation::Prelu),
            "sigmoid" => Ok(Activation::Sigmoid),
            other => Err(Error::UnsupportedActivation(other.to_string())),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Linear => "linear",
            Activation::Relu => "relu",
            Activation::Relu6 => "relu6",
            Activation::Elu => "elu",
            Activation::LeakyRelu(_) => "leakyrelu",
            Activation::Prelu => "prelu",
            Activation::Sigmoid => "sigmoid",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("relu6".parse::<Activation>().unwrap(), Activation::Relu6);
        assert_eq!(
            "leakyrelu".parse::<Activation>().unwrap(),
            Activation::LeakyRelu(0.2)
        );
        let err = "swish".parse::<Activation>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedActivation(ref n) if n == "swish"));
    }

    #[test]
    fn test_apply() {
        let mut v = [-2.0, 3.0, 8.0];
        Activation::Relu6.apply(&mut v);
        assert_eq!(v, [0.0, 3.0, 6.0]);

        let mut v = [-2.0, -2.0, 1.0, -4.0];
        Activation::apply_prelu(&mut v, &[0.5, 0.25]);
        assert_eq!(v, [-1.0, -0.5, 1.0, -1.0]);

        let mut v = [-1.0];
        Activation::LeakyRelu(0.1).apply(&mut v);
        assert!((v[0] + 0.1).abs() < 1e-7);
    }
}
