// Unary element-wise kernels
//
// One enum covers every single-input math op. Float inputs map through
// `apply_f32`; integer inputs keep their dtype for the ops in
// `preserves_int` and are promoted to f32 otherwise. Predicates (IsNan,
// IsInf, IsFinite) produce bool outputs.

const SELU_SCALE: f32 = 1.050_700_987_355_480_5;
const SELU_ALPHA: f32 = 1.673_263_242_354_377_2;

/// Element-wise unary math operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Abs,
    Neg,
    Exp,
    Expm1,
    Log,
    Log1p,
    Sqrt,
    Rsqrt,
    Square,
    Reciprocal,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Sigmoid,
    Softplus,
    Relu,
    Relu6,
    Elu,
    Selu,
    Erf,
    Sign,
    Floor,
    Ceil,
    /// Round half to even.
    Round,
    LeakyRelu(f32),
    /// `x > 0 ? 1 : alpha`
    Step(f32),
    ClipByValue { min: f32, max: f32 },
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Abs => "Abs",
            UnaryOp::Neg => "Neg",
            UnaryOp::Exp => "Exp",
            UnaryOp::Expm1 => "Expm1",
            UnaryOp::Log => "Log",
            UnaryOp::Log1p => "Log1p",
            UnaryOp::Sqrt => "Sqrt",
            UnaryOp::Rsqrt => "Rsqrt",
            UnaryOp::Square => "Square",
            UnaryOp::Reciprocal => "Reciprocal",
            UnaryOp::Sin => "Sin",
            UnaryOp::Cos => "Cos",
            UnaryOp::Tan => "Tan",
            UnaryOp::Asin => "Asin",
            UnaryOp::Acos => "Acos",
            UnaryOp::Atan => "Atan",
            UnaryOp::Sinh => "Sinh",
            UnaryOp::Cosh => "Cosh",
            UnaryOp::Tanh => "Tanh",
            UnaryOp::Asinh => "Asinh",
            UnaryOp::Acosh => "Acosh",
            UnaryOp::Atanh => "Atanh",
            UnaryOp::Sigmoid => "Sigmoid",
            UnaryOp::Softplus => "Softplus",
            UnaryOp::Relu => "Relu",
            UnaryOp::Relu6 => "Relu6",
            UnaryOp::Elu => "Elu",
            UnaryOp::Selu => "Selu",
            UnaryOp::Erf => "Erf",
            UnaryOp::Sign => "Sign",
            UnaryOp::Floor => "Floor",
            UnaryOp::Ceil => "Ceil",
            UnaryOp::Round => "Round",
            UnaryOp::LeakyRelu(_) => "LeakyRelu",
            UnaryOp::Step(_) => "Step",
            UnaryOp::ClipByValue { .. } => "ClipByValue",
        }
    }

    /// Ops that map integers to integers without leaving the I32 dtype.
    pub fn preserves_int(&self) -> bool {
        matches!(
            self,
            UnaryOp::Abs
                | UnaryOp::Neg
                | UnaryOp::Square
                | UnaryOp::Sign
                | UnaryOp::Floor
                | UnaryOp::Ceil
                | UnaryOp::Round
                | UnaryOp::Relu
                | UnaryOp::Relu6
        )
    }

    pub fn apply_f32(&self, x: f32) -> f32 {
        match *self {
            UnaryOp::Abs => x.abs(),
            UnaryOp::Neg => -x,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Expm1 => x.exp_m1(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Log1p => x.ln_1p(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Rsqrt => 1.0 / x.sqrt(),
            UnaryOp::Square => x * x,
            UnaryOp::Reciprocal => 1.0 / x,
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tan => x.tan(),
            UnaryOp::Asin => x.asin(),
            UnaryOp::Acos => x.acos(),
            UnaryOp::Atan => x.atan(),
            UnaryOp::Sinh => x.sinh(),
            UnaryOp::Cosh => x.cosh(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Asinh => x.asinh(),
            UnaryOp::Acosh => x.acosh(),
            UnaryOp::Atanh => x.atanh(),
            UnaryOp::Sigmoid => sigmoid(x),
            UnaryOp::Softplus => softplus(x),
            UnaryOp::Relu => relu(x),
            UnaryOp::Relu6 => relu(x).min(6.0),
            UnaryOp::Elu => elu(x),
            UnaryOp::Selu => {
                if x >= 0.0 {
                    SELU_SCALE * x
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp_m1()
                }
            }
            UnaryOp::Erf => erf(x),
            UnaryOp::Sign => sign(x),
            UnaryOp::Floor => x.floor(),
            UnaryOp::Ceil => x.ceil(),
            UnaryOp::Round => round_half_even(x),
            UnaryOp::LeakyRelu(alpha) => {
                if x < 0.0 {
                    alpha * x
                } else {
                    x
                }
            }
            UnaryOp::Step(alpha) => {
                if x.is_nan() {
                    f32::NAN
                } else if x > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            UnaryOp::ClipByValue { min, max } => {
                if x.is_nan() {
                    f32::NAN
                } else {
                    x.max(min).min(max)
                }
            }
        }
    }

    /// Integer path for the ops in [`UnaryOp::preserves_int`].
    pub fn apply_i32(&self, x: i32) -> i32 {
        match *self {
            UnaryOp::Abs => x.wrapping_abs(),
            UnaryOp::Neg => x.wrapping_neg(),
            UnaryOp::Square => x.wrapping_mul(x),
            UnaryOp::Sign => x.signum(),
            UnaryOp::Relu => x.max(0),
            UnaryOp::Relu6 => x.clamp(0, 6),
            UnaryOp::Floor | UnaryOp::Ceil | UnaryOp::Round => x,
            _ => self.apply_f32(x as f32) as i32,
        }
    }
}

/// Predicates that produce bool outputs from numeric inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateOp {
    IsNan,
    IsInf,
    IsFinite,
}

impl PredicateOp {
    pub fn name(&self) -> &'static str {
        match self {
            PredicateOp::IsNan => "IsNan",
            PredicateOp::IsInf => "IsInf",
            PredicateOp::IsFinite => "IsFinite",
        }
    }

    pub fn apply(&self, x: f32) -> bool {
        match self {
            PredicateOp::IsNan => x.is_nan(),
            PredicateOp::IsInf => x.is_infinite(),
            PredicateOp::IsFinite => x.is_finite(),
        }
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn relu(x: f32) -> f32 {
    if x < 0.0 {
        0.0
    } else {
        x
    }
}

pub fn elu(x: f32) -> f32 {
    if x >= 0.0 {
        x
    } else {
        x.exp_m1()
    }
}

fn sign(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Numerically stable softplus: `log(1 + exp(x))` with asymptotic cutoffs.
fn softplus(x: f32) -> f32 {
    let threshold = f32::EPSILON.ln() + 2.0;
    if x > -threshold {
        x
    } else if x < threshold {
        x.exp()
    } else {
        x.exp().ln_1p()
    }
}

pub fn round_half_even(x: f32) -> f32 {
    let base = x.floor();
    let diff = x - base;
    if diff < 0.5 {
        base
    } else if diff > 0.5 {
        base + 1.0
    } else if base % 2.0 == 0.0 {
        base
    } else {
        base + 1.0
    }
}

/// Abramowitz & Stegun 7.1.26, max error 1.5e-7.
fn erf(x: f32) -> f32 {
    const P: f32 = 0.327_591_1;
    const A1: f32 = 0.254_829_6;
    const A2: f32 = -0.284_496_74;
    const A3: f32 = 1.421_413_7;
    const A4: f32 = -1.453_152_1;
    const A5: f32 = 1.061_405_4;
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let v = x.abs();
    let t = 1.0 / (1.0 + P * v);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-v * v).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(0.5), 0.0);
        assert_eq!(round_half_even(1.5), 2.0);
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(-0.5), 0.0);
        assert_eq!(round_half_even(-1.5), -2.0);
        assert_eq!(round_half_even(2.4), 2.0);
    }

    #[test]
    fn test_activations() {
        assert_eq!(UnaryOp::Relu6.apply_f32(9.0), 6.0);
        assert_eq!(UnaryOp::Relu.apply_f32(-1.0), 0.0);
        assert_eq!(UnaryOp::LeakyRelu(0.2).apply_f32(-5.0), -1.0);
        assert_eq!(UnaryOp::Step(0.5).apply_f32(-1.0), 0.5);
        assert!((UnaryOp::Sigmoid.apply_f32(0.0) - 0.5).abs() < 1e-7);
        assert!((UnaryOp::Elu.apply_f32(-1.0) - (-0.632_120_56)).abs() < 1e-6);
    }

    #[test]
    fn test_erf_and_softplus() {
        assert!((erf(0.5) - 0.520_499_9).abs() < 1e-5);
        assert!((erf(-0.5) + 0.520_499_9).abs() < 1e-5);
        assert!((softplus(0.0) - 2f32.ln()).abs() < 1e-6);
        assert_eq!(softplus(100.0), 100.0);
    }

    #[test]
    fn test_clip_keeps_nan() {
        let op = UnaryOp::ClipByValue { min: 0.0, max: 1.0 };
        assert!(op.apply_f32(f32::NAN).is_nan());
        assert_eq!(op.apply_f32(3.0), 1.0);
        assert_eq!(op.apply_f32(-3.0), 0.0);
    }

    #[test]
    fn test_integer_path() {
        assert!(UnaryOp::Abs.preserves_int());
        assert!(!UnaryOp::Exp.preserves_int());
        assert_eq!(UnaryOp::Abs.apply_i32(-4), 4);
        assert_eq!(UnaryOp::Relu6.apply_i32(10), 6);
        assert_eq!(UnaryOp::Sign.apply_i32(-9), -1);
    }
}
