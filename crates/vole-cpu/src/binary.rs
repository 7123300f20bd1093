use num_complex::Complex32;
use vole_core::{Error, Result, Shape};

// Binary element-wise kernels
//
// Every binary op goes through one broadcasting template:
//
//   1. out_shape = broadcast_shape(a, b)
//   2. same shape?  zip the two buffers directly (fast path)
//   3. otherwise for each flat output index:
//        loc    = out.index_to_loc(i)
//        loc_a  = trailing rank(a) coords of loc, broadcast dims zeroed
//        loc_b  = same for b
//        out[i] = f(a[loc_to_index(loc_a)], b[loc_to_index(loc_b)])
//
// Complex operands use a second template that walks real and imaginary
// planes together and applies complex arithmetic.

/// Arithmetic binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    RealDiv,
    FloorDiv,
    Mod,
    Pow,
    Maximum,
    Minimum,
    SquaredDifference,
    Atan2,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Sub",
            BinaryOp::Mul => "Mul",
            BinaryOp::RealDiv => "RealDiv",
            BinaryOp::FloorDiv => "FloorDiv",
            BinaryOp::Mod => "Mod",
            BinaryOp::Pow => "Pow",
            BinaryOp::Maximum => "Maximum",
            BinaryOp::Minimum => "Minimum",
            BinaryOp::SquaredDifference => "SquaredDifference",
            BinaryOp::Atan2 => "Atan2",
        }
    }

    /// Ops whose integer result is not representable as an integer.
    pub fn is_float_only(&self) -> bool {
        matches!(self, BinaryOp::RealDiv | BinaryOp::Atan2)
    }

    pub fn apply_f32(&self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::RealDiv => a / b,
            BinaryOp::FloorDiv => (a / b).floor(),
            BinaryOp::Mod => floor_mod_f32(a, b),
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Maximum => {
                if a.is_nan() || b.is_nan() {
                    f32::NAN
                } else {
                    a.max(b)
                }
            }
            BinaryOp::Minimum => {
                if a.is_nan() || b.is_nan() {
                    f32::NAN
                } else {
                    a.min(b)
                }
            }
            BinaryOp::SquaredDifference => (a - b) * (a - b),
            BinaryOp::Atan2 => a.atan2(b),
        }
    }

    /// Integer semantics. Division and modulo by zero produce 0.
    pub fn apply_i32(&self, a: i32, b: i32) -> i32 {
        match self {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::RealDiv | BinaryOp::Atan2 => {
                self.apply_f32(a as f32, b as f32) as i32
            }
            BinaryOp::FloorDiv => floor_div_i32(a, b),
            BinaryOp::Mod => floor_mod_i32(a, b),
            BinaryOp::Pow => {
                if b >= 0 {
                    a.wrapping_pow(b as u32)
                } else {
                    (a as f64).powi(b) as i32
                }
            }
            BinaryOp::Maximum => a.max(b),
            BinaryOp::Minimum => a.min(b),
            BinaryOp::SquaredDifference => {
                let d = a.wrapping_sub(b);
                d.wrapping_mul(d)
            }
        }
    }

    /// Complex arithmetic, only defined for the four field operations.
    pub fn apply_complex(&self, a: Complex32, b: Complex32) -> Option<Complex32> {
        match self {
            BinaryOp::Add => Some(a + b),
            BinaryOp::Sub => Some(a - b),
            BinaryOp::Mul => Some(a * b),
            BinaryOp::RealDiv => Some(a / b),
            _ => None,
        }
    }
}

/// Floored division: rounds toward negative infinity, so `-7 / 2 == -4`.
pub fn floor_div_i32(a: i32, b: i32) -> i32 {
    if b == 0 {
        return 0;
    }
    let q = a.wrapping_div(b);
    if (a.wrapping_rem(b) != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Floored modulo: the result takes the sign of the divisor, so
/// `mod(-7, 2) == 1`.
pub fn floor_mod_i32(a: i32, b: i32) -> i32 {
    if b == 0 {
        return 0;
    }
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        r + b
    } else {
        r
    }
}

pub fn floor_mod_f32(a: f32, b: f32) -> f32 {
    let r = a % b;
    if (a < 0.0 && b < 0.0) || (a >= 0.0 && b >= 0.0) {
        r
    } else {
        (r + b) % b
    }
}

/// Comparison operations producing bool outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl CmpOp {
    pub fn name(&self) -> &'static str {
        match self {
            CmpOp::Equal => "Equal",
            CmpOp::NotEqual => "NotEqual",
            CmpOp::Less => "Less",
            CmpOp::LessEqual => "LessEqual",
            CmpOp::Greater => "Greater",
            CmpOp::GreaterEqual => "GreaterEqual",
        }
    }

    pub fn apply<T: PartialOrd>(&self, a: T, b: T) -> bool {
        match self {
            CmpOp::Equal => a == b,
            CmpOp::NotEqual => a != b,
            CmpOp::Less => a < b,
            CmpOp::LessEqual => a <= b,
            CmpOp::Greater => a > b,
            CmpOp::GreaterEqual => a >= b,
        }
    }
}

/// Boolean connectives over bool inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOp::And => "LogicalAnd",
            LogicalOp::Or => "LogicalOr",
        }
    }

    pub fn apply(&self, a: bool, b: bool) -> bool {
        match self {
            LogicalOp::And => a && b,
            LogicalOp::Or => a || b,
        }
    }
}

// Broadcasting template

/// Per-operand index mapping from output coordinates to a flat input offset.
struct BroadcastIndex {
    shape: Shape,
    strides: Vec<usize>,
    broadcast_dims: Vec<usize>,
    loc: Vec<usize>,
}

impl BroadcastIndex {
    fn new(shape: &Shape, out: &Shape) -> Self {
        Self {
            shape: shape.clone(),
            strides: shape.stride_contiguous(),
            broadcast_dims: shape.broadcast_dims(out),
            loc: vec![0; shape.rank()],
        }
    }

    /// Flat input offset for the output coordinate `out_loc`.
    fn index(&mut self, out_loc: &[usize]) -> usize {
        let rank = self.shape.rank();
        let lead = out_loc.len() - rank;
        self.loc.copy_from_slice(&out_loc[lead..]);
        for &d in &self.broadcast_dims {
            self.loc[d] = 0;
        }
        Shape::loc_to_index(&self.loc, &self.strides)
    }
}

/// Apply `f` element-wise over two broadcast-compatible operands.
///
/// Returns the output values and the broadcast output shape.
pub fn broadcast_binary<A, B, O, F>(
    a: &[A],
    a_shape: &Shape,
    b: &[B],
    b_shape: &Shape,
    f: F,
) -> Result<(Vec<O>, Shape)>
where
    A: Copy,
    B: Copy,
    F: Fn(A, B) -> O,
{
    check_len(a, a_shape)?;
    check_len(b, b_shape)?;
    let out_shape = Shape::broadcast_shape(a_shape, b_shape)?;

    if a_shape == b_shape {
        let out = a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect();
        return Ok((out, out_shape));
    }

    let size = out_shape.elem_count();
    let out_strides = out_shape.stride_contiguous();
    let mut a_index = BroadcastIndex::new(a_shape, &out_shape);
    let mut b_index = BroadcastIndex::new(b_shape, &out_shape);
    let mut loc = vec![0usize; out_shape.rank()];
    let mut out = Vec::with_capacity(size);
    for i in 0..size {
        out_shape.index_to_loc_into(i, &out_strides, &mut loc);
        let ai = a_index.index(&loc);
        let bi = b_index.index(&loc);
        out.push(f(a[ai], b[bi]));
    }
    Ok((out, out_shape))
}

/// Complex broadcasting template over split real/imaginary planes.
///
/// Returns `(real, imag, shape)` of the result.
#[allow(clippy::type_complexity)]
pub fn broadcast_complex_binary<F>(
    a: (&[f32], &[f32]),
    a_shape: &Shape,
    b: (&[f32], &[f32]),
    b_shape: &Shape,
    f: F,
) -> Result<(Vec<f32>, Vec<f32>, Shape)>
where
    F: Fn(Complex32, Complex32) -> Complex32,
{
    let a_vals: Vec<Complex32> = interleave(a.0, a.1);
    let b_vals: Vec<Complex32> = interleave(b.0, b.1);
    let (out, shape) = broadcast_binary(&a_vals, a_shape, &b_vals, b_shape, f)?;
    let (re, im) = deinterleave(&out);
    Ok((re, im, shape))
}

pub fn interleave(re: &[f32], im: &[f32]) -> Vec<Complex32> {
    re.iter()
        .zip(im)
        .map(|(&r, &i)| Complex32::new(r, i))
        .collect()
}

pub fn deinterleave(values: &[Complex32]) -> (Vec<f32>, Vec<f32>) {
    values.iter().map(|c| (c.re, c.im)).unzip()
}

fn check_len<T>(data: &[T], shape: &Shape) -> Result<()> {
    if data.len() != shape.elem_count() {
        return Err(Error::ElementCountMismatch {
            shape: shape.clone(),
            expected: shape.elem_count(),
            got: data.len(),
        });
    }
    Ok(())
}

/// `cond ? a : b`. `cond` either matches `a`'s shape, is a scalar picking
/// a whole branch, or is a vector picking whole rows along `a`'s first
/// dimension.
pub fn select<T: Clone>(cond: &[bool], cond_shape: &Shape, a: &[T], b: &[T], shape: &Shape) -> Result<Vec<T>> {
    if a.len() != b.len() {
        return Err(Error::msg(format!(
            "select: branches have {} and {} elements",
            a.len(),
            b.len()
        )));
    }
    if cond_shape.rank() == 0 && cond.len() == 1 {
        return Ok(if cond[0] { a.to_vec() } else { b.to_vec() });
    }
    if cond_shape == shape {
        return Ok((0..a.len())
            .map(|i| if cond[i] { a[i].clone() } else { b[i].clone() })
            .collect());
    }
    if cond_shape.rank() == 1 && shape.rank() >= 1 && cond.len() == shape.dims()[0] {
        let row = if cond.is_empty() { 0 } else { a.len() / cond.len() };
        return Ok((0..a.len())
            .map(|i| {
                if cond[i / row.max(1)] {
                    a[i].clone()
                } else {
                    b[i].clone()
                }
            })
            .collect());
    }
    Err(Error::ShapeMismatch {
        expected: shape.clone(),
        got: cond_shape.clone(),
    })
}
