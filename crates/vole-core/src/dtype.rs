use std::cmp::Ordering;
use std::fmt;

// DType - Supported element types
//
// Every buffer has a DType that determines how kernels read it:
//
//   F32       - 32-bit float, the default workhorse
//   I32       - signed 32-bit int, for indices and integer arithmetic
//   Bool      - masks and comparison results
//   Complex64 - pair of F32 buffers (real, imag) owned by a parent handle
//   String    - variable-length UTF-8 byte sequences, one per element

/// Enum of all supported element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    I32,
    Bool,
    Complex64,
    String,
}

impl DType {
    /// Size of one element in bytes. Strings have no fixed width.
    pub fn size_in_bytes(&self) -> Option<usize> {
        match self {
            DType::F32 | DType::I32 => Some(4),
            DType::Bool => Some(1),
            DType::Complex64 => Some(8),
            DType::String => None,
        }
    }

    /// Whether arithmetic kernels accept this dtype.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, DType::String)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::Complex64)
    }

    /// Rank in the promotion lattice `Bool < I32 < F32 < Complex64`.
    fn promotion_rank(&self) -> u8 {
        match self {
            DType::Bool => 0,
            DType::I32 => 1,
            DType::F32 => 2,
            DType::Complex64 => 3,
            DType::String => 4,
        }
    }

    /// The dtype both operands of a binary op are cast to.
    ///
    /// Bool operands promote to I32 for arithmetic, so `upcast(Bool, Bool)`
    /// is I32. Strings never promote.
    pub fn upcast(a: DType, b: DType) -> crate::Result<DType> {
        if a == DType::String || b == DType::String {
            if a == b {
                return Ok(DType::String);
            }
            return Err(crate::Error::DTypeMismatch {
                expected: a,
                got: b,
            });
        }
        let hi = if a.promotion_rank() >= b.promotion_rank() {
            a
        } else {
            b
        };
        Ok(if hi == DType::Bool { DType::I32 } else { hi })
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F32 => "float32",
            DType::I32 => "int32",
            DType::Bool => "bool",
            DType::Complex64 => "complex64",
            DType::String => "string",
        };
        write!(f, "{}", s)
    }
}

// Element - Trait that connects Rust number types to DType
//
// Kernels that work on both F32 and I32 buffers are written once, generic
// over `T: Element`, and the dispatcher picks the instantiation from the
// buffer's DType.

/// Numeric element stored in a real buffer.
pub trait Element:
    Copy + Default + PartialOrd + Send + Sync + 'static + fmt::Debug + num_traits::NumCast
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    fn as_f64(self) -> f64;

    fn from_f64(v: f64) -> Self;

    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    fn one() -> Self {
        Self::from_f64(1.0)
    }

    /// Whether this value is NaN (always false for integers).
    fn is_nan(self) -> bool {
        false
    }

    /// Smallest representable value, the identity for `max`.
    fn lowest() -> Self;

    /// Largest representable value, the identity for `min`.
    fn highest() -> Self;

    /// Addition that wraps on integer overflow.
    fn wrapping_add(self, rhs: Self) -> Self;

    /// Multiplication that wraps on integer overflow.
    fn wrapping_mul(self, rhs: Self) -> Self;

    /// Total order used for sorting: NaN compares equal to NaN and greater
    /// than every number.
    fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self.is_nan(), other.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.partial_cmp(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
    fn as_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
    fn lowest() -> Self {
        f32::NEG_INFINITY
    }
    fn highest() -> Self {
        f32::INFINITY
    }
    fn wrapping_add(self, rhs: Self) -> Self {
        self + rhs
    }
    fn wrapping_mul(self, rhs: Self) -> Self {
        self * rhs
    }
}

impl Element for i32 {
    const DTYPE: DType = DType::I32;
    fn as_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as i32
    }
    fn lowest() -> Self {
        i32::MIN
    }
    fn highest() -> Self {
        i32::MAX
    }
    fn wrapping_add(self, rhs: Self) -> Self {
        i32::wrapping_add(self, rhs)
    }
    fn wrapping_mul(self, rhs: Self) -> Self {
        i32::wrapping_mul(self, rhs)
    }
}
