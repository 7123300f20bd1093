use crate::shape::Shape;
use crate::storage::DataId;

/// All errors that can occur within Vole.
///
/// Shape and contract violations, domain violations (bad indices, malformed
/// splits, unsorted segment ids) and storage misuse all surface here. Numeric
/// edge cases (NaN, division by zero) are never errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shape mismatch between two tensors.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Two shapes cannot be broadcast together.
    #[error("operands could not be broadcast together with shapes {a} and {b}")]
    BroadcastMismatch { a: Shape, b: Shape },

    /// Operation requires a specific rank.
    #[error("{op}: expected rank {expected}, got {got}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    /// DType mismatch between tensors that must agree.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch {
        expected: crate::DType,
        got: crate::DType,
    },

    /// An operator does not accept this dtype.
    #[error("{op} does not support dtype {dtype}")]
    UnsupportedDType {
        op: &'static str,
        dtype: crate::DType,
    },

    /// Axis index out of range for the tensor's rank.
    #[error("axis {axis} is out of range for tensor of rank {rank}")]
    DimOutOfRange { axis: isize, rank: usize },

    /// An index read from an index tensor falls outside its valid range.
    #[error("{op}: index {index} is out of range, expected [0, {limit})")]
    IndexOutOfRange {
        op: &'static str,
        index: i64,
        limit: usize,
    },

    /// A size or count argument is negative or otherwise invalid.
    #[error("{op}: invalid size {value}: {reason}")]
    InvalidSize {
        op: &'static str,
        value: i64,
        reason: String,
    },

    /// Element count mismatch when creating a tensor or reshaping.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Matrix multiplication inner dimension mismatch.
    #[error("matmul shape mismatch: [{m}x{k1}] @ [{k2}x{n}]")]
    MatmulShapeMismatch {
        m: usize,
        k1: usize,
        k2: usize,
        n: usize,
    },

    /// Fused op asked for an activation that does not exist.
    #[error("unsupported activation '{0}'")]
    UnsupportedActivation(String),

    /// Segment ids in a sparse segment reduction went backwards.
    #[error("segment ids are not increasing: id {current} at position {position} follows {previous}")]
    SegmentIdsNotSorted {
        position: usize,
        previous: i32,
        current: i32,
    },

    /// Ragged row-split boundaries are malformed.
    #[error("invalid splits: {0}")]
    InvalidSplits(String),

    /// A handle refers to a buffer that does not exist (or was already freed).
    #[error("unknown data id {0}")]
    UnknownDataId(DataId),

    /// An operator name that has no registered kernel.
    #[error("unknown operator '{0}'")]
    UnknownOp(String),

    /// Wrong number of inputs passed to an operator.
    #[error("{op}: expected {expected} inputs, got {got}")]
    Arity {
        op: &'static str,
        expected: String,
        got: usize,
    },

    /// Invalid engine configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout Vole.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
