// Kernels - adapters between the engine and the vole-cpu compute functions
//
// Each kernel has the `KernelFn` signature: it destructures its `Op`
// variant, reads input buffers from the engine, resolves output dtype and
// shape, calls the slice-level function in vole-cpu, and writes the result.

pub(crate) mod array;
pub(crate) mod conv;
pub(crate) mod elementwise;
pub(crate) mod fft;
pub(crate) mod gather;
pub(crate) mod image;
pub(crate) mod matmul;
pub(crate) mod random;
pub(crate) mod reduce;
pub(crate) mod sparse;
pub(crate) mod string;

use vole_core::{DType, Error, Result, TensorInfo};

use crate::op::Op;

/// A kernel was handed an op variant it does not implement.
pub(crate) fn wrong_op(kernel: &str, op: &Op) -> Error {
    Error::msg(format!("{kernel} kernel cannot execute {}", op.name()))
}

/// Fail unless `t` has one of `allowed` dtypes.
pub(crate) fn expect_dtype(op: &'static str, t: &TensorInfo, allowed: &[DType]) -> Result<()> {
    if allowed.contains(&t.dtype) {
        Ok(())
    } else {
        Err(Error::UnsupportedDType { op, dtype: t.dtype })
    }
}

pub(crate) fn expect_rank(op: &'static str, t: &TensorInfo, rank: usize) -> Result<()> {
    if t.rank() == rank {
        Ok(())
    } else {
        Err(Error::RankMismatch {
            op,
            expected: rank,
            got: t.rank(),
        })
    }
}

/// Apply a generic expression to whichever vector a `Values` holds,
/// rewrapping the result in the same variant.
macro_rules! map_values {
    ($values:expr, |$v:ident| $body:expr) => {
        match $values {
            vole_core::Values::F32($v) => vole_core::Values::F32($body),
            vole_core::Values::I32($v) => vole_core::Values::I32($body),
            vole_core::Values::Bool($v) => vole_core::Values::Bool($body),
            vole_core::Values::String($v) => vole_core::Values::String($body),
        }
    };
}

/// Like `map_values!` for expressions yielding `(Vec<T>, Shape)`.
macro_rules! map_values_shaped {
    ($values:expr, |$v:ident| $body:expr) => {
        match $values {
            vole_core::Values::F32($v) => {
                let (d, s) = $body;
                (vole_core::Values::F32(d), s)
            }
            vole_core::Values::I32($v) => {
                let (d, s) = $body;
                (vole_core::Values::I32(d), s)
            }
            vole_core::Values::Bool($v) => {
                let (d, s) = $body;
                (vole_core::Values::Bool(d), s)
            }
            vole_core::Values::String($v) => {
                let (d, s) = $body;
                (vole_core::Values::String(d), s)
            }
        }
    };
}

pub(crate) use map_values;
pub(crate) use map_values_shaped;
