//! # vole-cpu
//!
//! Numeric kernels for the Vole compute engine.
//!
//! Every kernel is a plain function over slices plus the shape metadata it
//! needs; none of them touch storage. The `vole` crate reads input buffers,
//! resolves dtypes, calls into this crate and writes the results back.
//!
//! | Module | Kernels |
//! |--------|---------|
//! | [`binary`] | broadcasting arithmetic, comparison, logical, select |
//! | [`unary`] | element-wise math and activations |
//! | [`reduce`] | windowed reductions, arg-reductions, cumulative sums |
//! | [`array`] | transpose, slice, concat, pad, tile, gather/scatter, top-k |
//! | [`conv`] / [`pool`] | 2D/3D convolution, backprops, depthwise, pooling |
//! | [`matmul`] | blocked batched matrix multiply |
//! | [`activation`] | fused-op activation selection |
//! | [`fft`] | radix-2 and direct DFT |
//! | [`sparse`] | sparse reshape, segment reductions |
//! | [`string`] | ngrams, split, ragged range |
//! | [`image`] | projective transform, resize, non-max suppression |
//! | [`norm`] | batch normalization |
//! | [`random`] | seeded multinomial sampling |

pub mod activation;
pub mod array;
pub mod binary;
pub mod conv;
pub mod fft;
pub mod image;
pub mod matmul;
pub mod norm;
pub mod pool;
pub mod random;
pub mod reduce;
pub mod sparse;
pub mod string;
pub mod unary;

pub use activation::Activation;
pub use binary::{BinaryOp, CmpOp, LogicalOp};
pub use reduce::{ArgOp, CumulativeOp, ReduceOp};
pub use unary::{PredicateOp, UnaryOp};
