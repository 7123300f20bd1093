//! # vole-core
//!
//! Storage and shape primitives for the Vole compute engine.
//!
//! This crate provides:
//! - [`Storage`]: arena of reference-counted flat buffers keyed by [`DataId`]
//! - [`TensorInfo`]: handle pairing a buffer with a [`Shape`] and [`DType`]
//! - [`Shape`] / [`Layout`]: strides, broadcasting and strided views
//! - [`axes`]: reduction/transpose axis permutations
//! - [`conv`]: convolution and pooling descriptors
//! - [`Error`] / [`Result`]: the single error type used across the workspace

pub mod axes;
pub mod conv;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod shape;
pub mod storage;
pub mod tensor;

pub use conv::{Conv3dInfo, ConvInfo, DataFormat, PadInfo, Padding};
pub use dtype::{DType, Element};
pub use error::{Error, Result};
pub use layout::Layout;
pub use shape::Shape;
pub use storage::{Buffer, DataId, Storage, Values};
pub use tensor::TensorInfo;
