//! # Vole
//!
//! A CPU compute engine for a tensor library: the engine owns tensor
//! storage and executes named operators over tensor handles.
//!
//! This is the top-level crate that re-exports everything a caller needs.
//!
//! ## Usage
//!
//! ```rust
//! use vole::{BinaryOp, Engine, EngineConfig, Op};
//!
//! let mut engine = Engine::new(EngineConfig::default());
//! let a = engine.tensor_f32(vec![1.0, 2.0, 3.0], 3).unwrap();
//! let b = engine.tensor_f32(vec![10.0], 1).unwrap();
//! let c = engine.execute(&Op::Binary(BinaryOp::Add), &[a, b]).unwrap();
//! assert_eq!(engine.read_f32(&c[0]).unwrap(), vec![11.0, 12.0, 13.0]);
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `vole-core` | Storage arena, TensorInfo, Shape, DType, axes, conv geometry, Error |
//! | `vole-cpu` | Numeric kernels over slices, rayon parallel matmul/conv |
//! | `vole` | Op enum, kernel registry, Engine dispatch, EngineConfig |

pub mod config;
pub mod engine;
pub mod op;
pub mod registry;

mod kernels;

pub use config::EngineConfig;
pub use engine::{Engine, KernelFn};
pub use op::{
    ArgReduceAttrs, AxisAttrs, BatchNormAttrs, BincountAttrs, BroadcastToAttrs, CastAttrs, Conv2dAttrs,
    Conv2dBackpropAttrs, Conv3dAttrs, Conv3dBackpropAttrs, CumulativeAttrs, FillAttrs, FusedConv2dAttrs,
    FusedMatMulAttrs, GatherAttrs, MatMulAttrs, MaxPoolWithArgmaxAttrs, MultinomialAttrs, OneHotAttrs, Op,
    OpKind, PadAttrs, Pool2dAttrs, Pool3dAttrs, RangeAttrs, ReduceAttrs, ReshapeAttrs, ResizeAttrs,
    ReverseAttrs, ScatterNdAttrs, SliceAttrs, SoftmaxAttrs, SplitAttrs, SqueezeAttrs, StringSplitAttrs,
    TileAttrs, TopKAttrs, TransformAttrs, TransposeAttrs,
};

/// Re-export core types.
pub use vole_core::{DType, DataFormat, DataId, Error, Padding, Result, Shape, TensorInfo};

/// Re-export kernel-level enums and options used as op attributes.
pub use vole_cpu::image::{FillMode, Interpolation, NmsOptions};
pub use vole_cpu::string::NGramOptions;
pub use vole_cpu::{
    Activation, ArgOp, BinaryOp, CmpOp, CumulativeOp, LogicalOp, PredicateOp, ReduceOp, UnaryOp,
};
