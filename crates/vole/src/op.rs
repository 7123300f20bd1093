// Op - the closed set of operators the engine can execute
//
// Every operator is one variant of `Op`, carrying its attributes as a typed
// struct. Inputs are not part of the op: they are passed to
// `Engine::execute` as a slice of handles, and each op declares how many it
// accepts through `Op::arity`.
//
// `OpKind` is the flat, attribute-free name of an op. The engine keys its
// kernel registry by kind, and callers that only have a name (a graph file,
// a config) resolve it with `OpKind::from_str`.
//
//   Op::Binary(BinaryOp::Add)                 -> OpKind::Add     "Add"
//   Op::Reduce(ReduceAttrs { op: Sum, .. })   -> OpKind::Sum     "Sum"
//   Op::Conv2d(Conv2dAttrs { .. })            -> OpKind::Conv2d  "Conv2d"

use std::fmt;
use std::str::FromStr;

use vole_core::{DType, DataFormat, Error, Padding, Result};
use vole_cpu::image::{FillMode, Interpolation, NmsOptions};
use vole_cpu::string::NGramOptions;
use vole_cpu::{Activation, ArgOp, BinaryOp, CmpOp, CumulativeOp, LogicalOp, PredicateOp, ReduceOp, UnaryOp};

macro_rules! op_kinds {
    ($($name:ident),* $(,)?) => {
        /// Canonical, attribute-free operator names.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OpKind {
            $($name),*
        }

        impl OpKind {
            /// Every operator kind, in declaration order.
            pub const ALL: &'static [OpKind] = &[$(OpKind::$name),*];

            pub fn name(&self) -> &'static str {
                match self {
                    $(OpKind::$name => stringify!($name)),*
                }
            }
        }
    };
}

op_kinds! {
    // binary arithmetic
    Add, Sub, Mul, RealDiv, FloorDiv, Mod, Pow, Maximum, Minimum, SquaredDifference, Atan2,
    // comparison and logic
    Equal, NotEqual, Less, LessEqual, Greater, GreaterEqual, LogicalAnd, LogicalOr, LogicalNot,
    Prelu,
    // unary
    Abs, Neg, Exp, Expm1, Log, Log1p, Sqrt, Rsqrt, Square, Reciprocal,
    Sin, Cos, Tan, Asin, Acos, Atan, Sinh, Cosh, Tanh, Asinh, Acosh, Atanh,
    Sigmoid, Softplus, Relu, Relu6, Elu, Selu, Erf, Sign, Floor, Ceil, Round,
    LeakyRelu, Step, ClipByValue, IsNan, IsInf, IsFinite, Cast,
    // select and complex
    Select, Complex, Real, Imag, ComplexAbs,
    // reductions
    Sum, Prod, Max, Min, Mean, All, Any, ArgMax, ArgMin, Cumsum, Cumprod, Softmax,
    // array movement
    Reshape, Identity, ExpandDims, Squeeze, Transpose, Concat, Slice, Pad, Tile, Reverse,
    Pack, Unpack, Split, BroadcastTo, Fill, Range, OneHot, ZerosLike, OnesLike,
    // gather / scatter / counting
    Gather, GatherNd, ScatterNd, TopK, Bincount, DenseBincount,
    // convolution and pooling
    Conv2d, Conv2dBackpropInput, Conv2dBackpropFilter,
    Conv3d, Conv3dBackpropInput, Conv3dBackpropFilter, DepthwiseConv2d,
    MaxPool, AvgPool, MaxPool3d, AvgPool3d, MaxPoolWithArgmax,
    // matmul and fused
    BatchMatMul, FusedMatMul, FusedConv2d, FusedDepthwiseConv2d, FusedBatchNorm,
    // spectral
    Fft, Ifft, Rfft, Irfft,
    // sparse, string, ragged
    SparseReshape, SparseSegmentSum, SparseSegmentMean, StringNGrams, StringSplit, RaggedRange,
    // image
    Transform, ResizeBilinear, ResizeNearestNeighbor, NonMaxSuppression,
    // random
    Multinomial,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OpKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| Error::UnknownOp(s.to_string()))
    }
}

// Attribute structs

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastAttrs {
    pub dtype: DType,
}

/// `Sum`, `Prod`, `Max`, `Min`, `Mean`, `All`, `Any` over `axes` (empty = all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceAttrs {
    pub op: ReduceOp,
    pub axes: Vec<isize>,
    pub keep_dims: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgReduceAttrs {
    pub op: ArgOp,
    pub axis: isize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumulativeAttrs {
    pub op: CumulativeOp,
    pub axis: isize,
    pub exclusive: bool,
    pub reverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftmaxAttrs {
    pub dim: isize,
}

impl Default for SoftmaxAttrs {
    fn default() -> Self {
        Self { dim: -1 }
    }
}

/// Target shape; at most one entry may be `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReshapeAttrs {
    pub shape: Vec<isize>,
}

/// Single-axis attribute shared by Concat, Pack, Unpack and ExpandDims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisAttrs {
    pub axis: isize,
}

/// Axes to drop (empty = every size-1 dim).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqueezeAttrs {
    pub axes: Vec<isize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransposeAttrs {
    pub perm: Vec<usize>,
}

/// `size[d] == -1` takes everything from `begin[d]` to the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceAttrs {
    pub begin: Vec<usize>,
    pub size: Vec<isize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PadAttrs {
    pub paddings: Vec<[usize; 2]>,
    pub constant: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileAttrs {
    pub reps: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseAttrs {
    pub axes: Vec<isize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAttrs {
    pub sizes: Vec<usize>,
    pub axis: isize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastToAttrs {
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillAttrs {
    pub shape: Vec<usize>,
    pub value: f32,
    pub dtype: DType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeAttrs {
    pub start: f32,
    pub stop: f32,
    pub step: f32,
    pub dtype: DType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OneHotAttrs {
    pub depth: usize,
    pub on_value: f32,
    pub off_value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatherAttrs {
    pub axis: isize,
    pub batch_dims: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScatterNdAttrs {
    pub shape: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopKAttrs {
    pub k: usize,
    pub sorted: bool,
}

/// `size` is signed so that a negative request is reported, not wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BincountAttrs {
    pub size: i64,
    pub binary_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv2dAttrs {
    pub strides: [usize; 2],
    pub dilations: [usize; 2],
    pub padding: Padding,
    pub data_format: DataFormat,
}

impl Default for Conv2dAttrs {
    fn default() -> Self {
        Self {
            strides: [1, 1],
            dilations: [1, 1],
            padding: Padding::Valid,
            data_format: DataFormat::ChannelsLast,
        }
    }
}

/// Backprop of a 2D conv. `shape` is the shape of the tensor being
/// differentiated: the forward input for `Conv2dBackpropInput`, the filter
/// for `Conv2dBackpropFilter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv2dBackpropAttrs {
    pub shape: Vec<usize>,
    pub strides: [usize; 2],
    pub dilations: [usize; 2],
    pub padding: Padding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv3dAttrs {
    pub strides: [usize; 3],
    pub dilations: [usize; 3],
    pub padding: Padding,
}

impl Default for Conv3dAttrs {
    fn default() -> Self {
        Self {
            strides: [1, 1, 1],
            dilations: [1, 1, 1],
            padding: Padding::Valid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv3dBackpropAttrs {
    pub shape: Vec<usize>,
    pub strides: [usize; 3],
    pub dilations: [usize; 3],
    pub padding: Padding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool2dAttrs {
    pub filter_size: [usize; 2],
    pub strides: [usize; 2],
    pub padding: Padding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool3dAttrs {
    pub filter_size: [usize; 3],
    pub strides: [usize; 3],
    pub padding: Padding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxPoolWithArgmaxAttrs {
    pub pool: Pool2dAttrs,
    pub include_batch_in_index: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatMulAttrs {
    pub transpose_a: bool,
    pub transpose_b: bool,
}

/// Inputs: `a, b, [bias], [prelu_weights]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FusedMatMulAttrs {
    pub transpose_a: bool,
    pub transpose_b: bool,
    pub has_bias: bool,
    pub activation: Activation,
}

/// Inputs: `x, filter, [bias], [prelu_weights]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FusedConv2dAttrs {
    pub conv: Conv2dAttrs,
    pub has_bias: bool,
    pub activation: Activation,
}

/// Inputs: `x, mean, variance, [offset], [scale]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchNormAttrs {
    pub epsilon: f32,
    pub has_offset: bool,
    pub has_scale: bool,
}

impl Default for BatchNormAttrs {
    fn default() -> Self {
        Self {
            epsilon: 1e-3,
            has_offset: false,
            has_scale: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StringSplitAttrs {
    pub skip_empty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformAttrs {
    pub interpolation: Interpolation,
    pub fill_mode: FillMode,
    pub fill_value: f32,
    /// `[height, width]`; defaults to the input size.
    pub output_shape: Option<[usize; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeAttrs {
    pub size: [usize; 2],
    pub align_corners: bool,
    pub half_pixel_centers: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultinomialAttrs {
    pub num_samples: usize,
    pub seed: u64,
    pub normalized: bool,
}

/// An operator and its attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Binary(BinaryOp),
    Compare(CmpOp),
    Logical(LogicalOp),
    LogicalNot,
    Prelu,
    Unary(UnaryOp),
    Predicate(PredicateOp),
    Cast(CastAttrs),
    Select,
    Complex,
    Real,
    Imag,
    ComplexAbs,

    Reduce(ReduceAttrs),
    ArgReduce(ArgReduceAttrs),
    Cumulative(CumulativeAttrs),
    Softmax(SoftmaxAttrs),

    Reshape(ReshapeAttrs),
    Identity,
    ExpandDims(AxisAttrs),
    Squeeze(SqueezeAttrs),
    Transpose(TransposeAttrs),
    Concat(AxisAttrs),
    Slice(SliceAttrs),
    Pad(PadAttrs),
    Tile(TileAttrs),
    Reverse(ReverseAttrs),
    Pack(AxisAttrs),
    Unpack(AxisAttrs),
    Split(SplitAttrs),
    BroadcastTo(BroadcastToAttrs),
    Fill(FillAttrs),
    Range(RangeAttrs),
    OneHot(OneHotAttrs),
    ZerosLike,
    OnesLike,

    Gather(GatherAttrs),
    GatherNd,
    ScatterNd(ScatterNdAttrs),
    TopK(TopKAttrs),
    Bincount(BincountAttrs),
    DenseBincount(BincountAttrs),

    Conv2d(Conv2dAttrs),
    Conv2dBackpropInput(Conv2dBackpropAttrs),
    Conv2dBackpropFilter(Conv2dBackpropAttrs),
    Conv3d(Conv3dAttrs),
    Conv3dBackpropInput(Conv3dBackpropAttrs),
    Conv3dBackpropFilter(Conv3dBackpropAttrs),
    DepthwiseConv2d(Conv2dAttrs),
    MaxPool(Pool2dAttrs),
    AvgPool(Pool2dAttrs),
    MaxPool3d(Pool3dAttrs),
    AvgPool3d(Pool3dAttrs),
    MaxPoolWithArgmax(MaxPoolWithArgmaxAttrs),

    BatchMatMul(MatMulAttrs),
    FusedMatMul(FusedMatMulAttrs),
    FusedConv2d(FusedConv2dAttrs),
    FusedDepthwiseConv2d(FusedConv2dAttrs),
    FusedBatchNorm(BatchNormAttrs),

    Fft,
    Ifft,
    Rfft,
    Irfft,

    SparseReshape,
    SparseSegmentSum,
    SparseSegmentMean,
    StringNGrams(NGramOptions),
    StringSplit(StringSplitAttrs),
    RaggedRange,

    Transform(TransformAttrs),
    ResizeBilinear(ResizeAttrs),
    ResizeNearestNeighbor(ResizeAttrs),
    NonMaxSuppression(NmsOptions),

    Multinomial(MultinomialAttrs),
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Binary(op) => match op {
                BinaryOp::Add => OpKind::Add,
                BinaryOp::Sub => OpKind::Sub,
                BinaryOp::Mul => OpKind::Mul,
                BinaryOp::RealDiv => OpKind::RealDiv,
                BinaryOp::FloorDiv => OpKind::FloorDiv,
                BinaryOp::Mod => OpKind::Mod,
                BinaryOp::Pow => OpKind::Pow,
                BinaryOp::Maximum => OpKind::Maximum,
                BinaryOp::Minimum => OpKind::Minimum,
                BinaryOp::SquaredDifference => OpKind::SquaredDifference,
                BinaryOp::Atan2 => OpKind::Atan2,
            },
            Op::Compare(op) => match op {
                CmpOp::Equal => OpKind::Equal,
                CmpOp::NotEqual => OpKind::NotEqual,
                CmpOp::Less => OpKind::Less,
                CmpOp::LessEqual => OpKind::LessEqual,
                CmpOp::Greater => OpKind::Greater,
                CmpOp::GreaterEqual => OpKind::GreaterEqual,
            },
            Op::Logical(LogicalOp::And) => OpKind::LogicalAnd,
            Op::Logical(LogicalOp::Or) => OpKind::LogicalOr,
            Op::LogicalNot => OpKind::LogicalNot,
            Op::Prelu => OpKind::Prelu,
            Op::Unary(op) => match op {
                UnaryOp::Abs => OpKind::Abs,
                UnaryOp::Neg => OpKind::Neg,
                UnaryOp::Exp => OpKind::Exp,
                UnaryOp::Expm1 => OpKind::Expm1,
                UnaryOp::Log => OpKind::Log,
                UnaryOp::Log1p => OpKind::Log1p,
                UnaryOp::Sqrt => OpKind::Sqrt,
                UnaryOp::Rsqrt => OpKind::Rsqrt,
                UnaryOp::Square => OpKind::Square,
                UnaryOp::Reciprocal => OpKind::Reciprocal,
                UnaryOp::Sin => OpKind::Sin,
                UnaryOp::Cos => OpKind::Cos,
                UnaryOp::Tan => OpKind::Tan,
                UnaryOp::Asin => OpKind::Asin,
                UnaryOp::Acos => OpKind::Acos,
                UnaryOp::Atan => OpKind::Atan,
                UnaryOp::Sinh => OpKind::Sinh,
                UnaryOp::Cosh => OpKind::Cosh,
                UnaryOp::Tanh => OpKind::Tanh,
                UnaryOp::Asinh => OpKind::Asinh,
                UnaryOp::Acosh => OpKind::Acosh,
                UnaryOp::Atanh => OpKind::Atanh,
                UnaryOp::Sigmoid => OpKind::Sigmoid,
                UnaryOp::Softplus => OpKind::Softplus,
                UnaryOp::Relu => OpKind::Relu,
                UnaryOp::Relu6 => OpKind::Relu6,
                UnaryOp::Elu => OpKind::Elu,
                UnaryOp::Selu => OpKind::Selu,
                UnaryOp::Erf => OpKind::Erf,
                UnaryOp::Sign => OpKind::Sign,
                UnaryOp::Floor => OpKind::Floor,
                UnaryOp::Ceil => OpKind::Ceil,
                UnaryOp::Round => OpKind::Round,
                UnaryOp::LeakyRelu(_) => OpKind::LeakyRelu,
                UnaryOp::Step(_) => OpKind::Step,
                UnaryOp::ClipByValue { .. } => OpKind::ClipByValue,
            },
            Op::Predicate(PredicateOp::IsNan) => OpKind::IsNan,
            Op::Predicate(PredicateOp::IsInf) => OpKind::IsInf,
            Op::Predicate(PredicateOp::IsFinite) => OpKind::IsFinite,
            Op::Cast(_) => OpKind::Cast,
            Op::Select => OpKind::Select,
            Op::Complex => OpKind::Complex,
            Op::Real => OpKind::Real,
            Op::Imag => OpKind::Imag,
            Op::ComplexAbs => OpKind::ComplexAbs,

            Op::Reduce(attrs) => match attrs.op {
                ReduceOp::Sum => OpKind::Sum,
                ReduceOp::Prod => OpKind::Prod,
                ReduceOp::Max => OpKind::Max,
                ReduceOp::Min => OpKind::Min,
                ReduceOp::Mean => OpKind::Mean,
                ReduceOp::All => OpKind::All,
                ReduceOp::Any => OpKind::Any,
            },
            Op::ArgReduce(attrs) => match attrs.op {
                ArgOp::ArgMax => OpKind::ArgMax,
                ArgOp::ArgMin => OpKind::ArgMin,
            },
            Op::Cumulative(attrs) => match attrs.op {
                CumulativeOp::Sum => OpKind::Cumsum,
                CumulativeOp::Prod => OpKind::Cumprod,
            },
            Op::Softmax(_) => OpKind::Softmax,

            Op::Reshape(_) => OpKind::Reshape,
            Op::Identity => OpKind::Identity,
            Op::ExpandDims(_) => OpKind::ExpandDims,
            Op::Squeeze(_) => OpKind::Squeeze,
            Op::Transpose(_) => OpKind::Transpose,
            Op::Concat(_) => OpKind::Concat,
            Op::Slice(_) => OpKind::Slice,
            Op::Pad(_) => OpKind::Pad,
            Op::Tile(_) => OpKind::Tile,
            Op::Reverse(_) => OpKind::Reverse,
            Op::Pack(_) => OpKind::Pack,
            Op::Unpack(_) => OpKind::Unpack,
            Op::Split(_) => OpKind::Split,
            Op::BroadcastTo(_) => OpKind::BroadcastTo,
            Op::Fill(_) => OpKind::Fill,
            Op::Range(_) => OpKind::Range,
            Op::OneHot(_) => OpKind::OneHot,
            Op::ZerosLike => OpKind::ZerosLike,
            Op::OnesLike => OpKind::OnesLike,

            Op::Gather(_) => OpKind::Gather,
            Op::GatherNd => OpKind::GatherNd,
            Op::ScatterNd(_) => OpKind::ScatterNd,
            Op::TopK(_) => OpKind::TopK,
            Op::Bincount(_) => OpKind::Bincount,
            Op::DenseBincount(_) => OpKind::DenseBincount,

            Op::Conv2d(_) => OpKind::Conv2d,
            Op::Conv2dBackpropInput(_) => OpKind::Conv2dBackpropInput,
            Op::Conv2dBackpropFilter(_) => OpKind::Conv2dBackpropFilter,
            Op::Conv3d(_) => OpKind::Conv3d,
            Op::Conv3dBackpropInput(_) => OpKind::Conv3dBackpropInput,
            Op::Conv3dBackpropFilter(_) => OpKind::Conv3dBackpropFilter,
            Op::DepthwiseConv2d(_) => OpKind::DepthwiseConv2d,
            Op::MaxPool(_) => OpKind::MaxPool,
            Op::AvgPool(_) => OpKind::AvgPool,
            Op::MaxPool3d(_) => OpKind::MaxPool3d,
            Op::AvgPool3d(_) => OpKind::AvgPool3d,
            Op::MaxPoolWithArgmax(_) => OpKind::MaxPoolWithArgmax,

            Op::BatchMatMul(_) => OpKind::BatchMatMul,
            Op::FusedMatMul(_) => OpKind::FusedMatMul,
            Op::FusedConv2d(_) => OpKind::FusedConv2d,
            Op::FusedDepthwiseConv2d(_) => OpKind::FusedDepthwiseConv2d,
            Op::FusedBatchNorm(_) => OpKind::FusedBatchNorm,

            Op::Fft => OpKind::Fft,
            Op::Ifft => OpKind::Ifft,
            Op::Rfft => OpKind::Rfft,
            Op::Irfft => OpKind::Irfft,

            Op::SparseReshape => OpKind::SparseReshape,
            Op::SparseSegmentSum => OpKind::SparseSegmentSum,
            Op::SparseSegmentMean => OpKind::SparseSegmentMean,
            Op::StringNGrams(_) => OpKind::StringNGrams,
            Op::StringSplit(_) => OpKind::StringSplit,
            Op::RaggedRange => OpKind::RaggedRange,

            Op::Transform(_) => OpKind::Transform,
            Op::ResizeBilinear(_) => OpKind::ResizeBilinear,
            Op::ResizeNearestNeighbor(_) => OpKind::ResizeNearestNeighbor,
            Op::NonMaxSuppression(_) => OpKind::NonMaxSuppression,

            Op::Multinomial(_) => OpKind::Multinomial,
        }
    }

    /// Accepted input count as `(min, max)`; `max == None` is unbounded.
    pub fn arity(&self) -> (usize, Option<usize>) {
        let exact = |n| (n, Some(n));
        match self {
            Op::Binary(_) | Op::Compare(_) | Op::Logical(_) | Op::Prelu | Op::Complex => exact(2),
            Op::Select => exact(3),

            Op::Concat(_) | Op::Pack(_) => (1, None),
            Op::Fill(_) | Op::Range(_) => exact(0),

            Op::Gather(_) | Op::GatherNd | Op::ScatterNd(_) => exact(2),
            Op::Bincount(_) | Op::DenseBincount(_) => (1, Some(2)),

            Op::Conv2d(_)
            | Op::Conv2dBackpropInput(_)
            | Op::Conv2dBackpropFilter(_)
            | Op::Conv3d(_)
            | Op::Conv3dBackpropInput(_)
            | Op::Conv3dBackpropFilter(_)
            | Op::DepthwiseConv2d(_)
            | Op::BatchMatMul(_) => exact(2),

            Op::FusedMatMul(FusedMatMulAttrs {
                has_bias,
                activation,
                ..
            }) => exact(2 + *has_bias as usize + (*activation == Activation::Prelu) as usize),
            Op::FusedConv2d(attrs) | Op::FusedDepthwiseConv2d(attrs) => exact(
                2 + attrs.has_bias as usize + (attrs.activation == Activation::Prelu) as usize,
            ),
            Op::FusedBatchNorm(attrs) => {
                exact(3 + attrs.has_offset as usize + attrs.has_scale as usize)
            }

            Op::SparseReshape | Op::SparseSegmentSum | Op::SparseSegmentMean => exact(3),
            Op::StringNGrams(_) | Op::StringSplit(_) => exact(2),
            Op::RaggedRange => exact(3),

            Op::Transform(_) | Op::NonMaxSuppression(_) => exact(2),

            _ => exact(1),
        }
    }

    /// Canonical operator name.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<OpKind> for Op {
    type Error = Error;

    /// Build the op for a kind that needs no attributes, or whose
    /// attributes have a natural default.
    fn try_from(kind: OpKind) -> Result<Self> {
        use OpKind as K;
        let op = match kind {
            K::Add => Op::Binary(BinaryOp::Add),
            K::Sub => Op::Binary(BinaryOp::Sub),
            K::Mul => Op::Binary(BinaryOp::Mul),
            K::RealDiv => Op::Binary(BinaryOp::RealDiv),
            K::FloorDiv => Op::Binary(BinaryOp::FloorDiv),
            K::Mod => Op::Binary(BinaryOp::Mod),
            K::Pow => Op::Binary(BinaryOp::Pow),
            K::Maximum => Op::Binary(BinaryOp::Maximum),
            K::Minimum => Op::Binary(BinaryOp::Minimum),
            K::SquaredDifference => Op::Binary(BinaryOp::SquaredDifference),
            K::Atan2 => Op::Binary(BinaryOp::Atan2),
            K::Equal => Op::Compare(CmpOp::Equal),
            K::NotEqual => Op::Compare(CmpOp::NotEqual),
            K::Less => Op::Compare(CmpOp::Less),
            K::LessEqual => Op::Compare(CmpOp::LessEqual),
            K::Greater => Op::Compare(CmpOp::Greater),
            K::GreaterEqual => Op::Compare(CmpOp::GreaterEqual),
            K::LogicalAnd => Op::Logical(LogicalOp::And),
            K::LogicalOr => Op::Logical(LogicalOp::Or),
            K::LogicalNot => Op::LogicalNot,
            K::Prelu => Op::Prelu,
            K::Abs => Op::Unary(UnaryOp::Abs),
            K::Neg => Op::Unary(UnaryOp::Neg),
            K::Exp => Op::Unary(UnaryOp::Exp),
            K::Expm1 => Op::Unary(UnaryOp::Expm1),
            K::Log => Op::Unary(UnaryOp::Log),
            K::Log1p => Op::Unary(UnaryOp::Log1p),
            K::Sqrt => Op::Unary(UnaryOp::Sqrt),
            K::Rsqrt => Op::Unary(UnaryOp::Rsqrt),
            K::Square => Op::Unary(UnaryOp::Square),
            K::Reciprocal => Op::Unary(UnaryOp::Reciprocal),
            K::Sin => Op::Unary(UnaryOp::Sin),
            K::Cos => Op::Unary(UnaryOp::Cos),
            K::Tan => Op::Unary(UnaryOp::Tan),
            K::Asin => Op::Unary(UnaryOp::Asin),
            K::Acos => Op::Unary(UnaryOp::Acos),
            K::Atan => Op::Unary(UnaryOp::Atan),
            K::Sinh => Op::Unary(UnaryOp::Sinh),
            K::Cosh => Op::Unary(UnaryOp::Cosh),
            K::Tanh => Op::Unary(UnaryOp::Tanh),
            K::Asinh => Op::Unary(UnaryOp::Asinh),
            K::Acosh => Op::Unary(UnaryOp::Acosh),
            K::Atanh => Op::Unary(UnaryOp::Atanh),
            K::Sigmoid => Op::Unary(UnaryOp::Sigmoid),
            K::Softplus => Op::Unary(UnaryOp::Softplus),
            K::Relu => Op::Unary(UnaryOp::Relu),
            K::Relu6 => Op::Unary(UnaryOp::Relu6),
            K::Elu => Op::Unary(UnaryOp::Elu),
            K::Selu => Op::Unary(UnaryOp::Selu),
            K::Erf => Op::Unary(UnaryOp::Erf),
            K::Sign => Op::Unary(UnaryOp::Sign),
            K::Floor => Op::Unary(UnaryOp::Floor),
            K::Ceil => Op::Unary(UnaryOp::Ceil),
            K::Round => Op::Unary(UnaryOp::Round),
            K::LeakyRelu => Op::Unary(UnaryOp::LeakyRelu(0.2)),
            K::IsNan => Op::Predicate(PredicateOp::IsNan),
            K::IsInf => Op::Predicate(PredicateOp::IsInf),
            K::IsFinite => Op::Predicate(PredicateOp::IsFinite),
            K::Select => Op::Select,
            K::Complex => Op::Complex,
            K::Real => Op::Real,
            K::Imag => Op::Imag,
            K::ComplexAbs => Op::ComplexAbs,
            K::Sum | K::Prod | K::Max | K::Min | K::Mean | K::All | K::Any => {
                let op = match kind {
                    K::Sum => ReduceOp::Sum,
                    K::Prod => ReduceOp::Prod,
                    K::Max => ReduceOp::Max,
                    K::Min => ReduceOp::Min,
                    K::Mean => ReduceOp::Mean,
                    K::All => ReduceOp::All,
                    _ => ReduceOp::Any,
                };
                Op::Reduce(ReduceAttrs {
                    op,
                    axes: Vec::new(),
                    keep_dims: false,
                })
            }
            K::Softmax => Op::Softmax(SoftmaxAttrs::default()),
            K::Identity => Op::Identity,
            K::Squeeze => Op::Squeeze(SqueezeAttrs::default()),
            K::ZerosLike => Op::ZerosLike,
            K::OnesLike => Op::OnesLike,
            K::GatherNd => Op::GatherNd,
            K::BatchMatMul => Op::BatchMatMul(MatMulAttrs::default()),
            K::Fft => Op::Fft,
            K::Ifft => Op::Ifft,
            K::Rfft => Op::Rfft,
            K::Irfft => Op::Irfft,
            K::SparseReshape => Op::SparseReshape,
            K::SparseSegmentSum => Op::SparseSegmentSum,
            K::SparseSegmentMean => Op::SparseSegmentMean,
            K::RaggedRange => Op::RaggedRange,
            other => {
                return Err(Error::msg(format!(
                    "operator {other} has required attributes and cannot be built from its name"
                )))
            }
        };
        Ok(op)
    }
}

impl FromStr for Op {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Op::try_from(s.parse::<OpKind>()?)
    }
}
