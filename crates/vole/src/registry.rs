// Kernel registry
//
// Maps every `OpKind` to the kernel that executes it. One kernel usually
// serves a family of kinds and dispatches on the `Op` variant it receives,
// so the table is filled one `(kernel, kinds)` group at a time.
//
// The table is owned by each `Engine`; there is no global registry.

use std::collections::HashMap;

use crate::engine::KernelFn;
use crate::kernels::{array, conv, elementwise, fft, gather, image, matmul, random, reduce, sparse, string};
use crate::op::OpKind;

use crate::op::OpKind as K;

const BINARY: &[OpKind] = &[
    K::Add,
    K::Sub,
    K::Mul,
    K::RealDiv,
    K::FloorDiv,
    K::Mod,
    K::Pow,
    K::Maximum,
    K::Minimum,
    K::SquaredDifference,
    K::Atan2,
];

const COMPARE: &[OpKind] = &[K::Equal, K::NotEqual, K::Less, K::LessEqual, K::Greater, K::GreaterEqual];

const UNARY: &[OpKind] = &[
    K::Abs,
    K::Neg,
    K::Exp,
    K::Expm1,
    K::Log,
    K::Log1p,
    K::Sqrt,
    K::Rsqrt,
    K::Square,
    K::Reciprocal,
    K::Sin,
    K::Cos,
    K::Tan,
    K::Asin,
    K::Acos,
    K::Atan,
    K::Sinh,
    K::Cosh,
    K::Tanh,
    K::Asinh,
    K::Acosh,
    K::Atanh,
    K::Sigmoid,
    K::Softplus,
    K::Relu,
    K::Relu6,
    K::Elu,
    K::Selu,
    K::Erf,
    K::Sign,
    K::Floor,
    K::Ceil,
    K::Round,
    K::LeakyRelu,
    K::Step,
    K::ClipByValue,
];

const REDUCE: &[OpKind] = &[K::Sum, K::Prod, K::Max, K::Min, K::Mean, K::All, K::Any];

fn register(table: &mut HashMap<OpKind, KernelFn>, kernel: KernelFn, kinds: &[OpKind]) {
    for &kind in kinds {
        table.insert(kind, kernel);
    }
}

/// Build the kernel table for a new engine.
pub fn register_kernels() -> HashMap<OpKind, KernelFn> {
    let mut table = HashMap::with_capacity(OpKind::ALL.len());
    // element-wise
    register(&mut table, elementwise::binary, BINARY);
    register(&mut table, elementwise::compare, COMPARE);
    register(&mut table, elementwise::logical, &[K::LogicalAnd, K::LogicalOr, K::LogicalNot]);
    register(&mut table, elementwise::prelu, &[K::Prelu]);
    register(&mut table, elementwise::unary, UNARY);
    register(&mut table, elementwise::predicate, &[K::IsNan, K::IsInf, K::IsFinite]);
    register(&mut table, elementwise::cast, &[K::Cast]);
    register(&mut table, elementwise::select, &[K::Select]);
    register(&mut table, elementwise::complex, &[K::Complex]);
    register(&mut table, elementwise::complex_part, &[K::Real, K::Imag]);
    register(&mut table, elementwise::complex_abs, &[K::ComplexAbs]);
    // reductions
    register(&mut table, reduce::reduce, REDUCE);
    register(&mut table, reduce::arg_reduce, &[K::ArgMax, K::ArgMin]);
    register(&mut table, reduce::cumulative_op, &[K::Cumsum, K::Cumprod]);
    register(&mut table, reduce::softmax, &[K::Softmax]);
    // array movement
    register(&mut table, array::reshape, &[K::Reshape, K::Identity, K::ExpandDims, K::Squeeze]);
    register(&mut table, array::transpose, &[K::Transpose]);
    register(&mut table, array::concat, &[K::Concat]);
    register(&mut table, array::pack, &[K::Pack]);
    register(&mut table, array::split, &[K::Split, K::Unpack]);
    register(&mut table, array::slice, &[K::Slice]);
    register(&mut table, array::pad, &[K::Pad]);
    register(&mut table, array::tile, &[K::Tile]);
    register(&mut table, array::reverse, &[K::Reverse]);
    register(&mut table, array::broadcast_to, &[K::BroadcastTo]);
    register(&mut table, array::generate, &[K::Fill, K::Range, K::OneHot, K::ZerosLike, K::OnesLike]);
    // gather and scatter
    register(&mut table, gather::gather, &[K::Gather, K::GatherNd]);
    register(&mut table, gather::scatter_nd, &[K::ScatterNd]);
    register(&mut table, gather::top_k, &[K::TopK]);
    register(&mut table, gather::bincount, &[K::Bincount, K::DenseBincount]);
    // convolution and pooling
    register(&mut table, conv::conv2d, &[K::Conv2d, K::DepthwiseConv2d]);
    register(&mut table, conv::conv2d_backprop, &[K::Conv2dBackpropInput, K::Conv2dBackpropFilter]);
    register(&mut table, conv::conv3d, &[K::Conv3d, K::Conv3dBackpropInput, K::Conv3dBackpropFilter]);
    register(&mut table, conv::pool2d, &[K::MaxPool, K::AvgPool, K::MaxPoolWithArgmax]);
    register(&mut table, conv::pool3d, &[K::MaxPool3d, K::AvgPool3d]);
    // matmul and fused
    register(&mut table, matmul::batch_matmul_kernel, &[K::BatchMatMul]);
    register(&mut table, matmul::fused_matmul, &[K::FusedMatMul]);
    register(&mut table, matmul::fused_conv2d, &[K::FusedConv2d, K::FusedDepthwiseConv2d]);
    register(&mut table, matmul::fused_batch_norm, &[K::FusedBatchNorm]);
    // spectral
    register(&mut table, fft::fft_kernel, &[K::Fft, K::Ifft, K::Rfft, K::Irfft]);
    // sparse, string, ragged
    register(&mut table, sparse::sparse_reshape, &[K::SparseReshape]);
    register(&mut table, sparse::sparse_segment_reduce, &[K::SparseSegmentSum, K::SparseSegmentMean]);
    register(&mut table, string::string_ngrams, &[K::StringNGrams]);
    register(&mut table, string::string_split, &[K::StringSplit]);
    register(&mut table, string::ragged_range, &[K::RaggedRange]);
    // image
    register(&mut table, image::transform, &[K::Transform]);
    register(&mut table, image::resize, &[K::ResizeBilinear, K::ResizeNearestNeighbor]);
    register(&mut table, image::non_max_suppression, &[K::NonMaxSuppression]);
    // random
    register(&mut table, random::multinomial, &[K::Multinomial]);
    tracing::trace!(kernels = table.len(), "registered kernels");
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_kind() {
        let table = register_kernels();
        for kind in OpKind::ALL {
            assert!(table.contains_key(kind), "no kernel for {kind}");
        }
        assert_eq!(table.len(), OpKind::ALL.len());
    }
}
