use vole_core::Element;

// Reduction kernels
//
// All kernels here assume the reduced axes have already been moved to the
// end of the shape, so each output element collapses one contiguous
// "reduce window" of `reduce_size` elements:
//
//   out[i] = fold(data[i * reduce_size .. (i + 1) * reduce_size])
//
// The dispatcher transposes non-innermost axes first and reshapes after.

/// Reductions over a contiguous window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Prod,
    Max,
    Min,
    Mean,
    All,
    Any,
}

impl ReduceOp {
    pub fn name(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "Sum",
            ReduceOp::Prod => "Prod",
            ReduceOp::Max => "Max",
            ReduceOp::Min => "Min",
            ReduceOp::Mean => "Mean",
            ReduceOp::All => "All",
            ReduceOp::Any => "Any",
        }
    }

    /// Whether the op consumes and produces bool values.
    pub fn is_logical(&self) -> bool {
        matches!(self, ReduceOp::All | ReduceOp::Any)
    }
}

/// Which extremum an arg-reduction searches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgOp {
    ArgMax,
    ArgMin,
}

impl ArgOp {
    pub fn name(&self) -> &'static str {
        match self {
            ArgOp::ArgMax => "ArgMax",
            ArgOp::ArgMin => "ArgMin",
        }
    }
}

/// Sum, Prod, Max or Min over each window. `Mean` is handled by
/// [`mean_inner`] and the logical ops by [`logical_inner`].
///
/// For floats, any NaN in a Max/Min window makes that output NaN.
pub fn reduce_inner<T: Element>(data: &[T], reduce_size: usize, op: ReduceOp) -> Vec<T> {
    let out_size = if reduce_size == 0 {
        0
    } else {
        data.len() / reduce_size
    };
    let mut out = Vec::with_capacity(out_size);
    for window in data.chunks(reduce_size.max(1)).take(out_size) {
        let v = match op {
            ReduceOp::Sum | ReduceOp::Mean => {
                window.iter().fold(T::zero(), |acc, &x| add(acc, x))
            }
            ReduceOp::Prod => window.iter().fold(T::one(), |acc, &x| mul(acc, x)),
            ReduceOp::Max => fold_extremum(window, T::lowest(), |x, best| x > best),
            ReduceOp::Min => fold_extremum(window, T::highest(), |x, best| x < best),
            ReduceOp::All | ReduceOp::Any => T::zero(),
        };
        out.push(v);
    }
    out
}

fn fold_extremum<T: Element>(window: &[T], init: T, better: impl Fn(T, T) -> bool) -> T {
    let mut best = init;
    for &x in window {
        if x.is_nan() {
            return x;
        }
        if better(x, best) {
            best = x;
        }
    }
    best
}

// Integer accumulation wraps, the same as the element-wise Add and Mul.
fn add<T: Element>(a: T, b: T) -> T {
    a.wrapping_add(b)
}

fn mul<T: Element>(a: T, b: T) -> T {
    a.wrapping_mul(b)
}

/// Mean of each window, computed in f32. Empty windows produce NaN.
pub fn mean_inner(data: &[f32], reduce_size: usize) -> Vec<f32> {
    if reduce_size == 0 {
        return Vec::new();
    }
    data.chunks(reduce_size)
        .map(|w| w.iter().sum::<f32>() / reduce_size as f32)
        .collect()
}

/// All / Any over each window of bool values.
pub fn logical_inner(data: &[bool], reduce_size: usize, op: ReduceOp) -> Vec<bool> {
    if reduce_size == 0 {
        return Vec::new();
    }
    data.chunks(reduce_size)
        .map(|w| match op {
            ReduceOp::Any => w.iter().any(|&x| x),
            _ => w.iter().all(|&x| x),
        })
        .collect()
}

/// Index of the first maximum (or minimum) within each window.
pub fn arg_reduce_inner<T: Element>(data: &[T], reduce_size: usize, op: ArgOp) -> Vec<i32> {
    if reduce_size == 0 {
        return Vec::new();
    }
    data.chunks(reduce_size)
        .map(|w| {
            let mut best = w[0];
            let mut best_index = 0usize;
            for (j, &x) in w.iter().enumerate().skip(1) {
                let better = match op {
                    ArgOp::ArgMax => x > best,
                    ArgOp::ArgMin => x < best,
                };
                if better {
                    best = x;
                    best_index = j;
                }
            }
            best_index as i32
        })
        .collect()
}

/// Running sum or product along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CumulativeOp {
    Sum,
    Prod,
}

/// Cumulative sum/product along `axis` of a `[outer, axis_len, inner]`
/// decomposition of the input. `exclusive` shifts by one (starting from the
/// identity); `reverse` accumulates from the end.
pub fn cumulative<T: Element>(
    data: &[T],
    dims: &[usize],
    axis: usize,
    op: CumulativeOp,
    exclusive: bool,
    reverse: bool,
) -> Vec<T> {
    let axis_len = dims[axis];
    let inner: usize = dims[axis + 1..].iter().product();
    let outer: usize = dims[..axis].iter().product();
    let identity = match op {
        CumulativeOp::Sum => T::zero(),
        CumulativeOp::Prod => T::one(),
    };
    let combine = |a: T, b: T| match op {
        CumulativeOp::Sum => add(a, b),
        CumulativeOp::Prod => mul(a, b),
    };
    let mut out = vec![identity; data.len()];
    for o in 0..outer {
        for i in 0..inner {
            let mut acc = identity;
            for step in 0..axis_len {
                let k = if reverse { axis_len - 1 - step } else { step };
                let idx = (o * axis_len + k) * inner + i;
                if exclusive {
                    out[idx] = acc;
                    acc = combine(acc, data[idx]);
                } else {
                    acc = combine(acc, data[idx]);
                    out[idx] = acc;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_constant() {
        let data = vec![2.5f32; 8];
        assert_eq!(reduce_inner(&data, 8, ReduceOp::Sum), vec![20.0]);
    }

    #[test]
    fn test_windows() {
        let data = [1i32, 5, 3, -2, 0, 4];
        assert_eq!(reduce_inner(&data, 3, ReduceOp::Max), vec![5, 4]);
        assert_eq!(reduce_inner(&data, 3, ReduceOp::Min), vec![1, -2]);
        assert_eq!(reduce_inner(&data, 3, ReduceOp::Prod), vec![15, 0]);
    }

    #[test]
    fn test_integer_sum_and_prod_wrap() {
        let data = [i32::MAX, 1, i32::MAX, 2];
        assert_eq!(reduce_inner(&data, 2, ReduceOp::Sum), vec![i32::MIN, i32::MIN + 1]);
        assert_eq!(reduce_inner(&data, 2, ReduceOp::Prod), vec![i32::MAX, -2]);
        assert_eq!(
            cumulative(&[i32::MAX, 1, 1], &[3], 0, CumulativeOp::Sum, false, false),
            vec![i32::MAX, i32::MIN, i32::MIN + 1]
        );
    }

    #[test]
    fn test_nan_poisons_max_and_min() {
        let data = [1.0f32, f32::NAN, 3.0, 1.0, 2.0, 3.0];
        let max = reduce_inner(&data, 3, ReduceOp::Max);
        assert!(max[0].is_nan());
        assert_eq!(max[1], 3.0);
        let min = reduce_inner(&data, 3, ReduceOp::Min);
        assert!(min[0].is_nan());
    }

    #[test]
    fn test_arg_reduce_first_occurrence() {
        let data = [1.0f32, 3.0, 3.0, 0.0, 0.0, -1.0];
        assert_eq!(arg_reduce_inner(&data, 3, ArgOp::ArgMax), vec![1, 0]);
        assert_eq!(arg_reduce_inner(&data, 3, ArgOp::ArgMin), vec![0, 2]);
    }

    #[test]
    fn test_logical() {
        let data = [true, false, true, true];
        assert_eq!(logical_inner(&data, 2, ReduceOp::All), vec![false, true]);
        assert_eq!(logical_inner(&data, 2, ReduceOp::Any), vec![true, true]);
    }

    #[test]
    fn test_cumsum_variants() {
        let data = [1i32, 2, 3, 4];
        let dims = [4];
        assert_eq!(
            cumulative(&data, &dims, 0, CumulativeOp::Sum, false, false),
            vec![1, 3, 6, 10]
        );
        assert_eq!(
            cumulative(&data, &dims, 0, CumulativeOp::Sum, true, false),
            vec![0, 1, 3, 6]
        );
        assert_eq!(
            cumulative(&data, &dims, 0, CumulativeOp::Sum, false, true),
            vec![10, 9, 7, 4]
        );
        assert_eq!(
            cumulative(&data, &dims, 0, CumulativeOp::Prod, false, false),
            vec![1, 2, 6, 24]
        );
    }

    #[test]
    fn test_cumsum_inner_axis() {
        // [[1, 2], [3, 4]] along axis 0 -> [[1, 2], [4, 6]]
        let out = cumulative(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2], 0, CumulativeOp::Sum, false, false);
        assert_eq!(out, vec![1.0, 2.0, 4.0, 6.0]);
    }
}
