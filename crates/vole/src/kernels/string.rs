// String and ragged kernels
//
// Ragged outputs come back as a flat values tensor plus an i32 splits
// tensor with one more entry than there are rows.

use vole_core::{DType, Result, Shape, TensorInfo, Values};
use vole_cpu::string;

use super::{expect_dtype, expect_rank, wrong_op};
use crate::engine::Engine;
use crate::op::Op;

/// `(data, splits) -> (ngrams, ngram_splits)`.
pub(crate) fn string_ngrams(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::StringNGrams(opts) = op else {
        return Err(wrong_op("string_ngrams", op));
    };
    let (data, splits) = (&inputs[0], &inputs[1]);
    expect_rank("StringNGrams", data, 1)?;
    expect_rank("StringNGrams", splits, 1)?;
    let tokens = engine.read_strings(data)?;
    let row_splits = engine.read_i32(splits)?;
    let (ngrams, out_splits) = string::string_ngrams(&tokens, &row_splits, opts)?;
    let count = ngrams.len();
    let splits_len = out_splits.len();
    let ngrams = engine.write(Values::String(ngrams), Shape::from(count))?;
    let out_splits = engine.write_i32(out_splits, Shape::from(splits_len))?;
    Ok(vec![ngrams, out_splits])
}

/// `(input [n], delimiter []) -> (indices [k, 2], values [k], shape [2])`.
pub(crate) fn string_split(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::StringSplit(attrs) = op else {
        return Err(wrong_op("string_split", op));
    };
    let (input, delimiter) = (&inputs[0], &inputs[1]);
    expect_rank("StringSplit", input, 1)?;
    expect_rank("StringSplit", delimiter, 0)?;
    let strings = engine.read_strings(input)?;
    let delimiter = engine.read_strings(delimiter)?.into_iter().next().unwrap_or_default();
    let split = string::string_split(&strings, &delimiter, attrs.skip_empty);
    let count = split.values.len();
    let indices = engine.write_i32(split.indices, Shape::from((count, 2)))?;
    let values = engine.write(Values::String(split.values), Shape::from(count))?;
    let shape = engine.write_i32(split.dense_shape.to_vec(), Shape::from(2))?;
    Ok(vec![indices, values, shape])
}

/// `(starts, limits, deltas) -> (splits, values)`. Values stay i32 when
/// every input is i32.
pub(crate) fn ragged_range(engine: &mut Engine, op: &Op, inputs: &[TensorInfo]) -> Result<Vec<TensorInfo>> {
    let Op::RaggedRange = op else {
        return Err(wrong_op("ragged_range", op));
    };
    for t in inputs {
        expect_dtype("RaggedRange", t, &[DType::F32, DType::I32])?;
        if t.rank() > 1 {
            expect_rank("RaggedRange", t, 1)?;
        }
    }
    let (splits, values) = if inputs.iter().all(|t| t.dtype == DType::I32) {
        let read = |t: &TensorInfo| engine.read_i32(t);
        let (s, v) = string::ragged_range(&read(&inputs[0])?, &read(&inputs[1])?, &read(&inputs[2])?)?;
        (s, Values::I32(v))
    } else {
        let read = |t: &TensorInfo| engine.read_f32(t);
        let (s, v) = string::ragged_range(&read(&inputs[0])?, &read(&inputs[1])?, &read(&inputs[2])?)?;
        (s, Values::F32(v))
    };
    let rows = splits.len();
    let count = values.len();
    let splits = engine.write_i32(splits, Shape::from(rows))?;
    let values = match engine.write(values, Shape::from(count)) {
        Ok(v) => v,
        Err(e) => {
            engine.dispose(&splits)?;
            return Err(e);
        }
    };
    Ok(vec![splits, values])
}
