use vole_core::{bail, Element, Error, Result};

// String and ragged kernels
//
// Ragged batches are flat values plus a row-splits vector: row `i` spans
// `values[splits[i]..splits[i + 1]]`. Valid splits start at 0, never
// decrease and end at the number of values.

/// Options for [`string_ngrams`].
#[derive(Debug, Clone, PartialEq)]
pub struct NGramOptions {
    pub separator: Vec<u8>,
    pub ngram_widths: Vec<usize>,
    pub left_pad: Vec<u8>,
    pub right_pad: Vec<u8>,
    /// Padding tokens on each side; negative means `width - 1`.
    pub pad_width: i64,
    pub preserve_short_sequences: bool,
}

/// Validate ragged row splits against the number of values.
pub fn validate_splits(splits: &[i32], num_values: usize) -> Result<()> {
    let Some(&first) = splits.first() else {
        if num_values == 0 {
            return Ok(());
        }
        return Err(Error::InvalidSplits("splits are empty but data is not".into()));
    };
    if first != 0 {
        return Err(Error::InvalidSplits(format!("first split value must be 0, got {first}")));
    }
    for (i, pair) in splits.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(Error::InvalidSplits(format!(
                "split {} ({}) is less than split {} ({})",
                i + 1,
                pair[1],
                i,
                pair[0]
            )));
        }
    }
    let last = splits[splits.len() - 1];
    if last as usize != num_values {
        return Err(Error::InvalidSplits(format!(
            "last split value must equal data length {num_values}, got {last}"
        )));
    }
    Ok(())
}

impl NGramOptions {
    fn pad_for(&self, width: usize) -> usize {
        let max = width.saturating_sub(1);
        if self.pad_width < 0 {
            max
        } else {
            (self.pad_width as usize).min(max)
        }
    }

    fn count_for(&self, length: usize, width: usize) -> usize {
        (length + 2 * self.pad_for(width) + 1).saturating_sub(width)
    }

    /// Emit `count` ngrams of `width` tokens from `row`, padding at the ends.
    fn emit(&self, row: &[Vec<u8>], width: usize, count: usize, out: &mut Vec<Vec<u8>>) {
        let pad = self.pad_for(width);
        for g in 0..count {
            let left = pad.saturating_sub(g);
            let right = pad.saturating_sub(count - (g + 1));
            let tokens = width - (left + right).min(width);
            let start = if left > 0 { 0 } else { g - pad };
            let mut ngram = Vec::new();
            let pieces = std::iter::repeat(self.left_pad.as_slice())
                .take(left)
                .chain(row[start..start + tokens].iter().map(|t| t.as_slice()))
                .chain(std::iter::repeat(self.right_pad.as_slice()).take(right));
            for (i, piece) in pieces.enumerate() {
                if i > 0 {
                    ngram.extend_from_slice(&self.separator);
                }
                ngram.extend_from_slice(piece);
            }
            out.push(ngram);
        }
    }
}

/// Build ngrams of every requested width for each ragged row. Returns the
/// ngrams and their row splits.
pub fn string_ngrams(data: &[Vec<u8>], splits: &[i32], opts: &NGramOptions) -> Result<(Vec<Vec<u8>>, Vec<i32>)> {
    validate_splits(splits, data.len())?;
    if opts.ngram_widths.iter().any(|&w| w == 0) {
        bail!("string_ngrams: ngram widths must be positive, got {:?}", opts.ngram_widths);
    }
    let mut ngrams = Vec::new();
    let mut out_splits = vec![0i32];
    for pair in splits.windows(2) {
        let row = &data[pair[0] as usize..pair[1] as usize];
        let before = ngrams.len();
        for &width in &opts.ngram_widths {
            let count = opts.count_for(row.len(), width);
            opts.emit(row, width, count, &mut ngrams);
        }
        if opts.preserve_short_sequences && ngrams.len() == before && !row.is_empty() {
            let width = row.len() + 2 * opts.pad_width.max(0) as usize;
            opts.emit(row, width, 1, &mut ngrams);
        }
        out_splits.push(ngrams.len() as i32);
    }
    Ok((ngrams, out_splits))
}

/// Result of [`string_split`] in sparse form.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult {
    /// `[n, 2]` (row, position) pairs.
    pub indices: Vec<i32>,
    pub values: Vec<Vec<u8>>,
    /// `[rows, max tokens per row]`.
    pub dense_shape: [i32; 2],
}

/// Split each string on any byte of `delimiter` (every byte is its own token
/// when `delimiter` is empty).
pub fn string_split(input: &[Vec<u8>], delimiter: &[u8], skip_empty: bool) -> SplitResult {
    let mut indices = Vec::new();
    let mut values = Vec::new();
    let mut max_tokens = 0usize;
    for (row, s) in input.iter().enumerate() {
        let tokens: Vec<&[u8]> = if delimiter.is_empty() {
            s.chunks(1).collect()
        } else {
            s.split(|b| delimiter.contains(b)).collect()
        };
        let mut n = 0usize;
        for t in tokens {
            if skip_empty && t.is_empty() {
                continue;
            }
            indices.push(row as i32);
            indices.push(n as i32);
            values.push(t.to_vec());
            n += 1;
        }
        max_tokens = max_tokens.max(n);
    }
    SplitResult {
        indices,
        values,
        dense_shape: [input.len() as i32, max_tokens as i32],
    }
}

/// Number of elements in `range(start, limit, delta)`.
fn range_len(start: f64, limit: f64, delta: f64) -> usize {
    if (delta > 0.0 && start >= limit) || (delta < 0.0 && start <= limit) {
        0
    } else {
        ((limit - start).abs() / delta.abs()).ceil() as usize
    }
}

/// Concatenated ranges, one per row. Each argument is either length 1
/// (broadcast) or the common row count. Returns `(row_splits, values)`.
pub fn ragged_range<T: Element>(starts: &[T], limits: &[T], deltas: &[T]) -> Result<(Vec<i32>, Vec<T>)> {
    let lens = [starts.len(), limits.len(), deltas.len()];
    let rows = lens.iter().copied().max().unwrap_or(0);
    for &l in &lens {
        if l != 1 && l != rows {
            bail!("ragged_range: starts, limits and deltas must have compatible lengths, got {:?}", lens);
        }
    }
    let at = |v: &[T], i: usize| if v.len() == 1 { v[0] } else { v[i] };

    let mut splits = Vec::with_capacity(rows + 1);
    splits.push(0i32);
    let mut values = Vec::new();
    for i in 0..rows {
        let (start, limit, delta) = (at(starts, i), at(limits, i), at(deltas, i));
        if delta.as_f64() == 0.0 {
            return Err(Error::InvalidSize {
                op: "ragged_range",
                value: 0,
                reason: "deltas must be non-zero".into(),
            });
        }
        let n = range_len(start.as_f64(), limit.as_f64(), delta.as_f64());
        for j in 0..n {
            values.push(T::from_f64(start.as_f64() + j as f64 * delta.as_f64()));
        }
        splits.push(values.len() as i32);
    }
    Ok((splits, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(v: &[&str]) -> Vec<Vec<u8>> {
        v.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    fn opts(widths: Vec<usize>, pad_width: i64, preserve: bool) -> NGramOptions {
        NGramOptions {
            separator: b"|".to_vec(),
            ngram_widths: widths,
            left_pad: b"LP".to_vec(),
            right_pad: b"RP".to_vec(),
            pad_width,
            preserve_short_sequences: preserve,
        }
    }

    #[test]
    fn test_bigrams_no_padding() {
        let data = strs(&["a", "b", "c", "d", "e"]);
        let (ngrams, splits) = string_ngrams(&data, &[0, 3, 5], &opts(vec![2], 0, false)).unwrap();
        assert_eq!(ngrams, strs(&["a|b", "b|c", "d|e"]));
        assert_eq!(splits, vec![0, 2, 3]);
    }

    #[test]
    fn test_trigrams_with_padding() {
        let data = strs(&["a", "b"]);
        let (ngrams, _) = string_ngrams(&data, &[0, 2], &opts(vec![3], 1, false)).unwrap();
        assert_eq!(ngrams, strs(&["LP|a|b", "a|b|RP"]));
    }

    #[test]
    fn test_preserve_short_sequences() {
        let data = strs(&["a"]);
        let (ngrams, splits) = string_ngrams(&data, &[0, 1], &opts(vec![3], 0, true)).unwrap();
        assert_eq!(ngrams, strs(&["a"]));
        assert_eq!(splits, vec![0, 1]);
    }

    #[test]
    fn test_invalid_splits() {
        let data = strs(&["a", "b"]);
        let o = opts(vec![1], 0, false);
        assert!(matches!(string_ngrams(&data, &[1, 2], &o), Err(Error::InvalidSplits(_))));
        assert!(matches!(string_ngrams(&data, &[0, 2, 1], &o), Err(Error::InvalidSplits(_))));
        assert!(matches!(string_ngrams(&data, &[0, 1], &o), Err(Error::InvalidSplits(_))));
    }

    #[test]
    fn test_string_split() {
        let res = string_split(&strs(&["a b", "c  d e"]), b" ", true);
        assert_eq!(res.values, strs(&["a", "b", "c", "d", "e"]));
        assert_eq!(res.dense_shape, [2, 3]);
        assert_eq!(&res.indices[4..6], &[1, 0]);

        let keep = string_split(&strs(&["c  d"]), b" ", false);
        assert_eq!(keep.values.len(), 3);
    }

    #[test]
    fn test_ragged_range() {
        let (splits, values) = ragged_range(&[0i32, 5], &[3, 1], &[1, -2]).unwrap();
        assert_eq!(splits, vec![0, 3, 5]);
        assert_eq!(values, vec![0, 1, 2, 5, 3]);
        assert!(ragged_range(&[0.0f32], &[1.0], &[0.0]).is_err());
    }
}
