use rayon::prelude::*;

// Batched matrix multiply
//
// Operands are flat `[batch, rows, cols]` buffers. One side may have batch 1,
// in which case its single matrix is reused for every output batch; any
// richer broadcast of leading dims is materialized by the caller first.
//
// The inner loop is cache-blocked: the (i, j, k) iteration space is cut
// into `block x block x block` tiles so a tile of A and a tile of B stay hot
// while a tile of C accumulates.

/// Dimensions and options of one batched matmul call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatMulDims {
    pub a_batch: usize,
    pub b_batch: usize,
    /// Output rows.
    pub m: usize,
    /// Shared (contracted) dimension.
    pub k: usize,
    /// Output columns.
    pub n: usize,
    pub transpose_a: bool,
    pub transpose_b: bool,
}

impl MatMulDims {
    pub fn out_batch(&self) -> usize {
        self.a_batch.max(self.b_batch)
    }
}

/// `C[b] = op(A[b]) x op(B[b])` for every batch, where `op` optionally
/// transposes. Returns `[out_batch, m, n]`.
pub fn batch_matmul(a: &[f32], b: &[f32], dims: &MatMulDims, block: usize, parallel: bool) -> Vec<f32> {
    let MatMulDims { m, k, n, .. } = *dims;
    let block = block.max(1);
    let mut out = vec![0f32; dims.out_batch() * m * n];
    if m * n == 0 {
        return out;
    }

    let run = |bi: usize, c: &mut [f32]| {
        let a_mat = &a[(if dims.a_batch == 1 { 0 } else { bi }) * m * k..][..m * k];
        let b_mat = &b[(if dims.b_batch == 1 { 0 } else { bi }) * k * n..][..k * n];
        // element accessors honoring the transpose flags
        let a_at = |i: usize, kk: usize| {
            if dims.transpose_a {
                a_mat[kk * m + i]
            } else {
                a_mat[i * k + kk]
            }
        };
        let b_at = |kk: usize, j: usize| {
            if dims.transpose_b {
                b_mat[j * k + kk]
            } else {
                b_mat[kk * n + j]
            }
        };
        for i0 in (0..m).step_by(block) {
            let i_end = (i0 + block).min(m);
            for j0 in (0..n).step_by(block) {
                let j_end = (j0 + block).min(n);
                for k0 in (0..k).step_by(block) {
                    let k_end = (k0 + block).min(k);
                    for i in i0..i_end {
                        for j in j0..j_end {
                            let mut sum = 0f32;
                            for kk in k0..k_end {
                                sum += a_at(i, kk) * b_at(kk, j);
                            }
                            c[i * n + j] += sum;
                        }
                    }
                }
            }
        }
    };

    if parallel {
        out.par_chunks_mut(m * n)
            .enumerate()
            .for_each(|(bi, c)| run(bi, c));
    } else {
        out.chunks_mut(m * n).enumerate().for_each(|(bi, c)| run(bi, c));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(a_batch: usize, b_batch: usize, m: usize, k: usize, n: usize) -> MatMulDims {
        MatMulDims {
            a_batch,
            b_batch,
            m,
            k,
            n,
            transpose_a: false,
            transpose_b: false,
        }
    }

    #[test]
    fn test_matmul_2x3_3x2() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let out = batch_matmul(&a, &b, &dims(1, 1, 2, 3, 2), 48, false);
        assert_eq!(out, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_transposes() {
        // A^T where A is stored [3, 2]
        let at = [1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
        // B^T where B is stored [2, 3]
        let bt = [7.0, 9.0, 11.0, 8.0, 10.0, 12.0];
        let mut d = dims(1, 1, 2, 3, 2);
        d.transpose_a = true;
        d.transpose_b = true;
        assert_eq!(batch_matmul(&at, &bt, &d, 48, false), vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_small_block_matches_large_block() {
        let a: Vec<f32> = (0..2 * 5 * 7).map(|i| (i % 11) as f32 - 5.0).collect();
        let b: Vec<f32> = (0..7 * 3).map(|i| (i % 4) as f32).collect();
        let d = dims(2, 1, 5, 7, 3);
        let big = batch_matmul(&a, &b, &d, 48, false);
        let small = batch_matmul(&a, &b, &d, 2, false);
        let par = batch_matmul(&a, &b, &d, 3, true);
        assert_eq!(big, small);
        assert_eq!(big, par);
        assert_eq!(big.len(), 2 * 5 * 3);
    }
}
