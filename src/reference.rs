// SPDX-License-Identifier: AGPL-3.0-only

//! CPU reference SpMV, the oracle for every accelerator run.
//!
//! Same accumulation as the kernel (`y[i] += Σ values[k] * x[col_idx[k]]`),
//! run on the host in plain f32. Pure function of its inputs with no hidden
//! state, so it can be re-run identically for differential testing.

use crate::csr::CsrMatrix;
use rayon::prelude::*;

/// Compute `y[i] = y_initial[i] + Σ values[k] * x[col_idx[k] + col_offset]`
/// over each row's nonzeros.
///
/// `col_offset` is the input-vector indexing convention: the accelerator
/// path reserves slot 0 as a bias slot and shifts column indices by one, so
/// the workload calls this with `col_offset = 1` and the padded input
/// vector. Entries of `y_initial` beyond `num_rows` (alignment padding) are
/// carried through unchanged.
///
/// Rows are independent, and the per-row accumulation order is fixed, so
/// the row-parallel map yields bit-identical results on every call.
///
/// # Panics
///
/// Panics if `y_initial` has fewer than `num_rows` entries or `x` does not
/// cover `col_idx` under `col_offset`; callers size both from the matrix.
#[must_use]
pub fn reference_spmv(
    csr: &CsrMatrix,
    x: &[f32],
    y_initial: &[f32],
    col_offset: usize,
) -> Vec<f32> {
    let n = csr.num_rows as usize;
    let mut y = y_initial.to_vec();

    y[..n].par_iter_mut().enumerate().for_each(|(i, yi)| {
        let lo = csr.row_ptr[i] as usize;
        let hi = csr.row_ptr[i + 1] as usize;
        let mut sum = 0.0f32;
        for k in lo..hi {
            sum += csr.values[k] * x[csr.col_idx[k] as usize + col_offset];
        }
        *yi += sum;
    });

    y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(n: u32) -> CsrMatrix {
        CsrMatrix {
            num_rows: n,
            num_cols: n,
            num_nonzeros: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: vec![1.0; n as usize],
        }
    }

    #[test]
    fn identity_returns_x_plus_y() {
        let m = identity(4);
        let x = vec![2.0, 3.0, 4.0, 5.0];
        let y0 = vec![0.0; 4];
        let y = reference_spmv(&m, &x, &y0, 0);
        assert_eq!(y, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn accumulates_on_top_of_initial_values() {
        let m = identity(3);
        let x = vec![1.0, 1.0, 1.0];
        let y0 = vec![10.0, 20.0, 30.0];
        let y = reference_spmv(&m, &x, &y0, 0);
        assert_eq!(y, vec![11.0, 21.0, 31.0]);
    }

    #[test]
    fn bias_offset_shifts_column_lookup() {
        let m = identity(3);
        // slot 0 reserved; logical x lives in slots 1..=3
        let x = vec![0.0, 7.0, 8.0, 9.0];
        let y = reference_spmv(&m, &x, &[0.0; 3], 1);
        assert_eq!(y, vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn empty_matrix_returns_initial_unchanged() {
        let m = CsrMatrix {
            num_rows: 0,
            num_cols: 0,
            num_nonzeros: 0,
            row_ptr: vec![0],
            col_idx: vec![],
            values: vec![],
        };
        let y0 = vec![1.5, 2.5, 3.5, 4.5]; // alignment padding only
        let y = reference_spmv(&m, &[], &y0, 0);
        assert_eq!(y, y0);
    }

    #[test]
    fn padding_rows_carried_through() {
        let m = identity(2);
        let x = vec![1.0, 1.0];
        let y0 = vec![0.0, 0.0, 0.0, 0.0]; // padded to 4
        let y = reference_spmv(&m, &x, &y0, 0);
        assert_eq!(y, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn repeat_calls_are_bit_identical() {
        let m = CsrMatrix {
            num_rows: 3,
            num_cols: 3,
            num_nonzeros: 6,
            row_ptr: vec![0, 2, 4, 6],
            col_idx: vec![0, 1, 1, 2, 0, 2],
            values: vec![0.3, -1.7, 2.2, 0.01, -5.5, 4.4],
        };
        let x = vec![0.9, -0.4, 1.3];
        let y0 = vec![0.1, 0.2, 0.3];
        let a = reference_spmv(&m, &x, &y0, 0);
        let b = reference_spmv(&m, &x, &y0, 0);
        for (va, vb) in a.iter().zip(&b) {
            assert_eq!(va.to_bits(), vb.to_bits());
        }
    }
}
