// SPDX-License-Identifier: AGPL-3.0-only

//! Compressed Sparse Row matrix model and binary file loading.
//!
//! File layout (little-endian, no header magic):
//!
//! | Field | Type | Count |
//! |-------|------|-------|
//! | `num_cols` | u32 | 1 |
//! | `num_rows` | u32 | 1 |
//! | `num_nonzeros` | u32 | 1 |
//! | `col_idx` | u32 | `num_nonzeros` |
//! | `row_ptr` | u32 | `num_rows + 1` |
//! | `values` | f32 | `num_nonzeros` |
//!
//! A failed load never returns a partial matrix. The loaded matrix is
//! immutable and exclusively owned by the caller.

use crate::error::RiffleError;
use crate::vectors::align_up;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// Sparse matrix in Compressed Sparse Row format, f32 values.
///
/// For every row `i`, the half-open slice `row_ptr[i]..row_ptr[i+1]` indexes
/// that row's nonzeros in `col_idx` and `values`.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    pub num_rows: u32,
    pub num_cols: u32,
    pub num_nonzeros: u32,
    pub row_ptr: Vec<u32>,
    pub col_idx: Vec<u32>,
    pub values: Vec<f32>,
}

/// Host-side staging of the accelerator buffer layout.
///
/// `row_ptr` is extended to the aligned row count (extension entries repeat
/// the terminal nonzero count, describing empty rows), and `col_idx` is
/// shifted by one so the input vector's slot 0 stays a reserved bias slot.
#[derive(Debug, Clone)]
pub struct DeviceCsr {
    pub num_rows: u32,
    pub padded_rows: u32,
    pub row_ptr: Vec<u32>,
    pub col_idx: Vec<u32>,
    pub values: Vec<f32>,
}

impl CsrMatrix {
    /// Load a matrix from the binary CSR layout.
    ///
    /// # Errors
    ///
    /// [`RiffleError::Io`] if the file cannot be opened,
    /// [`RiffleError::CorruptInput`] if any read returns fewer elements than
    /// expected or the loaded structure violates the CSR invariants.
    pub fn load(path: &Path) -> Result<Self, RiffleError> {
        let file = File::open(path)
            .map_err(|e| RiffleError::Io(format!("opening {}: {e}", path.display())))?;
        let mut reader = BufReader::new(file);

        let num_cols = read_u32(&mut reader, "num_cols")?;
        let num_rows = read_u32(&mut reader, "num_rows")?;
        let num_nonzeros = read_u32(&mut reader, "num_nonzeros")?;

        let col_idx = read_u32_array(&mut reader, num_nonzeros as usize, "column indices")?;
        let row_ptr = read_u32_array(&mut reader, num_rows as usize + 1, "row extents")?;
        let values = read_f32_array(&mut reader, num_nonzeros as usize, "nonzero values")?;

        let matrix = Self {
            num_rows,
            num_cols,
            num_nonzeros,
            row_ptr,
            col_idx,
            values,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// Check the structural CSR invariants.
    ///
    /// # Errors
    ///
    /// [`RiffleError::CorruptInput`] naming the first violated invariant.
    pub fn validate(&self) -> Result<(), RiffleError> {
        if self.row_ptr.len() != self.num_rows as usize + 1 {
            return Err(RiffleError::CorruptInput(format!(
                "row extents hold {} entries, expected {}",
                self.row_ptr.len(),
                self.num_rows + 1
            )));
        }
        if self.row_ptr[0] != 0 {
            return Err(RiffleError::CorruptInput(format!(
                "row extents start at {}, expected 0",
                self.row_ptr[0]
            )));
        }
        if self.row_ptr[self.num_rows as usize] != self.num_nonzeros {
            return Err(RiffleError::CorruptInput(format!(
                "row extents end at {}, expected nonzero count {}",
                self.row_ptr[self.num_rows as usize],
                self.num_nonzeros
            )));
        }
        if let Some(i) = (0..self.num_rows as usize).find(|&i| self.row_ptr[i] > self.row_ptr[i + 1])
        {
            return Err(RiffleError::CorruptInput(format!(
                "row extents decrease at row {i}: {} > {}",
                self.row_ptr[i],
                self.row_ptr[i + 1]
            )));
        }
        if let Some(k) = self.col_idx.iter().position(|&c| c >= self.num_cols) {
            return Err(RiffleError::CorruptInput(format!(
                "column index {} at entry {k} exceeds column count {}",
                self.col_idx[k], self.num_cols
            )));
        }
        Ok(())
    }

    /// Number of nonzeros in row `i`.
    #[must_use]
    pub fn row_len(&self, i: usize) -> usize {
        (self.row_ptr[i + 1] - self.row_ptr[i]) as usize
    }

    /// Stage the accelerator buffer layout: aligned row count, bias-shifted
    /// column indices, values unchanged.
    #[must_use]
    pub fn device_arrays(&self, alignment: usize) -> DeviceCsr {
        let padded_rows = align_up(self.num_rows as usize, alignment) as u32;

        let mut row_ptr = Vec::with_capacity(padded_rows as usize + 1);
        row_ptr.extend_from_slice(&self.row_ptr);
        row_ptr.resize(padded_rows as usize + 1, self.num_nonzeros);

        let col_idx: Vec<u32> = self.col_idx.iter().map(|&c| c + 1).collect();

        DeviceCsr {
            num_rows: self.num_rows,
            padded_rows,
            row_ptr,
            col_idx,
            values: self.values.clone(),
        }
    }
}

fn read_u32(reader: &mut impl Read, what: &str) -> Result<u32, RiffleError> {
    let mut bytes = [0u8; 4];
    read_all(reader, &mut bytes, what)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u32_array(
    reader: &mut impl Read,
    count: usize,
    what: &str,
) -> Result<Vec<u32>, RiffleError> {
    let bytes = read_byte_array(reader, count, what)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let b: [u8; 4] = chunk.try_into().expect("chunks_exact(4) yields 4 bytes");
            u32::from_le_bytes(b)
        })
        .collect())
}

fn read_f32_array(
    reader: &mut impl Read,
    count: usize,
    what: &str,
) -> Result<Vec<f32>, RiffleError> {
    let bytes = read_byte_array(reader, count, what)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let b: [u8; 4] = chunk.try_into().expect("chunks_exact(4) yields 4 bytes");
            f32::from_le_bytes(b)
        })
        .collect())
}

fn read_byte_array(reader: &mut impl Read, count: usize, what: &str) -> Result<Vec<u8>, RiffleError> {
    let mut bytes = vec![0u8; count * 4];
    read_all(reader, &mut bytes, what)?;
    Ok(bytes)
}

fn read_all(reader: &mut impl Read, buf: &mut [u8], what: &str) -> Result<(), RiffleError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            RiffleError::CorruptInput(format!("short read in {what}"))
        } else {
            RiffleError::Io(format!("reading {what}: {e}"))
        }
    })
}
