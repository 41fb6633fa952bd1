// SPDX-License-Identifier: AGPL-3.0-only

//! Row-batch partitioning for a bounded accelerator thread grid.
//!
//! The accelerator processes a fixed 2-D thread grid per enqueue:
//! `width` threads per grid row, up to `height_multiplier` grid rows, each
//! thread covering `rows_per_thread` matrix rows via strided scatter reads.
//! One enqueue therefore covers at most
//! `width * height_multiplier * rows_per_thread` matrix rows; larger
//! matrices are split into a sequence of batches, and the final batch sizes
//! its grid to the remaining rows. The dispatch layer replays the plan
//! without reasoning about any of these limits.

/// Thread-grid shape constants for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridConfig {
    /// Threads per grid row.
    pub width: u32,
    /// Grid rows per batch.
    pub height_multiplier: u32,
    /// Matrix rows covered by one thread via strided reads.
    pub rows_per_thread: u32,
}

impl GridConfig {
    /// Grid shape of the reference workload (60-wide grid, 16 grid rows,
    /// 16-row scatter per thread: 15360 matrix rows per batch).
    pub const REFERENCE: Self = Self {
        width: 60,
        height_multiplier: 16,
        rows_per_thread: 16,
    };

    /// Threads in a full batch.
    #[must_use]
    pub const fn batch_thread_count(&self) -> u32 {
        self.width * self.height_multiplier
    }

    /// Matrix rows covered by a full batch.
    #[must_use]
    pub const fn batch_row_size(&self) -> u32 {
        self.batch_thread_count() * self.rows_per_thread
    }
}

/// One enqueue: a contiguous row range starting at `row_start`, processed
/// by `thread_count` threads (always a whole number of grid rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub row_start: u32,
    pub thread_count: u32,
}

/// Ordered batch descriptors plus the per-thread scatter stride table.
///
/// Built deterministically from the row count and grid shape; read-only once
/// built. Rebuild whenever the matrix's row count changes.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub batches: Vec<Batch>,
    /// `strides[k] = k * width`: offsets of the rows one thread covers,
    /// relative to its starting row. Fixed across batches.
    pub strides: Vec<u32>,
}

impl BatchPlan {
    /// Partition `num_rows` rows into batches for `grid`.
    #[must_use]
    pub fn build(num_rows: u32, grid: &GridConfig) -> Self {
        let strides = (0..grid.rows_per_thread).map(|k| k * grid.width).collect();

        let row_size = grid.batch_row_size();
        let mut batches = Vec::new();
        if num_rows > 0 {
            let last = last_batch_thread_count(num_rows, grid);
            let mut row_start = 0;
            while row_start < num_rows {
                let thread_count = if row_start + row_size < num_rows {
                    grid.batch_thread_count()
                } else {
                    last
                };
                batches.push(Batch {
                    row_start,
                    thread_count,
                });
                row_start += row_size;
            }
        }

        Self { batches, strides }
    }

    /// Total batch count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// True when there are no rows to process.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Exact thread count for the final batch.
///
/// Walks the grid in dispatch order (grid rows, then grid columns within
/// each), counting one thread per column until a thread's starting row
/// reaches `num_rows`, then rounds up to a whole grid row. A row count that
/// is an exact multiple of the batch row size needs the full grid.
fn last_batch_thread_count(num_rows: u32, grid: &GridConfig) -> u32 {
    let row_size = grid.batch_row_size();
    let last_start = (num_rows / row_size) * row_size;
    if last_start == num_rows {
        return grid.batch_thread_count();
    }

    let mut count: u32 = 0;
    'grid: for k in 0..grid.height_multiplier {
        for j in 0..grid.width {
            let thread_start = last_start + k * grid.width * grid.rows_per_thread + j;
            if thread_start >= num_rows {
                break 'grid;
            }
            count += 1;
        }
    }

    count.div_ceil(grid.width) * grid.width
}
