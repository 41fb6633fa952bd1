// SPDX-License-Identifier: AGPL-3.0-only

//! Batch dispatch orchestration over a kernel execution queue.
//!
//! The orchestrator is a pure scheduler: it replays a [`BatchPlan`] over
//! several independent output buffers through the narrow [`KernelQueue`]
//! seam and performs no numeric computation itself. Queue implementations
//! are in-order execution channels: batches enqueued for one run execute in
//! enqueue order, and a run's output is defined only after a wait on the
//! completion event of that run's last batch.
//!
//! Two implementations exist: [`CpuQueue`] here (accelerator-free, applies
//! the kernel math synchronously with full thread-grid semantics) and
//! `GpuQueue` in the `gpu` module.

use crate::csr::DeviceCsr;
use crate::error::RiffleError;
use crate::plan::{BatchPlan, GridConfig};

/// Independent output buffers replayed through the same plan by the
/// reference workload. All runs start from bit-identical state, so any
/// cross-run disagreement is nondeterminism in the accelerator path.
pub const NUM_ITER: usize = 10;

/// Arguments for one batch enqueue, bundled in dispatch order.
#[derive(Debug, Clone, Copy)]
pub struct BatchDispatch<'a> {
    /// First matrix row of this batch.
    pub row_start: u32,
    /// Threads to launch; a whole number of grid rows.
    pub thread_count: u32,
    /// Threads per grid row.
    pub grid_width: u32,
    /// Row guard: threads must not touch rows at or beyond this index.
    pub max_rows: u32,
    /// Per-thread scatter offsets relative to the thread's starting row.
    pub strides: &'a [u32],
}

/// The kernel execution seam.
///
/// `enqueue` is asynchronous and returns an opaque completion event;
/// `wait` blocks (without spinning) until the event's batch has made its
/// writes visible; `read_back` copies a run's output buffer to host memory
/// and is valid only after a wait covering every batch of that run.
pub trait KernelQueue {
    /// Opaque completion handle for one enqueued batch.
    type Event;

    /// Enqueue one batch against run `run`'s output buffer.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the whole orchestration: a missing batch
    /// leaves rows silently unmodified, indistinguishable from a correct
    /// zero-contribution row.
    fn enqueue(&mut self, run: usize, dispatch: &BatchDispatch<'_>)
        -> Result<Self::Event, RiffleError>;

    /// Block until the event's batch completes.
    ///
    /// # Errors
    ///
    /// Collaborator-surfaced failures, fatal as for `enqueue`.
    fn wait(&mut self, event: Self::Event) -> Result<(), RiffleError>;

    /// Copy run `run`'s output buffer back to host memory.
    ///
    /// # Errors
    ///
    /// Collaborator-surfaced failures, fatal as for `enqueue`.
    fn read_back(&mut self, run: usize) -> Result<Vec<f32>, RiffleError>;
}

/// Replay `plan` once per run and read back every run's output.
///
/// Enqueues are fire-and-forget; only the last batch's event per run is
/// retained, and each run's read-back is preceded by a blocking wait on
/// that event (the queue's in-order guarantee covers the earlier batches).
///
/// # Errors
///
/// Propagates the first enqueue/wait/read-back failure unchanged; no
/// partial results are returned.
pub fn run_plan<Q: KernelQueue>(
    queue: &mut Q,
    plan: &BatchPlan,
    grid: &GridConfig,
    num_rows: u32,
    num_runs: usize,
) -> Result<Vec<Vec<f32>>, RiffleError> {
    let mut final_events: Vec<Option<Q::Event>> = (0..num_runs).map(|_| None).collect();

    for (run, slot) in final_events.iter_mut().enumerate() {
        for batch in &plan.batches {
            let dispatch = BatchDispatch {
                row_start: batch.row_start,
                thread_count: batch.thread_count,
                grid_width: grid.width,
                max_rows: num_rows,
                strides: &plan.strides,
            };
            *slot = Some(queue.enqueue(run, &dispatch)?);
        }
    }

    let mut outputs = Vec::with_capacity(num_runs);
    for (run, event) in final_events.into_iter().enumerate() {
        if let Some(event) = event {
            queue.wait(event)?;
        }
        outputs.push(queue.read_back(run)?);
    }
    Ok(outputs)
}

/// Accelerator-free [`KernelQueue`]: applies the kernel's per-thread math
/// synchronously on the host.
///
/// Follows the exact thread-grid semantics of the accelerator kernel (thread
/// base row from grid coordinates, scatter strides, `max_rows` guard), so
/// planner and orchestrator are exercised end-to-end with no device present.
pub struct CpuQueue {
    row_ptr: Vec<u32>,
    col_idx: Vec<u32>,
    values: Vec<f32>,
    x: Vec<f32>,
    outputs: Vec<Vec<f32>>,
}

impl CpuQueue {
    /// Queue over the staged matrix, shared input vector, and `num_runs`
    /// copies of the initial output vector.
    #[must_use]
    pub fn new(device: &DeviceCsr, x: &[f32], y_initial: &[f32], num_runs: usize) -> Self {
        Self {
            row_ptr: device.row_ptr.clone(),
            col_idx: device.col_idx.clone(),
            values: device.values.clone(),
            x: x.to_vec(),
            outputs: vec![y_initial.to_vec(); num_runs],
        }
    }
}

impl KernelQueue for CpuQueue {
    // The host queue completes each batch inside `enqueue`.
    type Event = ();

    fn enqueue(
        &mut self,
        run: usize,
        dispatch: &BatchDispatch<'_>,
    ) -> Result<Self::Event, RiffleError> {
        let y = &mut self.outputs[run];
        let rows_per_thread = dispatch.strides.len() as u32;
        let block = dispatch.grid_width * rows_per_thread;

        for tid in 0..dispatch.thread_count {
            let grid_col = tid % dispatch.grid_width;
            let grid_row = tid / dispatch.grid_width;
            let base = dispatch.row_start + grid_row * block + grid_col;

            for &stride in dispatch.strides {
                let row = base + stride;
                if row >= dispatch.max_rows {
                    continue;
                }
                let lo = self.row_ptr[row as usize] as usize;
                let hi = self.row_ptr[row as usize + 1] as usize;
                let mut sum = 0.0f32;
                for k in lo..hi {
                    sum += self.values[k] * self.x[self.col_idx[k] as usize];
                }
                y[row as usize] += sum;
            }
        }
        Ok(())
    }

    fn wait(&mut self, _event: Self::Event) -> Result<(), RiffleError> {
        Ok(())
    }

    fn read_back(&mut self, run: usize) -> Result<Vec<f32>, RiffleError> {
        Ok(self.outputs[run].clone())
    }
}
