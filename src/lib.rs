// SPDX-License-Identifier: AGPL-3.0-only

//! riffle — batched CSR SpMV accelerator validation environment.
//!
//! Partitions the rows of a sparse matrix into fixed-capacity thread-grid
//! batches, replays the partition plan over several independent output
//! buffers through a GPU compute queue, and judges the results against a
//! CPU reference with relative-error tolerances.
//!
//! ## Modules
//!   - `csr` — CSR matrix model, binary file loading, device staging
//!   - `reference` — CPU reference SpMV (the oracle)
//!   - `plan` — row-batch partitioning for the bounded thread grid
//!   - `dispatch` — orchestration over the `KernelQueue` seam + CPU queue
//!   - `gpu` — wgpu device wrapper, batch kernel, GPU queue
//!   - `verify` — relative-error comparison with worst-offender reporting
//!   - `validation` — check accumulator for the workload binaries
//!   - `tolerances` — documented verification thresholds
//!   - `vectors` — aligned dense vectors and the seeded PRNG
//!
//! ## Binaries
//!   - `spmv_csr` — load a CSR file, run the batched kernel `NUM_ITER`
//!     times, verify run-to-run determinism and CPU parity
//!   - `csr_gen` — write a seeded random matrix in the binary CSR layout

pub mod csr;
pub mod dispatch;
pub mod error;
pub mod gpu;
pub mod plan;
pub mod reference;
pub mod tolerances;
pub mod validation;
pub mod vectors;
pub mod verify;
