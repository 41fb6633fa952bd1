// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized verification tolerances with documented rationale.
//!
//! Every threshold used by the workload binaries is defined here. No ad-hoc
//! magic numbers at the call sites.

/// Pairwise agreement between repeated accelerator runs.
///
/// All runs replay the same batch plan from bit-identical initial state, so
/// the only admissible spread is instruction-ordering noise in the device's
/// f32 accumulation. 2e-3 relative error flags genuine nondeterminism
/// (racing writes, missed batches) without tripping on rounding.
pub const RUN_DETERMINISM: f32 = 0.002;

/// Accelerator result against the f32 CPU reference.
///
/// CPU and device accumulate each row in different orders with different
/// FMA contraction, and f32 carries ~7.2 significant digits, so long rows
/// drift well past machine epsilon. 2e-2 relative error separates
/// accumulation-order drift from wrong results.
pub const GPU_VS_CPU_SPMV: f32 = 0.02;

/// Operations that should be exact in f32 up to a few rounding steps.
///
/// Used in tests for small matrices whose row sums involve a handful of
/// representable values.
pub const EXACT_F32: f32 = 1e-6;
