// SPDX-License-Identifier: AGPL-3.0-only

//! Batched CSR SpMV on the GPU, validated against a CPU reference.
//!
//! Computes `y = y + A * x` for a sparse matrix loaded from a binary CSR
//! file, `NUM_ITER` times into independent output buffers that start from
//! bit-identical random state. All runs replay the same batch plan, so
//! pairwise agreement proves the accelerator path is deterministic; the
//! first run is then held against the CPU reference for correctness.
//!
//! Usage: `spmv_csr [csr_file]` (defaults to `Protein_csr.dat`).
//! Exit code 0 = verification passed, 1 = load failure or any check failed.

use riffle::csr::CsrMatrix;
use riffle::dispatch::{run_plan, NUM_ITER};
use riffle::gpu::{GpuContext, GpuQueue};
use riffle::plan::{BatchPlan, GridConfig};
use riffle::reference::reference_spmv;
use riffle::tolerances::{GPU_VS_CPU_SPMV, RUN_DETERMINISM};
use riffle::validation::ValidationHarness;
use riffle::vectors::{input_vector, output_vector, LcgRng, OWORD_ALIGNMENT};
use riffle::verify::{compare, VerifyReport};
use std::path::Path;
use std::process;

const DEFAULT_CSR_FILE: &str = "Protein_csr.dat";
const VECTOR_SEED: u64 = 1;

fn parse_args() -> String {
    for arg in std::env::args().skip(1) {
        if arg.starts_with('-') {
            eprintln!("Unknown option '{arg}'. Exiting...");
            eprintln!("Usage: spmv_csr [input_matrix]");
            process::exit(1);
        }
        return arg;
    }
    DEFAULT_CSR_FILE.to_string()
}

fn print_mismatch(report: &VerifyReport) {
    if let VerifyReport::Fail {
        index,
        reference,
        candidate,
        max_rel_error,
    } = report
    {
        println!("    max rel error = {max_rel_error:.6e}");
        println!("    error index   = {index}");
        println!("    error ref     = {reference:.6e}");
        println!("    error res     = {candidate:.6e}");
    }
}

fn main() {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Batched CSR SpMV — GPU kernel vs CPU reference            ║");
    println!("║  {NUM_ITER} independent runs · strided-scatter thread grid        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let csr_filename = parse_args();

    let csr = match CsrMatrix::load(Path::new(&csr_filename)) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    println!(
        "  Using {}-by-{} matrix with {} nonzero values",
        csr.num_rows, csr.num_cols, csr.num_nonzeros
    );

    // ── GPU device ──────────────────────────────────────────────────
    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("tokio runtime: {e}");
        process::exit(1);
    });
    let gpu = match rt.block_on(GpuContext::new()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("{e}");
            GpuContext::print_available_adapters();
            process::exit(1);
        }
    };
    println!("  GPU: {}", gpu.adapter_name);
    println!();

    // ── Vectors and plan ────────────────────────────────────────────
    // One seeded stream fills x then y, so every invocation starts from
    // the same state. Slot 0 of x is the kernel's reserved bias slot.
    let mut rng = LcgRng::new(VECTOR_SEED);
    let x = input_vector(csr.num_cols, &mut rng);
    let y = output_vector(csr.num_rows, &mut rng);

    let grid = GridConfig::REFERENCE;
    let plan = BatchPlan::build(csr.num_rows, &grid);
    println!(
        "  Plan: {} batch(es) of up to {} rows ({} threads per full grid)",
        plan.len(),
        grid.batch_row_size(),
        grid.batch_thread_count()
    );

    let reference = reference_spmv(&csr, x.as_slice(), y.as_slice(), 1);

    // ── Dispatch ────────────────────────────────────────────────────
    let device_csr = csr.device_arrays(OWORD_ALIGNMENT);
    let mut queue = GpuQueue::new(&gpu, &device_csr, x.as_slice(), y.as_slice(), NUM_ITER);
    let outputs = match run_plan(&mut queue, &plan, &grid, csr.num_rows, NUM_ITER) {
        Ok(outputs) => outputs,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    // ── Verification ────────────────────────────────────────────────
    let mut harness = ValidationHarness::new("spmv_csr");
    let n = csr.num_rows as usize;

    println!();
    println!("═══ Run-to-run determinism (runs 1..{NUM_ITER} vs run 0) ═══");
    for (i, candidate) in outputs.iter().enumerate().skip(1) {
        let report = compare(&outputs[0][..n], &candidate[..n], RUN_DETERMINISM);
        if !report.passed() {
            println!("  Discrepancy in run {i}:");
            print_mismatch(&report);
        }
        harness.check_upper(
            &format!("run {i} agrees with run 0"),
            f64::from(report.max_rel_error()),
            f64::from(RUN_DETERMINISM),
        );
    }

    println!("═══ CPU reference parity (run 0 vs reference) ═══");
    let report = compare(&reference[..n], &outputs[0][..n], GPU_VS_CPU_SPMV);
    if report.passed() {
        println!("  Result matches reference CPU implementation");
    } else {
        print_mismatch(&report);
    }
    harness.check_upper(
        "GPU result matches CPU reference",
        f64::from(report.max_rel_error()),
        f64::from(GPU_VS_CPU_SPMV),
    );

    harness.finish();
}
