// SPDX-License-Identifier: AGPL-3.0-only

//! Seeded random CSR matrix generator.
//!
//! Writes a matrix in the binary CSR file layout consumed by `spmv_csr`,
//! so the workload can be exercised without a vendor dataset. Equal seeds
//! produce byte-identical files.
//!
//! Usage: `csr_gen [--rows=N] [--cols=N] [--row-nnz=N] [--seed=N] [output_file]`

use riffle::vectors::LcgRng;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::process;

const DEFAULT_OUTPUT: &str = "random_csr.dat";

struct GenConfig {
    rows: u32,
    cols: u32,
    row_nnz: u32,
    seed: u64,
    output: String,
}

fn usage() -> ! {
    eprintln!("Usage: csr_gen [--rows=N] [--cols=N] [--row-nnz=N] [--seed=N] [output_file]");
    process::exit(1);
}

fn parse_u64(arg: &str, value: &str) -> u64 {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Bad value in '{arg}'");
        usage();
    })
}

fn parse_args() -> GenConfig {
    let mut config = GenConfig {
        rows: 10_000,
        cols: 10_000,
        row_nnz: 8,
        seed: 1,
        output: DEFAULT_OUTPUT.to_string(),
    };

    for arg in std::env::args().skip(1) {
        if let Some(v) = arg.strip_prefix("--rows=") {
            config.rows = parse_u64(&arg, v) as u32;
        } else if let Some(v) = arg.strip_prefix("--cols=") {
            config.cols = parse_u64(&arg, v) as u32;
        } else if let Some(v) = arg.strip_prefix("--row-nnz=") {
            config.row_nnz = parse_u64(&arg, v) as u32;
        } else if let Some(v) = arg.strip_prefix("--seed=") {
            config.seed = parse_u64(&arg, v);
        } else if arg.starts_with('-') {
            eprintln!("Unknown option '{arg}'");
            usage();
        } else {
            config.output = arg;
        }
    }

    if config.cols == 0 && config.rows > 0 && config.row_nnz > 0 {
        eprintln!("Cannot place nonzeros in a matrix with no columns");
        usage();
    }
    config
}

fn write_u32s(w: &mut impl Write, values: &[u32]) -> std::io::Result<()> {
    for &v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn write_f32s(w: &mut impl Write, values: &[f32]) -> std::io::Result<()> {
    for &v in values {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn main() {
    let config = parse_args();
    let mut rng = LcgRng::new(config.seed);

    // Per-row sampled columns, sorted and deduplicated; row lengths may
    // come out slightly under row_nnz when samples collide.
    let mut row_ptr = Vec::with_capacity(config.rows as usize + 1);
    let mut col_idx: Vec<u32> = Vec::new();
    row_ptr.push(0u32);
    for _ in 0..config.rows {
        let want = config.row_nnz.min(config.cols);
        let mut cols: Vec<u32> = (0..want)
            .map(|_| (rng.uniform() * f64::from(config.cols)) as u32)
            .map(|c| c.min(config.cols - 1))
            .collect();
        cols.sort_unstable();
        cols.dedup();
        col_idx.extend_from_slice(&cols);
        row_ptr.push(col_idx.len() as u32);
    }

    // Strictly positive values keep the relative-error comparison in the
    // verifier's well-conditioned regime.
    let values: Vec<f32> = (0..col_idx.len())
        .map(|_| 0.5 + rng.uniform() as f32)
        .collect();
    let num_nonzeros = col_idx.len() as u32;

    let file = match File::create(&config.output) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Creating {}: {e}", config.output);
            process::exit(1);
        }
    };
    let mut writer = BufWriter::new(file);

    let result = write_u32s(&mut writer, &[config.cols, config.rows, num_nonzeros])
        .and_then(|()| write_u32s(&mut writer, &col_idx))
        .and_then(|()| write_u32s(&mut writer, &row_ptr))
        .and_then(|()| write_f32s(&mut writer, &values))
        .and_then(|()| writer.flush());
    if let Err(e) = result {
        eprintln!("Writing {}: {e}", config.output);
        process::exit(1);
    }

    println!(
        "Wrote {}-by-{} matrix with {} nonzero values (seed {}) to {}",
        config.rows, config.cols, num_nonzeros, config.seed, config.output
    );
}
