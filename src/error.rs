// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for the SpMV validation pipeline.
//!
//! Replaces `Result<_, String>` in public APIs with a proper enum so callers
//! can pattern-match on failure modes (file open, truncated input, kernel
//! failure, device creation) rather than parsing opaque strings.

use std::fmt;

/// Errors arising from matrix loading, GPU initialization, or kernel dispatch.
#[derive(Debug)]
pub enum RiffleError {
    /// The matrix file could not be opened (path + underlying IO error).
    Io(String),

    /// The matrix file ended early or violated a structural invariant.
    CorruptInput(String),

    /// Opaque failure surfaced by the kernel execution path. A failed batch
    /// leaves rows silently unmodified, so this is unconditionally fatal.
    Kernel(String),

    /// No compatible GPU adapter was found by wgpu.
    NoAdapter,

    /// GPU device creation failed (wraps the underlying wgpu error message).
    DeviceCreation(String),
}

impl fmt::Display for RiffleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::CorruptInput(msg) => write!(f, "Corrupt matrix file: {msg}"),
            Self::Kernel(msg) => write!(f, "Kernel execution failed: {msg}"),
            Self::NoAdapter => write!(f, "No GPU adapter found"),
            Self::DeviceCreation(e) => write!(f, "Failed to create GPU device: {e}"),
        }
    }
}

impl std::error::Error for RiffleError {}
