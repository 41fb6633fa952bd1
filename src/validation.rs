// SPDX-License-Identifier: AGPL-3.0-only

//! Check accumulator for the workload binaries.
//!
//! Every binary follows the same pattern: explicit pass/fail checks against
//! documented tolerances, a machine-readable summary on stdout, and exit
//! code 0 (all checks pass) or 1 (any check fails).

use std::process;

/// A single recorded check.
#[derive(Debug, Clone)]
pub struct Check {
    /// Human-readable label.
    pub label: String,
    /// Whether this check passed.
    pub passed: bool,
    /// Observed value (1.0/0.0 for boolean checks).
    pub observed: f64,
    /// Upper bound the observation was held to (1.0 for boolean checks).
    pub bound: f64,
}

/// Accumulates checks and produces a summary with exit code.
#[derive(Debug, Default)]
#[must_use]
pub struct ValidationHarness {
    /// Name of the workload binary.
    pub name: String,
    /// All checks performed.
    pub checks: Vec<Check>,
}

impl ValidationHarness {
    /// Create a new harness for a named binary.
    #[must_use = "harness must be used to run checks"]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            checks: Vec::new(),
        }
    }

    /// Inclusive upper-bound check: `observed <= bound`.
    ///
    /// An observation exactly at the bound passes, matching the verifier's
    /// tolerance contract.
    pub fn check_upper(&mut self, label: &str, observed: f64, bound: f64) {
        self.checks.push(Check {
            label: label.to_string(),
            passed: observed <= bound,
            observed,
            bound,
        });
    }

    /// Boolean pass/fail check.
    pub fn check_bool(&mut self, label: &str, passed: bool) {
        self.checks.push(Check {
            label: label.to_string(),
            passed,
            observed: f64::from(u8::from(passed)),
            bound: 1.0,
        });
    }

    /// Number of checks that passed.
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Total number of checks.
    #[must_use]
    pub const fn total_count(&self) -> usize {
        self.checks.len()
    }

    /// Whether all checks passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Print summary and exit with the appropriate code.
    ///
    /// Exit 0 if all checks pass, exit 1 if any fails.
    pub fn finish(&self) -> ! {
        print!("{}", self.render_summary());
        if self.all_passed() {
            println!("PASSED");
            process::exit(0);
        } else {
            println!("FAILED");
            process::exit(1);
        }
    }

    fn render_summary(&self) -> String {
        use std::fmt::Write;
        let mut s = String::new();
        let _ = writeln!(s);
        let _ = writeln!(
            s,
            "═══ {}: {}/{} checks passed ═══",
            self.name,
            self.passed_count(),
            self.total_count()
        );
        for check in &self.checks {
            let icon = if check.passed { "✓" } else { "✗" };
            let _ = writeln!(
                s,
                "  {icon} {}: observed={:.6e} (bound {:.2e})",
                check.label, check.observed, check.bound
            );
        }
        if !self.all_passed() {
            let failed: Vec<&str> = self
                .checks
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.label.as_str())
                .collect();
            let _ = writeln!(s, "FAILED CHECKS: {}", failed.join(", "));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_tracks_pass_fail() {
        let mut h = ValidationHarness::new("test");
        h.check_upper("within", 0.5, 1.0);
        h.check_upper("beyond", 2.0, 1.0);
        h.check_bool("ok", true);
        assert_eq!(h.passed_count(), 2);
        assert_eq!(h.total_count(), 3);
        assert!(!h.all_passed());
    }

    #[test]
    fn upper_bound_is_inclusive() {
        let mut h = ValidationHarness::new("test");
        h.check_upper("at_bound", 1.0, 1.0);
        assert!(h.checks[0].passed);
    }

    #[test]
    fn bool_check_false_fails() {
        let mut h = ValidationHarness::new("test");
        h.check_bool("no", false);
        assert!(!h.all_passed());
        assert_eq!(h.passed_count(), 0);
    }

    #[test]
    fn empty_harness_vacuously_passes() {
        let h = ValidationHarness::new("empty");
        assert!(h.all_passed());
        assert_eq!(h.total_count(), 0);
    }

    #[test]
    fn summary_lists_failed_checks() {
        let mut h = ValidationHarness::new("spmv");
        h.check_upper("good", 0.1, 1.0);
        h.check_upper("bad", 5.0, 1.0);
        let s = h.render_summary();
        assert!(s.contains("spmv"));
        assert!(s.contains("1/2"));
        assert!(s.contains("FAILED CHECKS: bad"));
    }

    #[test]
    fn summary_infinite_observation_renders() {
        let mut h = ValidationHarness::new("spmv");
        h.check_upper("diverged", f64::INFINITY, 0.002);
        let s = h.render_summary();
        assert!(s.contains("inf"));
        assert!(!h.all_passed());
    }
}
