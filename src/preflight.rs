//! Preflight checks: are the external tools this run needs on the host?
//!
//! Runs before anything touches the filesystem. A missing tool is a fatal
//! precondition failure, never retried.

use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::process;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
}

/// Availability of a single tool.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub tool: String,
    pub status: CheckStatus,
    /// Resolved location when found.
    pub path: Option<PathBuf>,
    pub details: Option<String>,
}

impl CheckResult {
    fn pass(tool: &str, path: PathBuf) -> Self {
        Self {
            tool: tool.to_string(),
            status: CheckStatus::Pass,
            path: Some(path),
            details: None,
        }
    }

    fn fail(tool: &str, details: String) -> Self {
        Self {
            tool: tool.to_string(),
            status: CheckStatus::Fail,
            path: None,
            details: Some(details),
        }
    }
}

/// Results of all preflight checks. Computed once per run, never cached.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// Returns true if every tool was found.
    pub fn all_passed(&self) -> bool {
        !self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    /// Names of the tools that could not be resolved, in check order.
    pub fn missing(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
            .map(|c| c.tool.clone())
            .collect()
    }

    /// `Err(MissingDependency)` if anything is missing.
    pub fn require_all(&self) -> Result<(), PipelineError> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::MissingDependency(missing))
        }
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        println!("=== Preflight Check Results ===\n");

        for check in &self.checks {
            let (icon, status) = match check.status {
                CheckStatus::Pass => ("✓", "PASS"),
                CheckStatus::Fail => ("✗", "FAIL"),
            };
            print!("  {} [{}] {}", icon, status, check.tool);
            match (&check.path, &check.details) {
                (Some(path), _) => println!(": {}", path.display()),
                (None, Some(details)) => println!(": {}", details),
                (None, None) => println!(),
            }
        }

        println!();
        let total = self.checks.len();
        let failed = self.missing().len();
        println!("Summary: {}/{} found", total - failed, total);
        if failed > 0 {
            println!("         {} MISSING - image cannot be built", failed);
        }
    }
}

/// Check each tool in `tools` for resolvability on the search path.
pub fn check_tools<S: AsRef<str>>(tools: &[S]) -> PreflightReport {
    let mut checks = Vec::new();
    for tool in tools {
        let tool = tool.as_ref();
        // the same tool can be named twice by overlapping configs
        if checks.iter().any(|c: &CheckResult| c.tool == tool) {
            continue;
        }
        checks.push(check_tool_exists(tool));
    }
    PreflightReport { checks }
}

/// Check the tools required by the configured backend.
pub fn run_preflight(config: &PipelineConfig) -> PreflightReport {
    check_tools(config.required_tools().as_slice())
}

fn check_tool_exists(tool: &str) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass(tool, path),
        None => CheckResult::fail(
            tool,
            format!("Not found on PATH. Install the '{}' package.", package_hint(tool)),
        ),
    }
}

/// Distribution package that usually ships `tool`.
fn package_hint(tool: &str) -> &str {
    let name = tool.rsplit('/').next().unwrap_or(tool);
    match name {
        "xorriso" => "xorriso",
        "grub-mkrescue" => "grub-common (Debian) / grub2-tools (Fedora)",
        "grub2-mkrescue" => "grub2-tools",
        "mformat" => "mtools",
        other => other,
    }
}
