//! Post-build verification: does the image really carry the EFI binary?
//!
//! Extracts `EFI/BOOT/BOOTX64.EFI` with xorriso's osirrox mode and, given
//! the original input, compares the two byte for byte.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::config::PipelineConfig;
use crate::process::{Cmd, ProcessError};

/// What was found inside the image.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub iso: PathBuf,
    /// Path inside the image that was extracted.
    pub entry: String,
    pub size: u64,
    /// `Some(true)` if compared and identical, `None` if not compared.
    pub matches_input: Option<bool>,
}

impl VerifyReport {
    pub fn is_success(&self) -> bool {
        self.matches_input != Some(false)
    }
}

/// Pull a single file out of an ISO into `dest`.
pub fn extract_entry(xorriso: &str, iso: &Path, entry: &str, dest: &Path) -> Result<()> {
    let source = format!("/{}", entry.trim_start_matches('/'));
    let result = Cmd::new(xorriso)
        .args(["-osirrox", "on", "-indev"])
        .arg_path(iso)
        .args(["-extract", source.as_str()])
        .arg_path(dest)
        .error_msg(format!("xorriso could not extract {}", source))
        .run();

    match result {
        Ok(_) => {}
        Err(ProcessError::Failed { prefix, result, .. }) => {
            bail!("{}:\n{}", prefix, result.diagnostics())
        }
        Err(e) => return Err(e.into()),
    }

    if !dest.is_file() {
        bail!("{} not found in {}", source, iso.display());
    }
    Ok(())
}

/// Verify `iso` contains the EFI boot file, optionally matching `efi`.
pub fn verify_iso(config: &PipelineConfig, iso: &Path, efi: Option<&Path>) -> Result<VerifyReport> {
    if !iso.is_file() {
        bail!("image not found: {}", iso.display());
    }

    let entry = config.boot.efi_image_path();
    let work = tempfile::Builder::new()
        .prefix("efiso-verify-")
        .tempdir()
        .context("creating verification directory")?;
    let extracted = work.path().join(&config.boot.efi_file);

    extract_entry(&config.tools.xorriso, iso, &entry, &extracted)?;

    let size = fs::metadata(&extracted)?.len();
    let matches_input = match efi {
        Some(efi) => {
            let expected = fs::read(efi).with_context(|| format!("reading {}", efi.display()))?;
            let actual = fs::read(&extracted)?;
            Some(expected == actual)
        }
        None => None,
    };

    Ok(VerifyReport {
        iso: iso.to_path_buf(),
        entry,
        size,
        matches_input,
    })
}

/// Print a verification report.
pub fn print_report(report: &VerifyReport) {
    println!("Verifying {}...", report.iso.display());
    println!("  /{}: {} bytes", report.entry, report.size);
    match report.matches_input {
        Some(true) => println!("  Matches input: OK"),
        Some(false) => println!("  Matches input: MISMATCH"),
        None => println!("  Matches input: not checked (pass --efi to compare)"),
    }
}
