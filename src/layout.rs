//! Scratch tree layout and EFI artifact placement.
//!
//! Builds the directory structure firmware and GRUB expect inside the
//! scratch root:
//!
//! ```text
//! <scratch>/
//! ├── EFI/BOOT/BOOTX64.EFI   (copied from the caller's .efi)
//! └── boot/grub/grub.cfg     (written by crate::grub)
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::config::BootPaths;
use crate::error::PipelineError;

/// The directories created under a scratch root.
#[derive(Debug, Clone)]
pub struct BootLayout {
    pub root: PathBuf,
    pub efi_dir: PathBuf,
    pub grub_dir: PathBuf,
}

impl BootLayout {
    /// Where the EFI application lands inside the tree.
    pub fn efi_target(&self, boot: &BootPaths) -> PathBuf {
        self.efi_dir.join(&boot.efi_file)
    }

    pub fn grub_cfg(&self, boot: &BootPaths) -> PathBuf {
        self.grub_dir.join(&boot.grub_cfg)
    }
}

/// Create `EFI/BOOT` and `boot/grub` under `root`, including parents.
pub fn build_layout(root: &Path, boot: &BootPaths) -> Result<BootLayout, PipelineError> {
    let efi_dir = root.join(&boot.efi_dir);
    let grub_dir = root.join(&boot.grub_dir);

    for dir in [&efi_dir, &grub_dir] {
        fs::create_dir_all(dir)
            .map_err(|e| PipelineError::fs(format!("creating {}", dir.display()), e))?;
    }

    Ok(BootLayout {
        root: root.to_path_buf(),
        efi_dir,
        grub_dir,
    })
}

/// Copy the EFI application to `EFI/BOOT/BOOTX64.EFI`.
///
/// The destination name is fixed by the UEFI removable-media convention.
/// Returns the number of bytes copied.
pub fn place_efi_artifact(
    source: &Path,
    layout: &BootLayout,
    boot: &BootPaths,
) -> Result<u64, PipelineError> {
    if !source.is_file() {
        return Err(PipelineError::MissingInput(source.to_path_buf()));
    }

    let dest = layout.efi_target(boot);
    let bytes = fs::copy(source, &dest).map_err(|e| {
        PipelineError::fs(
            format!("copying {} to {}", source.display(), dest.display()),
            e,
        )
    })?;

    if let Err(e) = preserve_mtime(source, &dest) {
        eprintln!(
            "  [WARN] Could not preserve modification time on {}: {}",
            dest.display(),
            e
        );
    }

    Ok(bytes)
}

/// `fs::copy` carries permissions but not timestamps.
fn preserve_mtime(source: &Path, dest: &Path) -> std::io::Result<()> {
    let modified = fs::metadata(source)?.modified()?;
    File::options().write(true).open(dest)?.set_modified(modified)
}
