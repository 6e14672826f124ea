//! Raw mastering with `xorriso -as mkisofs`.

use std::path::Path;
use std::time::Duration;

use super::ImageBackend;
use crate::config::PipelineConfig;
use crate::process::Cmd;

/// Rock Ridge + Joliet names.
const FS_FLAGS: [&str; 2] = ["-R", "-J"];

#[derive(Debug, Clone)]
pub struct XorrisoBackend {
    program: String,
    volume_label: String,
    /// Boot image path relative to the tree root.
    efi_boot_path: String,
    timeout: Option<Duration>,
}

impl XorrisoBackend {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            program: config.tools.xorriso.clone(),
            volume_label: config.volume_label.clone(),
            efi_boot_path: config.boot.efi_image_path(),
            timeout: config.master_timeout,
        }
    }
}

impl ImageBackend for XorrisoBackend {
    fn name(&self) -> &'static str {
        "xorriso"
    }

    fn command(&self, scratch_root: &Path, output: &Path) -> Cmd {
        Cmd::new(&self.program)
            .args(["-as", "mkisofs"])
            .args(FS_FLAGS)
            .args(["-V", self.volume_label.as_str()])
            .args(["-efi-boot", self.efi_boot_path.as_str(), "-no-emul-boot"])
            .arg("-o")
            .arg_path(output)
            .arg_path(scratch_root)
            .error_msg("xorriso failed to master the image")
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
