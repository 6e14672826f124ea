//! Rescue-image mastering with `grub-mkrescue`.
//!
//! grub-mkrescue builds its own El Torito EFI image containing GRUB, copies
//! the tree in, and lets GRUB find `boot/grub/grub.cfg` at boot. It drives
//! xorriso under the hood. Options it does not know (`-J`) go to
//! `xorriso -as mkisofs`; everything after `--` goes to native xorriso.
//! Rock Ridge is always on.

use std::path::Path;
use std::time::Duration;

use super::ImageBackend;
use crate::config::PipelineConfig;
use crate::process::Cmd;

#[derive(Debug, Clone)]
pub struct GrubRescueBackend {
    program: String,
    xorriso: String,
    volume_label: String,
    timeout: Option<Duration>,
}

impl GrubRescueBackend {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            program: config.tools.grub_mkrescue.clone(),
            xorriso: config.tools.xorriso.clone(),
            volume_label: config.volume_label.clone(),
            timeout: config.master_timeout,
        }
    }
}

impl ImageBackend for GrubRescueBackend {
    fn name(&self) -> &'static str {
        "grub-mkrescue"
    }

    fn command(&self, scratch_root: &Path, output: &Path) -> Cmd {
        Cmd::new(&self.program)
            .arg(format!("--xorriso={}", self.xorriso))
            .arg("-o")
            .arg_path(output)
            .arg("-J")
            .arg_path(scratch_root)
            .args(["--", "-volid", self.volume_label.as_str()])
            .error_msg("grub-mkrescue failed to build the rescue image")
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;

    #[test]
    fn test_argv() {
        let config = PipelineConfig {
            backend: Backend::GrubRescue,
            ..Default::default()
        };
        let backend = GrubRescueBackend::from_config(&config);

        let cmd = backend.command(Path::new("/tmp/scratch"), Path::new("/out/hello.iso"));

        assert_eq!(cmd.program(), "grub-mkrescue");
        assert_eq!(
            cmd.argv(),
            [
                "--xorriso=xorriso", "-o", "/out/hello.iso", "-J", "/tmp/scratch", "--",
                "-volid", "EFIBOOT",
            ]
        );
    }

    #[test]
    fn test_joliet_requested_before_passthrough() {
        let backend = GrubRescueBackend::from_config(&PipelineConfig::default());
        let cmd = backend.command(Path::new("/scratch"), Path::new("/o.iso"));
        let argv = cmd.argv();
        let joliet = argv.iter().position(|a| a == "-J").expect("no -J");
        let sep = argv.iter().position(|a| a == "--").unwrap();
        assert!(joliet < sep);
    }

    #[test]
    fn test_source_tree_precedes_xorriso_passthrough() {
        let backend = GrubRescueBackend::from_config(&PipelineConfig::default());
        let cmd = backend.command(Path::new("/scratch"), Path::new("/o.iso"));
        let argv = cmd.argv();
        let tree = argv.iter().position(|a| a == "/scratch").unwrap();
        let sep = argv.iter().position(|a| a == "--").unwrap();
        assert!(tree < sep);
    }
}
