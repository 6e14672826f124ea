//! Image mastering backends.
//!
//! Two interchangeable ways to turn a scratch tree into a bootable ISO:
//!
//! - [`XorrisoBackend`] - `xorriso -as mkisofs` with an explicit El Torito
//!   `-efi-boot` entry pointing at `EFI/BOOT/BOOTX64.EFI`.
//! - [`GrubRescueBackend`] - `grub-mkrescue`, which bundles GRUB and boots
//!   through the generated `boot/grub/grub.cfg`.
//!
//! Both emit Rock Ridge and Joliet names. Mastering is never retried: a
//! failure means the tree or the tool is wrong, and rerunning changes nothing.

mod grub_rescue;
mod xorriso;

pub use grub_rescue::GrubRescueBackend;
pub use xorriso::XorrisoBackend;

use std::path::Path;
use std::time::Duration;

use crate::config::{Backend, PipelineConfig};
use crate::error::PipelineError;
use crate::process::{Cmd, ProcessError};

/// Something that can master a scratch tree into an ISO image.
pub trait ImageBackend {
    /// Short name for progress output.
    fn name(&self) -> &'static str;

    /// The full invocation for this tree and output path.
    fn command(&self, scratch_root: &Path, output: &Path) -> Cmd;

    /// Optional deadline for the mastering process.
    fn timeout(&self) -> Option<Duration>;

    /// Run the tool and confirm it produced `output`.
    fn produce_image(&self, scratch_root: &Path, output: &Path) -> Result<(), PipelineError> {
        let cmd = self.command(scratch_root, output).timeout(self.timeout());
        let result = cmd.run().map_err(tool_error)?;

        if !output.is_file() {
            return Err(PipelineError::image(
                format!(
                    "{} exited successfully but {} was not created",
                    self.name(),
                    output.display()
                ),
                result.diagnostics(),
            ));
        }
        Ok(())
    }
}

/// Select the backend named by the configuration.
pub fn backend_for(config: &PipelineConfig) -> Box<dyn ImageBackend> {
    match config.backend {
        Backend::Xorriso => Box::new(XorrisoBackend::from_config(config)),
        Backend::GrubRescue => Box::new(GrubRescueBackend::from_config(config)),
    }
}

fn tool_error(err: ProcessError) -> PipelineError {
    match err {
        ProcessError::Spawn { program, source } => {
            PipelineError::image(format!("could not start '{}'", program), source.to_string())
        }
        ProcessError::Failed {
            prefix,
            code,
            result,
        } => PipelineError::image(format!("{} (exit code {})", prefix, code), result.diagnostics()),
        ProcessError::TimedOut { program, timeout } => PipelineError::Timeout {
            tool: program,
            timeout,
        },
    }
}
