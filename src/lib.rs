//! efiso - package a UEFI application into a bootable ISO 9660 image.
//!
//! The pipeline takes one already-built `.efi` file and produces one ISO:
//!
//! 1. check that the mastering tools are installed ([`preflight`])
//! 2. create `EFI/BOOT` and `boot/grub` in a scratch dir ([`layout`])
//! 3. copy the binary to `EFI/BOOT/BOOTX64.EFI` ([`layout::place_efi_artifact`])
//! 4. write `boot/grub/grub.cfg` ([`grub`])
//! 5. master the image with xorriso or grub-mkrescue ([`master`])
//!
//! [`pipeline::Pipeline`] sequences the stages and owns the scratch dir.

pub mod checksum;
pub mod config;
pub mod error;
pub mod grub;
pub mod layout;
pub mod master;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod timing;
pub mod verify;

pub use config::{Backend, PipelineConfig};
pub use error::{ErrorCategory, PipelineError};
pub use pipeline::{BuildOutcome, Pipeline, Stage, StageFailure};
