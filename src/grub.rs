//! GRUB configuration generation.
//!
//! The config is a static template with two inputs: the menu timeout and
//! the chainload target. Output is byte-for-byte deterministic.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::layout::BootLayout;

/// Modules every chainload entry loads, in order. `chain` cannot locate its
/// target on a GPT-partitioned image unless `part_gpt` is loaded first.
pub const CHAINLOAD_MODULES: [&str; 2] = ["part_gpt", "chain"];

pub const ENTRY_BOOT: &str = "Boot EFI application";
pub const ENTRY_SHELL: &str = "UEFI shell (return to firmware)";

/// Render `grub.cfg` text.
pub fn render_grub_cfg(timeout_secs: u32, chainload_target: &str) -> String {
    let insmods: String = CHAINLOAD_MODULES
        .iter()
        .map(|m| format!("    insmod {}\n", m))
        .collect();

    format!(
        r#"set timeout={timeout}
set default=0

menuentry "{boot}" {{
{insmods}    chainloader {target}
}}

menuentry "{shell}" {{
    exit
}}
"#,
        timeout = timeout_secs,
        boot = ENTRY_BOOT,
        insmods = insmods,
        target = chainload_target,
        shell = ENTRY_SHELL,
    )
}

/// Write `boot/grub/grub.cfg` into an existing layout.
pub fn write_grub_cfg(layout: &BootLayout, config: &PipelineConfig) -> Result<PathBuf, PipelineError> {
    let path = layout.grub_cfg(&config.boot);
    let content = render_grub_cfg(config.menu_timeout_secs, &config.boot.chainload_target());
    write_config(&path, &content)?;
    Ok(path)
}

fn write_config(path: &Path, content: &str) -> Result<(), PipelineError> {
    fs::write(path, content).map_err(|e| PipelineError::fs(format!("writing {}", path.display()), e))
}
