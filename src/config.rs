//! Configuration for efiso.
//!
//! Reads configuration from an optional .env file and environment variables.
//! Environment variables take precedence over .env file; CLI flags take
//! precedence over both.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;

/// Default GRUB menu timeout in seconds.
pub const DEFAULT_MENU_TIMEOUT_SECS: u32 = 5;
/// Default ISO volume id.
pub const DEFAULT_VOLUME_LABEL: &str = "EFIBOOT";

/// Which external tool masters the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// `xorriso -as mkisofs` with an explicit `-efi-boot` entry.
    Xorriso,
    /// `grub-mkrescue`, which wraps GRUB and picks up boot/grub/grub.cfg.
    GrubRescue,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "xorriso" | "mkisofs" => Ok(Self::Xorriso),
            "grub-rescue" | "grub" | "grub-mkrescue" => Ok(Self::GrubRescue),
            other => bail!("unknown backend '{}' (expected: xorriso, grub-rescue)", other),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xorriso => write!(f, "xorriso"),
            Self::GrubRescue => write!(f, "grub-rescue"),
        }
    }
}

/// External executables. Bare names are resolved on `PATH`; absolute paths
/// are used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolNames {
    pub xorriso: String,
    pub grub_mkrescue: String,
    /// mtools' `mformat`. Never run by efiso: grub-mkrescue looks it up on
    /// `PATH` to build its EFI FAT image, so it is only checked for.
    pub mformat: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            xorriso: "xorriso".to_string(),
            grub_mkrescue: "grub-mkrescue".to_string(),
            mformat: "mformat".to_string(),
        }
    }
}

/// Fixed on-media paths, relative to the image root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootPaths {
    /// Removable-media boot directory probed by UEFI firmware.
    pub efi_dir: String,
    /// Default boot application name for x86_64 firmware.
    pub efi_file: String,
    pub grub_dir: String,
    pub grub_cfg: String,
}

impl Default for BootPaths {
    fn default() -> Self {
        Self {
            efi_dir: "EFI/BOOT".to_string(),
            efi_file: "BOOTX64.EFI".to_string(),
            grub_dir: "boot/grub".to_string(),
            grub_cfg: "grub.cfg".to_string(),
        }
    }
}

impl BootPaths {
    /// `EFI/BOOT/BOOTX64.EFI`, relative to the image root.
    pub fn efi_image_path(&self) -> String {
        format!("{}/{}", self.efi_dir, self.efi_file)
    }

    /// `boot/grub/grub.cfg`, relative to the image root.
    pub fn grub_cfg_path(&self) -> String {
        format!("{}/{}", self.grub_dir, self.grub_cfg)
    }

    /// Absolute path GRUB chainloads: `/EFI/BOOT/BOOTX64.EFI`.
    pub fn chainload_target(&self) -> String {
        format!("/{}", self.efi_image_path())
    }
}

/// Immutable pipeline configuration, passed by reference into every stage.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub tools: ToolNames,
    pub boot: BootPaths,
    pub backend: Backend,
    pub menu_timeout_secs: u32,
    /// Upper bound on the mastering process. `None` waits indefinitely.
    #[serde(serialize_with = "serialize_secs")]
    pub master_timeout: Option<Duration>,
    pub volume_label: String,
    /// Where the scratch directory is created (default: system temp dir).
    pub scratch_parent: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tools: ToolNames::default(),
            boot: BootPaths::default(),
            backend: Backend::Xorriso,
            menu_timeout_secs: DEFAULT_MENU_TIMEOUT_SECS,
            master_timeout: None,
            volume_label: DEFAULT_VOLUME_LABEL.to_string(),
            scratch_parent: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `.env` (if present) and the environment.
    pub fn load() -> Result<Self> {
        // Load .env if present
        dotenvy::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("EFISO_"))
            .collect();
        Self::from_vars(&vars)
    }

    /// Build a configuration from `EFISO_*` variables, falling back to defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(backend) = non_empty(vars, "EFISO_BACKEND") {
            config.backend = backend.parse().context("EFISO_BACKEND")?;
        }
        if let Some(xorriso) = non_empty(vars, "EFISO_XORRISO") {
            config.tools.xorriso = xorriso.to_string();
        }
        if let Some(mkrescue) = non_empty(vars, "EFISO_GRUB_MKRESCUE") {
            config.tools.grub_mkrescue = mkrescue.to_string();
        }
        if let Some(mformat) = non_empty(vars, "EFISO_MFORMAT") {
            config.tools.mformat = mformat.to_string();
        }
        if let Some(secs) = non_empty(vars, "EFISO_MENU_TIMEOUT") {
            config.menu_timeout_secs = secs
                .parse()
                .with_context(|| format!("EFISO_MENU_TIMEOUT: invalid number '{}'", secs))?;
        }
        if let Some(secs) = non_empty(vars, "EFISO_MASTER_TIMEOUT") {
            config.master_timeout = parse_timeout(secs)
                .with_context(|| format!("EFISO_MASTER_TIMEOUT: invalid number '{}'", secs))?;
        }
        if let Some(label) = non_empty(vars, "EFISO_VOLUME_LABEL") {
            config.volume_label = label.to_string();
        }
        if let Some(dir) = non_empty(vars, "EFISO_SCRATCH_DIR") {
            config.scratch_parent = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Tools the selected backend needs on the host.
    pub fn required_tools(&self) -> Vec<String> {
        match self.backend {
            Backend::Xorriso => vec![self.tools.xorriso.clone()],
            // grub-mkrescue drives xorriso and mformat itself
            Backend::GrubRescue => vec![
                self.tools.grub_mkrescue.clone(),
                self.tools.xorriso.clone(),
                self.tools.mformat.clone(),
            ],
        }
    }

    /// Print configuration for `show config`.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  EFISO_BACKEND:        {}", self.backend);
        println!("  EFISO_XORRISO:        {}", self.tools.xorriso);
        println!("  EFISO_GRUB_MKRESCUE:  {}", self.tools.grub_mkrescue);
        println!("  EFISO_MFORMAT:        {}", self.tools.mformat);
        println!("  EFISO_MENU_TIMEOUT:   {}s", self.menu_timeout_secs);
        match self.master_timeout {
            Some(t) => println!("  EFISO_MASTER_TIMEOUT: {}s", t.as_secs()),
            None => println!("  EFISO_MASTER_TIMEOUT: none"),
        }
        println!("  EFISO_VOLUME_LABEL:   {}", self.volume_label);
        match &self.scratch_parent {
            Some(dir) => println!("  EFISO_SCRATCH_DIR:    {}", dir.display()),
            None => println!("  EFISO_SCRATCH_DIR:    {}", std::env::temp_dir().display()),
        }
        println!("  EFI boot path:        /{}", self.boot.efi_image_path());
        println!("  GRUB config:          /{}", self.boot.grub_cfg_path());
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Parse a timeout in whole seconds. `0` disables the timeout.
pub fn parse_timeout(secs: &str) -> Result<Option<Duration>> {
    let secs: u64 = secs.trim().parse()?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

fn serialize_secs<S: serde::Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => s.serialize_some(&d.as_secs()),
        None => s.serialize_none(),
    }
}
