//! efiso - UEFI application to bootable ISO.
//!
//! Takes a built `.efi` binary and produces an ISO 9660 image that UEFI
//! firmware (or GRUB, with the rescue backend) boots directly.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use efiso::config::{parse_timeout, Backend, PipelineConfig};
use efiso::error::{EXIT_MISSING_DEPENDENCY, EXIT_OK, EXIT_OTHER};
use efiso::pipeline::human_size;
use efiso::{checksum, preflight, verify, Pipeline};

#[derive(Parser)]
#[command(name = "efiso")]
#[command(about = "Package a UEFI application into a bootable ISO image")]
#[command(
    after_help = "QUICK START:\n  efiso preflight            Check the mastering tools are installed\n  efiso build app.efi        Build app.iso in the current directory\n  efiso verify app.iso --efi app.efi\n\nEXIT CODES:\n  3 missing dependency, 4 missing input, 5 filesystem error,\n  6 image generation failed, 7 mastering timed out"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a bootable ISO from an EFI application
    Build {
        /// Path to the built .efi binary
        efi: PathBuf,

        /// Output ISO path (default: <efi name>.iso in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Mastering backend
        #[arg(short, long, value_enum)]
        backend: Option<Backend>,

        /// Kill the mastering tool after this many seconds (0 = no limit)
        #[arg(long, value_name = "SECS")]
        timeout: Option<String>,

        /// GRUB menu timeout in seconds (default: 5)
        #[arg(long, value_name = "SECS")]
        menu_timeout: Option<u32>,

        /// ISO volume label
        #[arg(long)]
        label: Option<String>,

        /// Directory to create the scratch tree in (default: system temp dir)
        #[arg(long)]
        scratch_dir: Option<PathBuf>,

        /// Write <output>.sha512 after a successful build
        #[arg(long)]
        checksum: bool,

        /// Print a JSON summary on stdout instead of progress output
        #[arg(long)]
        json: bool,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Check that the tools for the selected backend are installed
    Preflight {
        /// Backend to check for (default: from configuration)
        #[arg(short, long, value_enum)]
        backend: Option<Backend>,
    },

    /// Check that an ISO contains EFI/BOOT/BOOTX64.EFI
    Verify {
        /// ISO image to inspect
        iso: PathBuf,

        /// Original .efi to compare against byte for byte
        #[arg(long)]
        efi: Option<PathBuf>,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show the resolved configuration
    Config {
        #[arg(long)]
        json: bool,
    },
    /// Show the generated grub.cfg
    GrubCfg,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            EXIT_OTHER
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn run(cli: Cli) -> Result<i32> {
    let mut config = PipelineConfig::load()?;

    match cli.command {
        Commands::Build {
            efi,
            output,
            backend,
            timeout,
            menu_timeout,
            label,
            scratch_dir,
            checksum,
            json,
            quiet,
        } => {
            if let Some(backend) = backend {
                config.backend = backend;
            }
            if let Some(secs) = timeout {
                config.master_timeout = parse_timeout(&secs)
                    .with_context(|| format!("--timeout: invalid number '{}'", secs))?;
            }
            if let Some(secs) = menu_timeout {
                config.menu_timeout_secs = secs;
            }
            if let Some(label) = label {
                config.volume_label = label;
            }
            if let Some(dir) = scratch_dir {
                config.scratch_parent = Some(dir);
            }

            let efi = absolute(&efi)?;
            let output = match output {
                Some(path) => absolute(&path)?,
                None => absolute(&default_output(&efi))?,
            };
            cmd_build(&config, &efi, &output, checksum, json, quiet || json)
        }

        Commands::Preflight { backend } => {
            if let Some(backend) = backend {
                config.backend = backend;
            }
            let report = preflight::run_preflight(&config);
            report.print();
            Ok(if report.all_passed() {
                EXIT_OK
            } else {
                EXIT_MISSING_DEPENDENCY
            })
        }

        Commands::Verify { iso, efi } => {
            let report = verify::verify_iso(&config, &iso, efi.as_deref())?;
            verify::print_report(&report);
            Ok(if report.is_success() { EXIT_OK } else { EXIT_OTHER })
        }

        Commands::Show { what } => {
            match what {
                ShowTarget::Config { json } => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&config)?);
                    } else {
                        config.print();
                    }
                }
                ShowTarget::GrubCfg => {
                    print!(
                        "{}",
                        efiso::grub::render_grub_cfg(
                            config.menu_timeout_secs,
                            &config.boot.chainload_target()
                        )
                    );
                }
            }
            Ok(EXIT_OK)
        }
    }
}

fn cmd_build(
    config: &PipelineConfig,
    efi: &Path,
    output: &Path,
    with_checksum: bool,
    json: bool,
    quiet: bool,
) -> Result<i32> {
    let outcome = match Pipeline::new(config).quiet(quiet).run(efi, output) {
        Ok(outcome) => outcome,
        Err(failure) => {
            eprintln!(
                "error: {}: {} (stage {})",
                failure.error.category(),
                failure.error,
                failure.stage
            );
            if let Some(diagnostics) = failure.error.diagnostics() {
                eprintln!("\n{}", diagnostics);
            }
            return Ok(failure.exit_code());
        }
    };

    let sha512 = if with_checksum {
        let (path, hash) = checksum::write_checksum(&outcome.iso)?;
        if !quiet {
            println!("  SHA512: {}...{}", &hash[..8], &hash[hash.len() - 8..]);
            println!("  Wrote: {}", path.display());
        }
        Some(hash)
    } else {
        None
    };

    if json {
        let summary = json!({
            "iso": outcome.iso,
            "size": outcome.size,
            "backend": outcome.backend,
            "stages": outcome.stages,
            "sha512": sha512,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if quiet {
        println!("{} ({})", outcome.iso.display(), human_size(outcome.size));
    }

    Ok(EXIT_OK)
}

/// `hello_uefi.efi` -> `./hello_uefi.iso`
fn default_output(efi: &Path) -> PathBuf {
    let stem = efi
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    PathBuf::from(format!("{}.iso", stem))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolving current directory")?;
    Ok(cwd.join(path))
}
