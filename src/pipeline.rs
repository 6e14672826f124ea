//! The build pipeline: EFI binary in, bootable ISO out.
//!
//! Stages run strictly in order against one scratch directory:
//!
//! ```text
//! START -> CHECK_DEPS -> BUILD_LAYOUT -> PLACE_ARTIFACT -> WRITE_CONFIG -> MASTER_IMAGE -> DONE
//!                 \______________\______________\______________\______________\-> FAILED
//! ```
//!
//! CHECK_DEPS checks the tools and the input file before anything is
//! written. The scratch directory is created on entering BUILD_LAYOUT and
//! removed when the run ends, whichever terminal state it reaches. The ISO
//! is mastered to a temporary name beside the output and renamed into place
//! only after it is verified on disk. Output directories a failed run
//! created are removed again.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::grub;
use crate::layout;
use crate::master::{backend_for, ImageBackend};
use crate::preflight;
use crate::timing::Timer;

const SCRATCH_PREFIX: &str = "efiso-";

/// Pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Start,
    CheckDeps,
    BuildLayout,
    PlaceArtifact,
    WriteConfig,
    MasterImage,
    Done,
    Failed,
}

impl Stage {
    /// The five working stages, in execution order.
    pub const WORK: [Stage; 5] = [
        Stage::CheckDeps,
        Stage::BuildLayout,
        Stage::PlaceArtifact,
        Stage::WriteConfig,
        Stage::MasterImage,
    ];

    /// Successor on the success path. Terminal states have none.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Start => Some(Stage::CheckDeps),
            Stage::CheckDeps => Some(Stage::BuildLayout),
            Stage::BuildLayout => Some(Stage::PlaceArtifact),
            Stage::PlaceArtifact => Some(Stage::WriteConfig),
            Stage::WriteConfig => Some(Stage::MasterImage),
            Stage::MasterImage => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    fn description(self) -> &'static str {
        match self {
            Stage::Start => "Starting",
            Stage::CheckDeps => "Checking dependencies",
            Stage::BuildLayout => "Building boot layout",
            Stage::PlaceArtifact => "Placing EFI application",
            Stage::WriteConfig => "Writing GRUB config",
            Stage::MasterImage => "Mastering ISO image",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "START",
            Stage::CheckDeps => "CHECK_DEPS",
            Stage::BuildLayout => "BUILD_LAYOUT",
            Stage::PlaceArtifact => "PLACE_ARTIFACT",
            Stage::WriteConfig => "WRITE_CONFIG",
            Stage::MasterImage => "MASTER_IMAGE",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A stage error together with the stage that raised it.
#[derive(Debug, Error)]
#[error("{stage}: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

impl StageFailure {
    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub iso: PathBuf,
    /// Size of the image as found on disk after the run.
    pub size: u64,
    pub backend: String,
    /// States visited, `START` through `DONE`.
    pub stages: Vec<Stage>,
}

/// The pipeline-owned scratch directory. Removed on drop.
pub struct ScratchRoot {
    dir: TempDir,
}

impl ScratchRoot {
    /// Create a fresh, uniquely named directory under `parent` (or the
    /// system temp dir). Concurrent runs never share one.
    pub fn acquire(parent: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|e| {
                    PipelineError::fs(format!("creating scratch parent {}", parent.display()), e)
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| PipelineError::fs("creating scratch directory", e))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory now, reporting any error instead of swallowing it.
    pub fn release(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

/// Drives one EFI binary through every stage.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    backend: Box<dyn ImageBackend>,
    quiet: bool,
}

impl<'a> Pipeline<'a> {
    /// Pipeline using the backend selected by `config`.
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self::with_backend(config, backend_for(config))
    }

    pub fn with_backend(config: &'a PipelineConfig, backend: Box<dyn ImageBackend>) -> Self {
        Self {
            config,
            backend,
            quiet: false,
        }
    }

    /// Suppress progress output.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Build `output` from the EFI application at `efi`.
    ///
    /// Never retries. On failure nothing is left at `output` and the
    /// scratch directory is gone.
    pub fn run(&self, efi: &Path, output: &Path) -> Result<BuildOutcome, StageFailure> {
        self.log(format!("=== Building EFI ISO ({}) ===\n", self.backend.name()));

        let mut stages = vec![Stage::Start];
        match self.run_stages(efi, output, &mut stages) {
            Ok(size) => {
                stages.push(Stage::Done);
                self.print_summary(output, size);
                Ok(BuildOutcome {
                    iso: output.to_path_buf(),
                    size,
                    backend: self.backend.name().to_string(),
                    stages,
                })
            }
            Err(failure) => {
                self.log(format!("\n  {} at {}", Stage::Failed, failure.stage));
                Err(failure)
            }
        }
    }

    fn run_stages(
        &self,
        efi: &Path,
        output: &Path,
        stages: &mut Vec<Stage>,
    ) -> Result<u64, StageFailure> {
        let config = self.config;

        self.stage(stages, Stage::CheckDeps, || {
            let report = preflight::run_preflight(config);
            for check in &report.checks {
                if let Some(path) = &check.path {
                    self.log(format!("    {} -> {}", check.tool, path.display()));
                }
            }
            report.require_all()?;
            // Checked again when placing; this catches it before any mutation
            if !efi.is_file() {
                return Err(PipelineError::MissingInput(efi.to_path_buf()));
            }
            Ok(())
        })?;

        // Dropping `scratch` removes the tree on every path out of here.
        let (scratch, tree) = self.stage(stages, Stage::BuildLayout, || {
            let scratch = ScratchRoot::acquire(config.scratch_parent.as_deref())?;
            self.log(format!("    scratch: {}", scratch.path().display()));
            let tree = layout::build_layout(scratch.path(), &config.boot)?;
            Ok((scratch, tree))
        })?;

        self.stage(stages, Stage::PlaceArtifact, || {
            let bytes = layout::place_efi_artifact(efi, &tree, &config.boot)?;
            self.log(format!("    {} bytes -> /{}", bytes, config.boot.efi_image_path()));
            Ok(())
        })?;

        self.stage(stages, Stage::WriteConfig, || {
            grub::write_grub_cfg(&tree, config).map(|_| ())
        })?;

        let size = self.stage(stages, Stage::MasterImage, || {
            self.master_image(scratch.path(), output)
        })?;

        if let Err(e) = scratch.release() {
            eprintln!("  [WARN] Could not remove scratch directory: {}", e);
        }
        Ok(size)
    }

    /// Run one stage body, recording the transition and timing it.
    fn stage<T>(
        &self,
        stages: &mut Vec<Stage>,
        stage: Stage,
        body: impl FnOnce() -> Result<T, PipelineError>,
    ) -> Result<T, StageFailure> {
        let n = Stage::WORK.iter().position(|s| *s == stage).map_or(0, |i| i + 1);
        self.log(format!("[{}/{}] {}...", n, Stage::WORK.len(), stage.description()));
        stages.push(stage);

        let timer = Timer::start(stage.to_string());
        let result = body().map_err(|error| StageFailure { stage, error });
        if result.is_ok() {
            self.log(timer.finish());
        }
        result
    }

    /// Master into a temporary file, verify it, then move it into place.
    fn master_image(&self, scratch: &Path, output: &Path) -> Result<u64, PipelineError> {
        let parents = match output.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => CreatedDirs::create(parent)
                .map_err(|e| PipelineError::fs(format!("creating {}", parent.display()), e))?,
            None => CreatedDirs::default(),
        };

        if output.exists() {
            self.log(format!("    replacing existing {}", output.display()));
            fs::remove_file(output)
                .map_err(|e| PipelineError::fs(format!("removing stale {}", output.display()), e))?;
        }

        let staging = staging_path(output);
        let _ = fs::remove_file(&staging);

        let mastered = self
            .backend
            .produce_image(scratch, &staging)
            .and_then(|()| image_size(&staging))
            .and_then(|_| {
                fs::rename(&staging, output).map_err(|e| {
                    PipelineError::fs(format!("moving image to {}", output.display()), e)
                })
            });
        if let Err(e) = mastered {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        // The file on disk is the success signal, not the tool's exit code.
        let size = image_size(output)?;
        parents.keep();
        Ok(size)
    }

    fn print_summary(&self, output: &Path, size: u64) {
        self.log("\n=== EFI ISO Created ===".to_string());
        self.log(format!("  Output: {}", output.display()));
        self.log(format!("  Size: {}", human_size(size)));
        self.log(format!("  Boot path: /{}", self.config.boot.efi_image_path()));
    }

    fn log(&self, line: String) {
        if !self.quiet {
            println!("{}", line);
        }
    }
}

/// Directories created on the way to a path. Removed again on drop, deepest
/// first, unless kept. Only empty directories are ever removed.
#[derive(Default)]
struct CreatedDirs {
    dirs: Vec<PathBuf>,
}

impl CreatedDirs {
    fn create(dir: &Path) -> std::io::Result<Self> {
        let mut missing = Vec::new();
        let mut cur = Some(dir);
        while let Some(d) = cur.filter(|d| !d.as_os_str().is_empty() && !d.exists()) {
            missing.push(d.to_path_buf());
            cur = d.parent();
        }
        // Also undoes a partial create_dir_all
        let created = Self { dirs: missing };
        fs::create_dir_all(dir)?;
        Ok(created)
    }

    fn keep(mut self) {
        self.dirs.clear();
    }
}

impl Drop for CreatedDirs {
    fn drop(&mut self) {
        for dir in &self.dirs {
            let _ = fs::remove_dir(dir);
        }
    }
}

/// `<output>.tmp` in the same directory, so the final rename is atomic.
pub fn staging_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "image.iso".into());
    name.push(".tmp");
    output.with_file_name(name)
}

/// Size of a produced image. Missing or empty counts as a failed build.
fn image_size(path: &Path) -> Result<u64, PipelineError> {
    let meta = fs::metadata(path).map_err(|e| {
        PipelineError::image(format!("image not found at {}", path.display()), e.to_string())
    })?;
    if !meta.is_file() || meta.len() == 0 {
        return Err(PipelineError::image(
            format!("image at {} is empty", path.display()),
            String::new(),
        ));
    }
    Ok(meta.len())
}

pub fn human_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else {
        format!("{} KiB", bytes.div_ceil(1024))
    }
}
