//! Pipeline error taxonomy and exit codes.
//!
//! Every stage failure is fatal. Errors are grouped into three categories
//! so calling automation can tell "fix your host" from "fix your input"
//! from "the mastering tool rejected the tree".

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Exit code for a successful run.
pub const EXIT_OK: i32 = 0;
/// Exit code for failures outside the pipeline taxonomy (bad config, verify).
pub const EXIT_OTHER: i32 = 1;
pub const EXIT_MISSING_DEPENDENCY: i32 = 3;
pub const EXIT_MISSING_INPUT: i32 = 4;
pub const EXIT_FILESYSTEM: i32 = 5;
pub const EXIT_IMAGE_GENERATION: i32 = 6;
pub const EXIT_TIMEOUT: i32 = 7;

/// Broad failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Detected before any mutation; nothing to roll back.
    Precondition,
    /// Directory or file creation/copy failed.
    Filesystem,
    /// The mastering process failed, hung, or produced nothing.
    ExternalTool,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precondition => write!(f, "precondition failed"),
            Self::Filesystem => write!(f, "filesystem error"),
            Self::ExternalTool => write!(f, "external tool error"),
        }
    }
}

/// Errors raised by pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing dependency: {}", .0.join(", "))]
    MissingDependency(Vec<String>),

    #[error("missing input artifact: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("image generation failed: {message}")]
    ImageGeneration {
        message: String,
        /// Raw diagnostic output of the mastering tool.
        diagnostics: String,
    },

    #[error("image generation failed: '{tool}' did not finish within {}s", .timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },
}

impl PipelineError {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn fs(context: impl Into<String>, source: io::Error) -> Self {
        Self::Filesystem {
            context: context.into(),
            source,
        }
    }

    pub fn image(message: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::ImageGeneration {
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingDependency(_) | Self::MissingInput(_) => ErrorCategory::Precondition,
            Self::Filesystem { .. } => ErrorCategory::Filesystem,
            Self::ImageGeneration { .. } | Self::Timeout { .. } => ErrorCategory::ExternalTool,
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingDependency(_) => EXIT_MISSING_DEPENDENCY,
            Self::MissingInput(_) => EXIT_MISSING_INPUT,
            Self::Filesystem { .. } => EXIT_FILESYSTEM,
            Self::ImageGeneration { .. } => EXIT_IMAGE_GENERATION,
            Self::Timeout { .. } => EXIT_TIMEOUT,
        }
    }

    /// Captured tool output, if this error carries any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::ImageGeneration { diagnostics, .. } if !diagnostics.trim().is_empty() => {
                Some(diagnostics.trim())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            PipelineError::MissingDependency(vec!["xorriso".into()]),
            PipelineError::MissingInput(PathBuf::from("/nope.efi")),
            PipelineError::fs("creating EFI/BOOT", io::Error::other("disk full")),
            PipelineError::image("xorriso exited with code 5", "bad tree"),
            PipelineError::Timeout {
                tool: "xorriso".into(),
                timeout: Duration::from_secs(3),
            },
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&EXIT_OK));
        assert!(!codes.contains(&EXIT_OTHER));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            PipelineError::MissingInput(PathBuf::from("x")).category(),
            ErrorCategory::Precondition
        );
        assert_eq!(
            PipelineError::fs("copy", io::Error::other("boom")).category(),
            ErrorCategory::Filesystem
        );
        assert_eq!(
            PipelineError::Timeout {
                tool: "grub-mkrescue".into(),
                timeout: Duration::from_secs(1)
            }
            .category(),
            ErrorCategory::ExternalTool
        );
    }

    #[test]
    fn test_missing_dependency_lists_tools() {
        let err = PipelineError::MissingDependency(vec!["xorriso".into(), "mformat".into()]);
        assert_eq!(err.to_string(), "missing dependency: xorriso, mformat");
    }

    #[test]
    fn test_diagnostics_only_when_present() {
        let err = PipelineError::image("failed", "  \n");
        assert!(err.diagnostics().is_none());

        let err = PipelineError::image("failed", "xorriso : FAILURE : bad\n");
        assert_eq!(err.diagnostics(), Some("xorriso : FAILURE : bad"));
    }
}
