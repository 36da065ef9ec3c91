//! Pipeline context for sharing state across stages.

use std::path::{Path, PathBuf};

use tracing::warn;

use super::PipelineError;
use crate::build::BuildMode;

/// A file that was dropped from the pipeline because a stage failed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Shared context for pipeline stages.
///
/// Carries the invocation's build mode and collects the per-file failures
/// that development builds tolerate.
#[derive(Debug)]
pub struct PipelineContext {
    /// Name of the task running the pipeline (used in logs)
    pub task: String,
    /// Build mode, fixed for the whole invocation
    pub mode: BuildMode,
    /// Files dropped because of non-fatal errors
    pub failures: Vec<FileFailure>,
}

impl PipelineContext {
    pub fn new(task: impl Into<String>, mode: BuildMode) -> Self {
        Self {
            task: task.into(),
            mode,
            failures: Vec::new(),
        }
    }

    /// Route a per-file error through the mode's error policy.
    ///
    /// Returns the error back if it must abort the invocation; otherwise logs
    /// it, records the failure and returns `Ok`.
    pub fn report(&mut self, path: &Path, error: PipelineError) -> Result<(), PipelineError> {
        if error.is_fatal(self.mode) {
            return Err(error);
        }
        warn!(task = %self.task, path = %path.display(), "{error}");
        self.failures.push(FileFailure {
            path: path.to_path_buf(),
            message: error.to_string(),
        });
        Ok(())
    }
}
