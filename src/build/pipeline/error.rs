//! Pipeline error types.

use std::path::{Path, PathBuf};

use crate::build::BuildMode;

/// Errors that can occur during pipeline processing.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// A source file could not be parsed or compiled.
    #[error("syntax error in {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    /// Something the task needs (a layout, a partial, a stylesheet, a
    /// literal source file, an external program) does not exist.
    #[error("missing dependency for {path}: {message}")]
    MissingDependency { path: PathBuf, message: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid source pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },
}

impl PipelineError {
    /// Create a stage-specific error.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn syntax(path: impl AsRef<Path>, message: impl ToString) -> Self {
        Self::Syntax {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn missing(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::MissingDependency {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this error aborts the whole invocation in `mode`.
    ///
    /// Missing dependencies and I/O failures always do. Per-file compile
    /// errors only abort production builds; in development the file is
    /// dropped and reported.
    pub fn is_fatal(&self, mode: BuildMode) -> bool {
        match self {
            Self::MissingDependency { .. } | Self::Io { .. } | Self::Pattern(_) => true,
            Self::Syntax { .. } | Self::Stage { .. } => mode.is_production(),
        }
    }
}
