//! File records flowing through the pipeline.

use std::path::{Path, PathBuf};

use super::{PipelineError, SourceMap};
use crate::build::cache::{CacheHandle, Fingerprint};

/// A cache entry to store once the record has been written.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub handle: CacheHandle,
    pub key: PathBuf,
    pub fingerprint: Fingerprint,
}

/// One source file being processed through the pipeline.
///
/// State evolves through the stages:
///
/// 1. Initially: `contents` = bytes read from `origin`, `path` = relative to the
///    source base
/// 2. After compile stages: `contents` = compiled output, `path` relabelled
///    (`app.scss` -> `app.css`)
/// 3. After source-map stages: `source_map` populated, then embedded into
///    `contents`
/// 4. After write: `pending` cache entries are committed
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Output path, relative to the pipeline's output directory
    pub path: PathBuf,

    /// Absolute path of the source file (used for error messages and
    /// resolving imports)
    pub origin: PathBuf,

    /// Current contents
    pub contents: Vec<u8>,

    /// Source map being built for this file, if mapping is enabled
    pub source_map: Option<SourceMap>,

    /// Cache entries to commit after a successful write
    pub pending: Vec<PendingEntry>,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, origin: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            origin: origin.into(),
            contents,
            source_map: None,
            pending: Vec::new(),
        }
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> Result<&str, PipelineError> {
        std::str::from_utf8(&self.contents)
            .map_err(|e| PipelineError::syntax(&self.origin, format!("not valid UTF-8: {e}")))
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.contents = text.into().into_bytes();
    }

    /// Extension of the current output path.
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }

    /// Whether the current output path has the given extension.
    pub fn has_extension(&self, ext: &str) -> bool {
        self.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Change the extension of the output path.
    pub fn set_extension(&mut self, ext: &str) {
        self.path.set_extension(ext);
        if let Some(map) = self.source_map.as_mut() {
            map.file = file_name(&self.path);
        }
    }

    /// Number of lines in the current contents.
    pub fn line_count(&self) -> usize {
        let newlines = self.contents.iter().filter(|b| **b == b'\n').count();
        if self.contents.last().is_some_and(|b| *b != b'\n') {
            newlines + 1
        } else {
            newlines
        }
    }
}

pub(super) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
