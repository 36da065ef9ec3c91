//! Source selection: glob patterns relative to a base directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::debug;

use super::{FileRecord, PipelineError};
use crate::util::slash_path;

/// An ordered set of glob patterns resolved against a base directory.
///
/// Output paths keep the structure below `base`.
#[derive(Debug, Clone)]
pub struct SourceSet {
    base: PathBuf,
    patterns: Vec<String>,
}

impl SourceSet {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            patterns: Vec::new(),
        }
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    pub fn patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Resolve the patterns to existing files, in pattern order.
    ///
    /// A path matched by several patterns is only returned once. A literal
    /// pattern (no wildcards) that matches nothing is a missing dependency.
    pub fn resolve(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        let base = Pattern::escape(&slash_path(&self.base));
        let base = base.trim_end_matches('/');

        for pattern in &self.patterns {
            let full = format!("{base}/{pattern}");
            let mut matched = 0;

            for entry in glob::glob(&full)? {
                let path = entry.map_err(|e| {
                    let path = e.path().to_path_buf();
                    PipelineError::io(path, e.into_error())
                })?;
                if !path.is_file() {
                    continue;
                }
                matched += 1;
                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }

            if matched == 0 {
                if is_literal(pattern) {
                    return Err(PipelineError::missing(
                        self.base.join(pattern),
                        "source file does not exist",
                    ));
                }
                debug!(pattern = %full, "pattern matched no files");
            }
        }

        Ok(files)
    }

    /// Resolve the patterns and read every matched file.
    pub async fn load(&self) -> Result<Vec<FileRecord>, PipelineError> {
        let mut records = Vec::new();
        for origin in self.resolve()? {
            let contents = tokio::fs::read(&origin)
                .await
                .map_err(|e| PipelineError::io(&origin, e))?;
            let path = origin
                .strip_prefix(&self.base)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| origin.file_name().map(PathBuf::from).unwrap_or_default());
            records.push(FileRecord::new(path, origin, contents));
        }
        Ok(records)
    }
}

fn is_literal(pattern: &str) -> bool {
    !pattern.contains(['*', '?', '['])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, *file).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_load_keeps_pattern_order_and_dedupes() {
        let dir = tree(&["base/jquery-ui.css", "base/colorbox.css", "app.scss"]);
        let set = SourceSet::new(dir.path())
            .pattern("base/jquery-ui.css")
            .pattern("base/*.css")
            .pattern("app.scss");

        let records = set.load().await.unwrap();
        let paths: Vec<_> = records.iter().map(|r| r.path.clone()).collect();

        assert_eq!(
            paths,
            vec![
                PathBuf::from("base/jquery-ui.css"),
                PathBuf::from("base/colorbox.css"),
                PathBuf::from("app.scss"),
            ]
        );
        assert_eq!(records[2].contents, b"app.scss");
        assert_eq!(records[2].origin, dir.path().join("app.scss"));
    }

    #[tokio::test]
    async fn test_missing_literal_is_missing_dependency() {
        let dir = tree(&["app.scss"]);
        let err = SourceSet::new(dir.path())
            .pattern("embed.scss")
            .load()
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MissingDependency { .. }));
    }

    #[test]
    fn test_empty_wildcard_is_fine() {
        let dir = tree(&[]);
        let files = SourceSet::new(dir.path())
            .pattern("img/**/*")
            .resolve()
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_base_with_glob_metacharacters() {
        let dir = tree(&["[site]/app.js", "[site]/lib/util.js", "s/app.js"]);
        let records = SourceSet::new(dir.path().join("[site]"))
            .pattern("app.js")
            .pattern("lib/*.js")
            .load()
            .await
            .unwrap();

        let paths: Vec<_> = records.iter().map(|r| r.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("app.js"), PathBuf::from("lib/util.js")]);
        assert_eq!(records[0].contents, b"[site]/app.js");
    }

    #[test]
    fn test_invalid_pattern() {
        let dir = tree(&[]);
        let err = SourceSet::new(dir.path()).pattern("a[").resolve().unwrap_err();
        assert!(matches!(err, PipelineError::Pattern(_)));
    }
}
