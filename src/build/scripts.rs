//! Script compilation stages.
//!
//! Module bundling is delegated to an external program (esbuild, webpack, ...)
//! that receives the entry file and prints the bundle on standard output.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::build::pipeline::{FileRecord, FileStage, PipelineContext, PipelineError, Stage};
use crate::config::BundlerConfig;
use crate::util::slash_path;

// =============================================================================
// External bundler
// =============================================================================

/// Replaces each record with the output of the external bundler.
pub struct Bundler {
    program: String,
    args: Vec<String>,
}

impl Bundler {
    /// Build the invocation for the given mode's arguments.
    pub fn new(config: &BundlerConfig, production: bool) -> Self {
        let mut command = config.command.iter();
        let program = command.next().cloned().unwrap_or_default();
        let mut args: Vec<String> = command.cloned().collect();
        if production {
            args.extend(config.production_args.iter().cloned());
        } else {
            args.extend(config.development_args.iter().cloned());
        }
        Self { program, args }
    }
}

impl FileStage for Bundler {
    fn name(&self) -> &'static str {
        "bundle"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        debug!(program = %self.program, path = %file.origin.display(), "bundling");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&file.origin)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PipelineError::missing(
                    &file.origin,
                    format!("bundler '{}' is not installed", self.program),
                ),
                _ => PipelineError::io(&file.origin, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::syntax(&file.origin, stderr.trim()));
        }

        file.contents = output.stdout;
        file.set_extension("js");
        let lines = file.line_count();
        if let Some(map) = file.source_map.as_mut() {
            map.collapse(lines);
        }
        Ok(())
    }
}

// =============================================================================
// Template cache module
// =============================================================================

/// Packs HTML view templates into one script that primes Angular's
/// `$templateCache`.
///
/// Each template is registered under `root` joined with its path relative to
/// the source directory.
pub struct TemplateCache {
    module: String,
    root: String,
    output: PathBuf,
}

impl TemplateCache {
    pub fn new(module: impl Into<String>, root: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            module: module.into(),
            root: root.into(),
            output: output.into(),
        }
    }

    fn key(&self, file: &FileRecord) -> String {
        let root = self.root.trim_end_matches('/');
        format!("{root}/{}", slash_path(&file.path))
    }
}

impl Stage for TemplateCache {
    fn name(&self) -> &'static str {
        "template-cache"
    }

    fn process(
        &self,
        files: &mut Vec<FileRecord>,
        _ctx: &mut PipelineContext,
    ) -> Result<(), PipelineError> {
        let mut puts = Vec::with_capacity(files.len());
        for file in files.iter() {
            let key = serde_json::to_string(&self.key(file))
                .map_err(|e| PipelineError::stage("template-cache", e.to_string()))?;
            let html = serde_json::to_string(file.text()?)
                .map_err(|e| PipelineError::stage("template-cache", e.to_string()))?;
            puts.push(format!("$templateCache.put({key},{html});"));
        }

        let module = serde_json::to_string(&self.module)
            .map_err(|e| PipelineError::stage("template-cache", e.to_string()))?;
        let script = format!(
            "angular.module({module}).run([\"$templateCache\", function($templateCache) {{{}}}]);\n",
            puts.join("\n")
        );

        let origin = files
            .first()
            .map(|f| f.origin.clone())
            .unwrap_or_else(|| self.output.clone());
        files.clear();
        files.push(FileRecord::new(self.output.clone(), origin, script.into_bytes()));
        Ok(())
    }
}
