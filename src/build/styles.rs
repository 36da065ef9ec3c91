//! Stylesheet compilation stages.
//!
//! SCSS is compiled with `grass`; vendor prefixing and minification are done
//! by `lightningcss` against a browserslist matrix.

use std::path::PathBuf;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use crate::build::pipeline::{FileRecord, FileStage, PipelineContext, PipelineError};

// =============================================================================
// SCSS
// =============================================================================

/// Compiles SCSS records to CSS and renames them to `.css`.
///
/// Imports are resolved against the file's own directory first, then the
/// configured include paths.
pub struct Scss {
    include_paths: Vec<PathBuf>,
}

impl Scss {
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self { include_paths }
    }
}

impl FileStage for Scss {
    fn name(&self) -> &'static str {
        "scss"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
        if let Some(dir) = file.origin.parent() {
            options = options.load_path(dir);
        }
        for path in &self.include_paths {
            options = options.load_path(path);
        }

        let css = grass::from_string(file.text()?.to_owned(), &options)
            .map_err(|e| PipelineError::syntax(&file.origin, e))?;

        file.set_text(css);
        file.set_extension("css");
        let lines = file.line_count();
        if let Some(map) = file.source_map.as_mut() {
            map.collapse(lines);
        }
        Ok(())
    }
}

// =============================================================================
// lightningcss
// =============================================================================

/// Resolve browserslist queries into lightningcss targets.
pub fn targets_for(queries: &[String]) -> Result<Targets, PipelineError> {
    if queries.is_empty() {
        return Ok(Targets::default());
    }
    let browsers = Browsers::from_browserslist(queries)
        .map_err(|e| PipelineError::stage("prefix", format!("invalid browser query: {e}")))?;
    Ok(browsers.map(Targets::from).unwrap_or_default())
}

/// Run a stylesheet through lightningcss.
pub fn process_css(
    css: &str,
    filename: &str,
    targets: Targets,
    minify: bool,
) -> Result<String, String> {
    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: filename.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| e.to_string())?;

    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| e.to_string())?;

    let result = sheet
        .to_css(PrinterOptions {
            minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| e.to_string())?;

    Ok(result.code)
}

/// Adds vendor prefixes required by the target browsers.
pub struct Prefix {
    targets: Targets,
}

impl Prefix {
    pub fn new(browsers: &[String]) -> Result<Self, PipelineError> {
        Ok(Self {
            targets: targets_for(browsers)?,
        })
    }
}

impl FileStage for Prefix {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        let filename = file.origin.display().to_string();
        let css = process_css(file.text()?, &filename, self.targets, false)
            .map_err(|e| PipelineError::syntax(&file.origin, e))?;
        file.set_text(css);
        Ok(())
    }
}

/// Minifies stylesheets.
pub struct MinifyCss {
    targets: Targets,
}

impl MinifyCss {
    pub fn new(targets: Targets) -> Self {
        Self { targets }
    }
}

impl FileStage for MinifyCss {
    fn name(&self) -> &'static str {
        "minify-css"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        let filename = file.origin.display().to_string();
        let css = process_css(file.text()?, &filename, self.targets, true)
            .map_err(|e| PipelineError::syntax(&file.origin, e))?;
        file.set_text(css);
        Ok(())
    }
}
