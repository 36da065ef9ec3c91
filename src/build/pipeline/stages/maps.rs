//! Source-map initialisation and embedding.

use crate::build::pipeline::{FileRecord, FileStage, PipelineContext, PipelineError, SourceMap};
use crate::util::slash_path;

/// Starts an identity source map for every record.
pub struct SourceMapInit;

impl FileStage for SourceMapInit {
    fn name(&self) -> &'static str {
        "sourcemap-init"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        let source = slash_path(&file.path);
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let map = SourceMap::identity(name, source, file.text()?);
        file.source_map = Some(map);
        Ok(())
    }
}

/// Embeds the record's source map as a trailing `data:` URI comment.
pub struct SourceMapWrite;

impl FileStage for SourceMapWrite {
    fn name(&self) -> &'static str {
        "sourcemap-write"
    }

    fn transform(&self, file: &mut FileRecord, _ctx: &PipelineContext) -> Result<(), PipelineError> {
        let Some(map) = file.source_map.take() else {
            return Ok(());
        };
        if file.contents.last().is_some_and(|b| *b != b'\n') {
            file.contents.push(b'\n');
        }
        let comment = map.comment(file.extension());
        file.contents.extend_from_slice(comment.as_bytes());
        file.contents.push(b'\n');
        Ok(())
    }
}
