//! Concatenation into a single bundle.

use std::path::PathBuf;

use crate::build::pipeline::{FileRecord, PipelineContext, PipelineError, Stage};

/// Joins every record, in order, into one record named `output`.
///
/// Source maps do not survive concatenation.
pub struct Concat {
    output: PathBuf,
}

impl Concat {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

impl Stage for Concat {
    fn name(&self) -> &'static str {
        "concat"
    }

    fn process(
        &self,
        files: &mut Vec<FileRecord>,
        _ctx: &mut PipelineContext,
    ) -> Result<(), PipelineError> {
        if files.is_empty() {
            return Ok(());
        }

        let mut parts = files.drain(..);
        let Some(first) = parts.next() else {
            return Ok(());
        };
        let mut bundle = FileRecord::new(self.output.clone(), first.origin, first.contents);
        bundle.pending = first.pending;

        for mut part in parts {
            if bundle.contents.last().is_some_and(|b| *b != b'\n') {
                bundle.contents.push(b'\n');
            }
            bundle.contents.append(&mut part.contents);
            bundle.pending.append(&mut part.pending);
        }

        files.push(bundle);
        Ok(())
    }
}
