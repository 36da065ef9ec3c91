//! Conditional stage application.

use std::path::Path;

use crate::build::pipeline::{FileRecord, FileStage, PipelineContext, PipelineError};

/// Applies the inner stage only to records whose path satisfies a predicate.
pub struct When<S> {
    predicate: Box<dyn Fn(&Path) -> bool + Send + Sync>,
    stage: S,
}

impl<S: FileStage> When<S> {
    pub fn new(predicate: impl Fn(&Path) -> bool + Send + Sync + 'static, stage: S) -> Self {
        Self {
            predicate: Box::new(predicate),
            stage,
        }
    }

    /// Apply `stage` to records with the given extension.
    pub fn extension(ext: &'static str, stage: S) -> Self {
        Self::new(
            move |path| path.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext)),
            stage,
        )
    }
}

impl<S: FileStage> FileStage for When<S> {
    fn name(&self) -> &'static str {
        self.stage.name()
    }

    fn transform(&self, file: &mut FileRecord, ctx: &PipelineContext) -> Result<(), PipelineError> {
        if (self.predicate)(&file.path) {
            self.stage.transform(file, ctx)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildMode;

    struct Mark;

    impl FileStage for Mark {
        fn name(&self) -> &'static str {
            "mark"
        }

        fn transform(
            &self,
            file: &mut FileRecord,
            _ctx: &PipelineContext,
        ) -> Result<(), PipelineError> {
            file.contents.extend_from_slice(b"!");
            Ok(())
        }
    }

    #[test]
    fn test_only_matching_extension() {
        let stage = When::extension("scss", Mark);
        let ctx = PipelineContext::new("t", BuildMode::Development);

        let mut scss = FileRecord::new("app.scss", "/app.scss", b"a".to_vec());
        let mut css = FileRecord::new("base.css", "/base.css", b"b".to_vec());
        stage.transform(&mut scss, &ctx).unwrap();
        stage.transform(&mut css, &ctx).unwrap();

        assert_eq!(scss.contents, b"a!");
        assert_eq!(css.contents, b"b");
        assert_eq!(stage.name(), "mark");
    }
}
