//! File transform pipeline.
//!
//! A pipeline loads the files selected by a [`SourceSet`], threads them
//! through its stages in declared order, then writes the survivors beneath an
//! output directory:
//! 1. Load (async reads)
//! 2. Stages (compile, annotate, filter, aggregate; synchronous, on the
//!    blocking thread pool)
//! 3. Write (async, only once every stage succeeded)
//! 4. Commit cache entries recorded by the cache filter
//!
//! Custom stages can be inserted before or after any named stage.

mod context;
mod error;
mod record;
mod source;
mod sourcemap;
pub mod stages;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

pub use context::{FileFailure, PipelineContext};
pub use error::PipelineError;
pub use record::{FileRecord, PendingEntry};
pub use source::SourceSet;
pub use sourcemap::SourceMap;

/// A stage in the file transform pipeline.
///
/// Stages receive every record of the invocation and may transform, filter
/// or aggregate them in place before passing them to the next stage.
pub trait Stage: Send + Sync {
    /// Unique name for this stage (used for insertion points and errors).
    fn name(&self) -> &'static str;

    /// Process the records through this stage.
    fn process(
        &self,
        files: &mut Vec<FileRecord>,
        ctx: &mut PipelineContext,
    ) -> Result<(), PipelineError>;
}

/// A stage that transforms one record at a time.
///
/// Errors are routed through the mode's error policy: in development a
/// failing file is dropped and reported, in production the invocation aborts.
pub trait FileStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, file: &mut FileRecord, ctx: &PipelineContext)
    -> Result<(), PipelineError>;
}

/// Adapts a [`FileStage`] to the batch [`Stage`] interface.
pub struct PerFile<S>(pub S);

impl<S: FileStage> Stage for PerFile<S> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn process(
        &self,
        files: &mut Vec<FileRecord>,
        ctx: &mut PipelineContext,
    ) -> Result<(), PipelineError> {
        let mut kept = Vec::with_capacity(files.len());
        for mut file in files.drain(..) {
            match self.0.transform(&mut file, ctx) {
                Ok(()) => kept.push(file),
                Err(e) => ctx.report(&file.origin, e)?,
            }
        }
        *files = kept;
        Ok(())
    }
}

/// Result of one pipeline invocation.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Number of files selected by the source set
    pub matched: usize,
    /// Absolute paths of the files written
    pub written: Vec<PathBuf>,
    /// Files dropped because of non-fatal errors
    pub failures: Vec<FileFailure>,
}

/// The file transform pipeline.
///
/// # Extension Points
///
/// Insert custom stages using `insert_before` or `insert_after`:
///
/// ```ignore
/// pipeline.insert_after("scss", MyCustomStage);
/// ```
#[derive(Default, Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    /// Create an empty pipeline with no stages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stage to the end of the pipeline.
    pub fn add_stage<S: Stage + 'static>(&mut self, stage: S) -> &mut Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Add a per-file stage to the end of the pipeline.
    pub fn add_file_stage<S: FileStage + 'static>(&mut self, stage: S) -> &mut Self {
        self.add_stage(PerFile(stage))
    }

    /// Insert a stage before the named stage.
    ///
    /// # Panics
    ///
    /// Panics if no stage with the given name exists.
    pub fn insert_before<S: Stage + 'static>(&mut self, name: &str, stage: S) -> &mut Self {
        let pos = self.position(name);
        self.stages.insert(pos, Arc::new(stage));
        self
    }

    /// Insert a stage after the named stage.
    ///
    /// # Panics
    ///
    /// Panics if no stage with the given name exists.
    pub fn insert_after<S: Stage + 'static>(&mut self, name: &str, stage: S) -> &mut Self {
        let pos = self.position(name);
        self.stages.insert(pos + 1, Arc::new(stage));
        self
    }

    fn position(&self, name: &str) -> usize {
        self.stages
            .iter()
            .position(|s| s.name() == name)
            .unwrap_or_else(|| panic!("stage '{}' not found in pipeline", name))
    }

    /// Get the names of all stages in order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage over `files`, in order.
    pub fn apply(
        &self,
        files: &mut Vec<FileRecord>,
        ctx: &mut PipelineContext,
    ) -> Result<(), PipelineError> {
        for stage in &self.stages {
            stage.process(files, ctx)?;
            debug!(task = %ctx.task, stage = stage.name(), files = files.len(), "stage done");
        }
        Ok(())
    }

    /// Load `sources`, run the stages and write the results below `output`.
    pub async fn run(
        &self,
        sources: &SourceSet,
        output: &Path,
        ctx: &mut PipelineContext,
    ) -> Result<Outcome, PipelineError> {
        let mut files = sources.load().await?;
        let matched = files.len();

        // Stages compile, compress and spawn external programs
        let stages = self.clone();
        let mut stage_ctx = PipelineContext::new(ctx.task.clone(), ctx.mode);
        let (files, stage_ctx) = tokio::task::spawn_blocking(move || {
            stages
                .apply(&mut files, &mut stage_ctx)
                .map(|()| (files, stage_ctx))
        })
        .await
        .map_err(|e| PipelineError::stage("pipeline", e.to_string()))??;
        ctx.failures.extend(stage_ctx.failures);

        let written = write_all(&files, output).await?;

        for file in &files {
            for entry in &file.pending {
                entry.handle.put(entry.key.clone(), entry.fingerprint);
            }
        }

        Ok(Outcome {
            matched,
            written,
            failures: ctx.failures.clone(),
        })
    }
}

/// Write records beneath `output`, creating parent directories as needed.
pub async fn write_all(files: &[FileRecord], output: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let target = output.join(&file.path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io(parent, e))?;
        }
        tokio::fs::write(&target, &file.contents)
            .await
            .map_err(|e| PipelineError::io(&target, e))?;
        written.push(target);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildMode;

    struct Upper;

    impl FileStage for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn transform(
            &self,
            file: &mut FileRecord,
            _ctx: &PipelineContext,
        ) -> Result<(), PipelineError> {
            if file.text()?.contains("broken") {
                return Err(PipelineError::syntax(&file.origin, "broken input"));
            }
            let upper = file.text()?.to_uppercase();
            file.set_text(upper);
            Ok(())
        }
    }

    struct Nop(&'static str);

    impl Stage for Nop {
        fn name(&self) -> &'static str {
            self.0
        }

        fn process(
            &self,
            _files: &mut Vec<FileRecord>,
            _ctx: &mut PipelineContext,
        ) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    /// Blocks until an async task answers; stalls forever on the runtime thread.
    struct Handshake {
        started: std::sync::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
        answer: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl Stage for Handshake {
        fn name(&self) -> &'static str {
            "handshake"
        }

        fn process(
            &self,
            _files: &mut Vec<FileRecord>,
            _ctx: &mut PipelineContext,
        ) -> Result<(), PipelineError> {
            if let Some(started) = self.started.lock().unwrap().take() {
                let _ = started.send(());
            }
            self.answer
                .lock()
                .unwrap()
                .recv_timeout(std::time::Duration::from_secs(5))
                .map_err(|_| PipelineError::stage("handshake", "runtime thread was blocked"))
        }
    }

    fn source_dir(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            std::fs::write(dir.path().join(name), contents).unwrap();
        }
        dir
    }

    #[test]
    fn test_stage_insertion() {
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(Nop("a")).add_stage(Nop("c"));
        pipeline.insert_after("a", Nop("b"));
        pipeline.insert_before("a", Nop("start"));

        assert_eq!(pipeline.stage_names(), vec!["start", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_run_writes_transformed_files() {
        let src = source_dir(&[("a.txt", "hello"), ("b.txt", "world")]);
        let out = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new();
        pipeline.add_file_stage(Upper);

        let mut ctx = PipelineContext::new("test", BuildMode::Development);
        let outcome = pipeline
            .run(&SourceSet::new(src.path()).pattern("*.txt"), out.path(), &mut ctx)
            .await
            .unwrap();

        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.written.len(), 2);
        assert_eq!(
            std::fs::read_to_string(out.path().join("a.txt")).unwrap(),
            "HELLO"
        );
    }

    #[tokio::test]
    async fn test_stages_leave_runtime_thread_free() {
        let src = source_dir(&[("a.txt", "hello")]);
        let out = tempfile::tempdir().unwrap();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (answer_tx, answer_rx) = std::sync::mpsc::channel();
        tokio::spawn(async move {
            if started_rx.await.is_ok() {
                let _ = answer_tx.send(());
            }
        });

        let mut pipeline = Pipeline::new();
        pipeline.add_stage(Handshake {
            started: std::sync::Mutex::new(Some(started_tx)),
            answer: std::sync::Mutex::new(answer_rx),
        });

        let mut ctx = PipelineContext::new("test", BuildMode::Production);
        let outcome = pipeline
            .run(&SourceSet::new(src.path()).pattern("*.txt"), out.path(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(outcome.written, vec![out.path().join("a.txt")]);
    }

    #[tokio::test]
    async fn test_development_error_drops_only_that_file() {
        let src = source_dir(&[("good.txt", "fine"), ("bad.txt", "broken")]);
        let out = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new();
        pipeline.add_file_stage(Upper);

        let mut ctx = PipelineContext::new("test", BuildMode::Development);
        let outcome = pipeline
            .run(&SourceSet::new(src.path()).pattern("*.txt"), out.path(), &mut ctx)
            .await
            .unwrap();

        assert_eq!(outcome.written, vec![out.path().join("good.txt")]);
        assert_eq!(outcome.failures.len(), 1);
        assert!(!out.path().join("bad.txt").exists());
    }

    #[tokio::test]
    async fn test_production_error_aborts_and_writes_nothing() {
        let src = source_dir(&[("good.txt", "fine"), ("bad.txt", "broken")]);
        let out = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new();
        pipeline.add_file_stage(Upper);

        let mut ctx = PipelineContext::new("test", BuildMode::Production);
        let result = pipeline
            .run(&SourceSet::new(src.path()).pattern("*.txt"), out.path(), &mut ctx)
            .await;

        assert!(matches!(result, Err(PipelineError::Syntax { .. })));
        assert!(!out.path().join("good.txt").exists());
    }
}
