pub mod build;
pub mod clean;
pub mod init;
pub mod run;
pub mod tasks;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::build::BuildMode;
use crate::config::LoadedConfig;
use crate::tasks::{Project, TaskContext, TaskRegistry, register_all};

/// A loaded project with every task registered, ready to run in one mode.
pub struct Session {
    pub registry: Arc<TaskRegistry<TaskContext>>,
    pub ctx: TaskContext,
}

impl Session {
    pub async fn open(config_file: &Path, mode: BuildMode) -> Result<Self, anyhow::Error> {
        let loaded = LoadedConfig::load_from_arg(Some(config_file))
            .await
            .with_context(|| format!("failed to load {}", config_file.display()))?;
        info!(config = %loaded.config_path.display(), %mode, "loaded configuration");

        let mut registry = TaskRegistry::new();
        register_all(&mut registry, &loaded.config)?;

        let project = Arc::new(Project::new(loaded));
        Ok(Self {
            registry: Arc::new(registry),
            ctx: TaskContext::new(project, mode),
        })
    }

    pub async fn run(&self, task: &str) -> Result<(), anyhow::Error> {
        if !self.registry.contains(task) {
            anyhow::bail!("unknown task '{task}', run `pipewright tasks` to list them");
        }
        let started = std::time::Instant::now();
        self.registry.run(task, self.ctx.clone()).await?;
        info!(
            task,
            mode = %self.ctx.mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_task_points_to_task_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipewright.yaml");
        std::fs::write(&path, "dev:\n  port: 8123\n").unwrap();

        let session = Session::open(&path, BuildMode::Development).await.unwrap();
        let err = session.run("stylez-app").await.unwrap_err();

        assert!(err.to_string().contains("unknown task 'stylez-app'"), "{err}");
        assert!(err.to_string().contains("pipewright tasks"), "{err}");
    }
}
