//! State shared by every task invocation.

use std::sync::{Arc, Mutex};

use crate::build::email::Composer;
use crate::build::{BuildMode, CacheStore, LiveReload};
use crate::config::{LoadedConfig, ProjectConfig};

/// Long-lived project state: configuration, caches, the template composer
/// and the live-reload channel.
pub struct Project {
    pub config: ProjectConfig,
    pub caches: CacheStore,
    pub composer: Arc<Mutex<Composer>>,
    pub reload: LiveReload,
}

impl Project {
    pub fn new(loaded: LoadedConfig) -> Self {
        let email = &loaded.config.email;
        let composer = Composer::new(
            email.source.join(&email.layouts),
            email.source.join(&email.partials),
            email.source.join(&email.helpers),
        );
        Self {
            composer: Arc::new(Mutex::new(composer)),
            config: loaded.config,
            caches: CacheStore::new(),
            reload: LiveReload::new(),
        }
    }
}

/// Context handed to every task body.
///
/// The build mode is fixed for the whole invocation.
#[derive(Clone)]
pub struct TaskContext {
    pub project: Arc<Project>,
    pub mode: BuildMode,
}

impl TaskContext {
    pub fn new(project: Arc<Project>, mode: BuildMode) -> Self {
        Self { project, mode }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.project.config
    }
}
