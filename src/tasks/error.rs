//! Task graph errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("unknown task '{0}'")]
    UnknownTask(String),

    #[error("task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("dependency cycle involving task '{0}'")]
    Cycle(String),

    #[error("task '{task}' failed: {message}")]
    Failed { task: String, message: String },
}

impl TaskError {
    /// Name of the task the error is about.
    pub fn task(&self) -> &str {
        match self {
            TaskError::UnknownTask(task)
            | TaskError::DuplicateTask(task)
            | TaskError::Cycle(task)
            | TaskError::UnknownDependency { task, .. }
            | TaskError::Failed { task, .. } => task,
        }
    }
}
