//! Errors raised while building or running a task graph.

/// Configuration errors in the task graph itself.
///
/// All of these are detected before any action executes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Task '{task}' lists prerequisite '{prerequisite}' more than once")]
    DuplicatePrerequisite { task: String, prerequisite: String },

    #[error("Task '{task}' depends on unknown task '{prerequisite}'")]
    UnknownPrerequisite { task: String, prerequisite: String },

    #[error("Task '{0}' is not registered")]
    UnknownTask(String),

    #[error("Cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
}

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Task '{task}' failed: {source:#}")]
    TaskFailed {
        task: String,
        source: anyhow::Error,
    },
}

impl RunError {
    /// Name of the task whose action failed, if the run got that far.
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            RunError::TaskFailed { task, .. } => Some(task),
            RunError::Graph(_) => None,
        }
    }
}
