//! Task definitions and the action contract.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::graph::TaskGraph;

/// How a task's action finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The work is finished; the run moves on to the next task.
    Done,

    /// The work is finished and the process should exit with this code.
    ///
    /// The runner stops at the task that returned it and hands the signal
    /// back to the caller.
    Terminal(u8),
}

/// Future returned by a task action.
pub type ActionFuture = BoxFuture<'static, anyhow::Result<Completion>>;

/// Context handed to an action when it executes.
#[derive(Clone)]
pub struct TaskContext {
    graph: Arc<TaskGraph>,
    task: String,
}

impl TaskContext {
    pub(crate) fn new(graph: Arc<TaskGraph>, task: &str) -> Self {
        Self {
            graph,
            task: task.to_string(),
        }
    }

    /// Name of the executing task.
    pub fn task(&self) -> &str {
        &self.task
    }

    /// The graph the task belongs to, for actions that trigger other tasks.
    pub fn graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

/// The unit of work of a task.
pub trait Action: Send + Sync {
    /// Start the work. The returned future resolves when it is complete.
    fn call(&self, cx: TaskContext) -> ActionFuture;
}

/// Action built from an async closure. See [`from_fn`].
pub struct FnAction<F>(F);

impl<F, Fut> Action for FnAction<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Completion>> + Send + 'static,
{
    fn call(&self, cx: TaskContext) -> ActionFuture {
        (self.0)(cx).boxed()
    }
}

/// Wrap an async closure as an [`Action`].
pub fn from_fn<F, Fut>(f: F) -> FnAction<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Completion>> + Send + 'static,
{
    FnAction(f)
}

/// Action for tasks that only group prerequisites.
pub fn done() -> impl Action {
    from_fn(|_| async { Ok(Completion::Done) })
}

/// A registered task.
pub struct Task {
    pub(crate) name: String,
    pub(crate) prerequisites: Vec<String>,
    pub(crate) action: Arc<dyn Action>,
}

impl Task {
    /// Task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prerequisites in declaration order.
    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .finish_non_exhaustive()
    }
}
