//! Task graph runner for runnel.
//!
//! Tasks are registered by name with an ordered list of prerequisites and an
//! asynchronous action. Running a task resolves its transitive prerequisites
//! depth-first, executes each of them once, and then executes the task itself.

pub mod error;
pub mod graph;
pub mod task;

pub use error::{GraphError, RunError};
pub use graph::{RunReport, TaskGraph};
pub use task::{done, from_fn, Action, ActionFuture, Completion, FnAction, Task, TaskContext};
