//! The task graph and its runner.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::error::{GraphError, RunError};
use crate::task::{Action, Completion, Task, TaskContext};

/// Outcome of a successful [`TaskGraph::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Tasks whose actions ran, in execution order.
    pub executed: Vec<String>,

    /// `Terminal` if a task asked the process to exit, `Done` otherwise.
    pub completion: Completion,
}

/// Named tasks with prerequisite edges.
///
/// Built once at startup and shared behind an `Arc` afterwards; running a
/// task never mutates the graph.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task.
    ///
    /// Prerequisites may name tasks that are registered later; they are
    /// checked when the graph is validated or a run is resolved.
    pub fn register<A>(
        &mut self,
        name: impl Into<String>,
        prerequisites: &[&str],
        action: A,
    ) -> Result<(), GraphError>
    where
        A: Action + 'static,
    {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(GraphError::DuplicateTask(name));
        }

        let mut seen = HashSet::new();
        for prerequisite in prerequisites {
            if !seen.insert(*prerequisite) {
                return Err(GraphError::DuplicatePrerequisite {
                    task: name,
                    prerequisite: prerequisite.to_string(),
                });
            }
        }

        self.index.insert(name.clone(), self.tasks.len());
        self.tasks.push(Task {
            name,
            prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
            action: Arc::new(action),
        });

        Ok(())
    }

    /// Whether a task with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up a task by name.
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Task names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    /// Declared prerequisites of a task, if it exists.
    pub fn prerequisites(&self, name: &str) -> Option<&[String]> {
        self.get(name).map(|t| t.prerequisites.as_slice())
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Check the whole graph: every prerequisite resolves and there are no
    /// cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        for task in &self.tasks {
            for prerequisite in &task.prerequisites {
                if !self.contains(prerequisite) {
                    return Err(GraphError::UnknownPrerequisite {
                        task: task.name.clone(),
                        prerequisite: prerequisite.clone(),
                    });
                }
            }
        }

        // Edge direction: prerequisite -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for task in &self.tasks {
            graph.add_node(task.name.as_str());
        }
        for task in &self.tasks {
            for prerequisite in &task.prerequisites {
                graph.add_edge(prerequisite.as_str(), task.name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            // toposort only names one node of the cycle; walk from it to get
            // the full path.
            Err(cycle) => match self.resolve(cycle.node_id()) {
                Err(err @ GraphError::CyclicDependency(_)) => Err(err),
                _ => Err(GraphError::CyclicDependency(vec![cycle
                    .node_id()
                    .to_string()])),
            },
        }
    }

    /// Execution order for `name`: its transitive prerequisites, each once,
    /// followed by the task itself.
    ///
    /// The traversal is depth-first in declaration order, so the result is
    /// stable for a given graph.
    pub fn resolve(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        let task = self
            .get(name)
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))?;

        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut path = Vec::new();
        self.visit(task, &mut path, &mut done, &mut order)?;

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        task: &'a Task,
        path: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
        order: &mut Vec<&'a str>,
    ) -> Result<(), GraphError> {
        let name = task.name.as_str();
        if done.contains(name) {
            return Ok(());
        }

        if let Some(start) = path.iter().position(|n| *n == name) {
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(GraphError::CyclicDependency(cycle));
        }

        path.push(name);
        for prerequisite in &task.prerequisites {
            let next = self
                .get(prerequisite)
                .ok_or_else(|| GraphError::UnknownPrerequisite {
                    task: name.to_string(),
                    prerequisite: prerequisite.clone(),
                })?;
            self.visit(next, path, done, order)?;
        }
        path.pop();

        done.insert(name);
        order.push(name);

        Ok(())
    }

    /// Run a task after all of its prerequisites.
    ///
    /// Resolution happens up front, so a graph error means no action ran.
    /// The first failing action ends the run; tasks after it never start.
    pub async fn run(self: &Arc<Self>, name: &str) -> Result<RunReport, RunError> {
        let plan: Vec<String> = self
            .resolve(name)?
            .into_iter()
            .map(str::to_owned)
            .collect();

        tracing::debug!("Run plan for '{}': {}", name, plan.join(", "));

        let mut executed = Vec::with_capacity(plan.len());
        for task in &plan {
            let completion = self.execute(task).await?;
            executed.push(task.clone());

            if let Completion::Terminal(code) = completion {
                tracing::debug!("'{}' ended the run with exit code {}", task, code);
                return Ok(RunReport {
                    executed,
                    completion,
                });
            }
        }

        Ok(RunReport {
            executed,
            completion: Completion::Done,
        })
    }

    /// Run a single task's own action, assuming its prerequisites already
    /// ran. Used for watch triggers.
    pub async fn run_only(self: &Arc<Self>, name: &str) -> Result<Completion, RunError> {
        self.execute(name).await
    }

    async fn execute(self: &Arc<Self>, name: &str) -> Result<Completion, RunError> {
        let action = self
            .get(name)
            .map(|task| Arc::clone(&task.action))
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))?;

        tracing::info!("Starting '{}'", name);
        let start = Instant::now();

        match action.call(TaskContext::new(Arc::clone(self), name)).await {
            Ok(completion) => {
                tracing::info!(
                    "Finished '{}' after {}ms",
                    name,
                    start.elapsed().as_millis()
                );
                Ok(completion)
            }
            Err(source) => {
                tracing::error!(
                    "'{}' errored after {}ms: {:#}",
                    name,
                    start.elapsed().as_millis(),
                    source
                );
                Err(RunError::TaskFailed {
                    task: name.to_string(),
                    source,
                })
            }
        }
    }
}
