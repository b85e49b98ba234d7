//! Pipeline driver: read, transform, write, notify.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::source::Source;
use crate::transform::{when, Transform, TransformError};

/// Errors of the pipeline itself, as opposed to a single file failing a step.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid glob pattern {pattern}: {message}")]
    Glob { pattern: String, message: String },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Pipeline worker failed: {0}")]
    Worker(String),

    #[error("{pipeline}: {count} file(s) failed")]
    Failed { pipeline: String, count: usize },
}

/// What a task does with per-file failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Fail the task.
    Abort,

    /// Log and carry on.
    Report,
}

/// Summary of a pipeline run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Files written, as full paths.
    pub written: Vec<PathBuf>,

    /// Files that failed a step and were not written.
    pub failures: Vec<TransformError>,

    /// Wall time in milliseconds.
    pub duration_ms: u64,

    pipeline: String,
}

impl PipelineReport {
    /// Apply an error policy to the collected failures.
    pub fn check(self, policy: ErrorPolicy) -> Result<Self, PipelineError> {
        if policy == ErrorPolicy::Abort && !self.failures.is_empty() {
            return Err(PipelineError::Failed {
                pipeline: self.pipeline,
                count: self.failures.len(),
            });
        }
        Ok(self)
    }
}

/// Receives a message when a pipeline has written output.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        tracing::info!("[{}] {}", title, message);
    }
}

/// A source, a chain of steps and a destination directory.
pub struct Pipeline {
    name: String,
    source: Source,
    steps: Vec<Box<dyn Transform>>,
    dest: PathBuf,
    notify: Option<(Arc<dyn Notifier>, String)>,
}

impl Pipeline {
    /// Start a pipeline reading from `source`. Output goes to the current
    /// directory until [`Pipeline::dest`] is set.
    pub fn new(name: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.into(),
            source,
            steps: Vec::new(),
            dest: PathBuf::from("."),
            notify: None,
        }
    }

    /// Append a step.
    pub fn pipe(mut self, step: impl Transform + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Append a step that only runs if `enabled`.
    pub fn when(self, enabled: bool, step: impl Transform + 'static) -> Self {
        self.pipe(when(enabled, step))
    }

    /// Directory output is written to.
    pub fn dest(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dest = dir.into();
        self
    }

    /// Tell `notifier` after a run that wrote something.
    pub fn notify(mut self, notifier: Arc<dyn Notifier>, message: impl Into<String>) -> Self {
        self.notify = Some((notifier, message.into()));
        self
    }

    /// Run the pipeline.
    ///
    /// Reading and transforming happen on a blocking worker. Files that
    /// failed a step are logged and skipped; whatever they produced before
    /// stays on disk.
    pub async fn run(self) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        let Pipeline {
            name,
            source,
            steps,
            dest,
            notify,
        } = self;

        let (files, failures) = tokio::task::spawn_blocking(move || {
            let mut files = source.read()?;
            let mut failures = Vec::new();
            for step in &steps {
                if step.aggregates() && !failures.is_empty() {
                    tracing::debug!(
                        "{}: skipped after {} failure(s), keeping the previous output",
                        step.name(),
                        failures.len()
                    );
                    files = Vec::new();
                    break;
                }
                let outcome = step.apply(files);
                tracing::debug!(
                    "{}: {} file(s) out, {} failed",
                    step.name(),
                    outcome.files.len(),
                    outcome.failures.len()
                );
                files = outcome.files;
                failures.extend(outcome.failures);
            }
            Ok::<_, PipelineError>((files, failures))
        })
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))??;

        for failure in &failures {
            tracing::error!("{}", failure);
        }

        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let path = dest.join(&file.relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| PipelineError::Write {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            tokio::fs::write(&path, &file.contents)
                .await
                .map_err(|source| PipelineError::Write {
                    path: path.clone(),
                    source,
                })?;
            written.push(path);
        }

        if !written.is_empty() {
            if let Some((notifier, message)) = &notify {
                notifier.notify(&name, message);
            }
        }

        Ok(PipelineReport {
            written,
            failures,
            duration_ms: started.elapsed().as_millis() as u64,
            pipeline: name,
        })
    }
}
