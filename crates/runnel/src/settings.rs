//! Per-invocation settings shared by every task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use runnel_pipeline::{ErrorPolicy, LogNotifier, Notifier, Source};
use runnel_server::ReloadHub;

use crate::config::Config;
use crate::env::Env;

/// Whether output is built for shipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Source maps, readable output, success notifications.
    Development,

    /// Minified output without source maps.
    Production,
}

impl BuildMode {
    /// Production if requested on the command line or by `RUNNEL_MODE` in
    /// the environment.
    pub fn detect(production_flag: bool, env: &Env) -> Self {
        if production_flag || env.get("RUNNEL_MODE") == Some("production") {
            Self::Production
        } else {
            Self::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Whether the process ends when the requested task finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// Build, check or clean, then exit.
    OneShot,

    /// Serve or watch until interrupted.
    LongRunning,
}

impl Invocation {
    pub fn for_task(task: &str) -> Self {
        match task {
            "server" | "watch" | "default" => Self::LongRunning,
            _ => Self::OneShot,
        }
    }
}

/// Everything a task needs to know about the current invocation.
pub struct Settings {
    /// Project root all configured paths are relative to
    pub root: PathBuf,
    pub config: Config,
    pub env: Env,
    pub mode: BuildMode,
    pub invocation: Invocation,
    /// Task requested on the command line
    pub target: String,
    /// Live reload hub; pipelines notify it in long-running invocations
    pub hub: ReloadHub,
}

impl Settings {
    pub fn new(
        root: PathBuf,
        config: Config,
        env: Env,
        mode: BuildMode,
        target: impl Into<String>,
    ) -> Self {
        let target = target.into();
        Self {
            root,
            config,
            env,
            mode,
            invocation: Invocation::for_task(&target),
            target,
            hub: ReloadHub::new(),
        }
    }

    /// Public URL of the site, for views and scripts.
    pub fn url(&self) -> String {
        match self.env.get("url") {
            Some(url) => url.to_string(),
            None => format!("http://localhost:{}", self.config.port),
        }
    }

    /// Whether this is a live (production) build, as exposed to views and
    /// scripts.
    pub fn live(&self) -> bool {
        self.mode.is_production()
    }

    /// What tasks do with files that fail a step.
    pub fn error_policy(&self) -> ErrorPolicy {
        match self.invocation {
            Invocation::OneShot => ErrorPolicy::Abort,
            Invocation::LongRunning => ErrorPolicy::Report,
        }
    }

    /// Who hears about successful pipeline runs. Long-running invocations
    /// reload the browser in either mode; one-shot production builds are
    /// silent.
    pub fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        match (self.invocation, self.mode) {
            (Invocation::LongRunning, _) => Some(Arc::new(self.hub.clone())),
            (Invocation::OneShot, BuildMode::Development) => Some(Arc::new(LogNotifier)),
            (Invocation::OneShot, BuildMode::Production) => None,
        }
    }

    /// Files under the root matching `patterns`.
    pub fn source(&self, patterns: &[String]) -> Source {
        Source::new(&self.root, patterns)
    }

    /// A configured path resolved against the root.
    pub fn path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}
