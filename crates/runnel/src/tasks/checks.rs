//! Source checks and cleanup.

use std::sync::Arc;

use anyhow::{bail, Context};
use runnel_graph::{from_fn, Action, Completion};
use runnel_pipeline::{check_stylesheets, lint_scripts, Diagnostic, FileEntry};

use crate::settings::Settings;

type Check = fn(Vec<FileEntry>) -> Vec<Diagnostic>;

/// Syntax errors in project scripts.
pub fn lint(settings: &Arc<Settings>) -> impl Action {
    let settings = Arc::clone(settings);
    from_fn(move |_| {
        let settings = Arc::clone(&settings);
        async move {
            let problems =
                run_check(&settings, &settings.config.lint.src, "lint", lint_scripts).await?;
            finish(problems)
        }
    })
}

/// Stylesheets that fail to compile or parse.
pub fn style(settings: &Arc<Settings>) -> impl Action {
    let settings = Arc::clone(settings);
    from_fn(move |_| {
        let settings = Arc::clone(&settings);
        async move {
            let problems =
                run_check(&settings, &settings.config.style.src, "style", check_stylesheets).await?;
            finish(problems)
        }
    })
}

/// Both checks. The second runs even if the first found problems.
pub fn test(settings: &Arc<Settings>) -> impl Action {
    let settings = Arc::clone(settings);
    from_fn(move |_| {
        let settings = Arc::clone(&settings);
        async move {
            let scripts =
                run_check(&settings, &settings.config.lint.src, "lint", lint_scripts).await?;
            let styles =
                run_check(&settings, &settings.config.style.src, "style", check_stylesheets).await?;
            finish(scripts + styles)
        }
    })
}

/// Remove the build directory.
pub fn clean(settings: &Arc<Settings>) -> impl Action {
    let settings = Arc::clone(settings);
    from_fn(move |_| {
        let build = settings.path(&settings.config.build);
        async move {
            match tokio::fs::remove_dir_all(&build).await {
                Ok(()) => tracing::info!("Removed {}", build.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("Nothing to clean at {}", build.display())
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", build.display()))
                }
            }
            Ok(Completion::Done)
        }
    })
}

/// Read the files `patterns` select and check them on a blocking worker.
/// Every diagnostic is logged; returns how many there were.
async fn run_check(
    settings: &Settings,
    patterns: &[String],
    kind: &str,
    check: Check,
) -> anyhow::Result<usize> {
    let source = settings.source(patterns);
    let diagnostics = tokio::task::spawn_blocking(move || source.read().map(check))
        .await
        .context("Check worker failed")??;

    for diagnostic in &diagnostics {
        tracing::error!("{}", diagnostic);
    }
    tracing::info!("{}: {} problem(s)", kind, diagnostics.len());

    Ok(diagnostics.len())
}

fn finish(problems: usize) -> anyhow::Result<Completion> {
    if problems > 0 {
        bail!("{} problem(s) found", problems);
    }
    Ok(Completion::Done)
}
