//! The project task set.
//!
//! Every task is built from the shared [`Settings`]. Asset tasks construct a
//! fresh pipeline each time they run, so a watch trigger always sees the
//! files as they are now.

mod assets;
mod checks;
mod serve;

use std::sync::Arc;

use anyhow::Context;
use runnel_graph::{from_fn, Action, Completion, GraphError, TaskGraph};
use runnel_pipeline::Pipeline;

use crate::settings::Settings;

/// Asset tasks, in the order `build` runs them.
const ASSETS: [&str; 8] = [
    "images",
    "scripts.vendor",
    "stylesheets.vendor",
    "stylesheets.project",
    "scripts.project",
    "sprites",
    "templates",
    "views",
];

/// Register every project task.
pub fn build_graph(settings: &Arc<Settings>) -> Result<TaskGraph, GraphError> {
    let mut graph = TaskGraph::new();

    graph.register("images", &[], pipeline_task(settings, "Images copied", assets::images))?;
    graph.register(
        "scripts.vendor",
        &[],
        pipeline_task(settings, "Vendor scripts compiled", assets::vendor_scripts),
    )?;
    graph.register(
        "stylesheets.vendor",
        &[],
        pipeline_task(settings, "Vendor stylesheets copied", assets::vendor_stylesheets),
    )?;
    graph.register(
        "stylesheets.project",
        &["stylesheets.vendor"],
        pipeline_task(settings, "Stylesheets compiled", assets::project_stylesheets),
    )?;
    graph.register(
        "scripts.project",
        &[],
        pipeline_task(settings, "Scripts bundled", assets::project_scripts),
    )?;
    graph.register("sprites", &[], pipeline_task(settings, "Sprites built", assets::sprites))?;
    graph.register(
        "templates",
        &[],
        pipeline_task(settings, "Templates compiled", assets::templates),
    )?;
    graph.register("views", &[], pipeline_task(settings, "Views rendered", assets::views))?;

    // `build` ends the process once its prerequisites are done.
    graph.register(
        "build",
        &ASSETS,
        from_fn(|_| async { Ok(Completion::Terminal(0)) }),
    )?;

    graph.register("watch", &[], serve::watch(settings))?;
    graph.register(
        "server",
        &[ASSETS.as_slice(), ["watch"].as_slice()].concat(),
        serve::server(settings),
    )?;
    graph.register("default", &["server"], runnel_graph::done())?;

    graph.register("lint", &[], checks::lint(settings))?;
    graph.register("style", &[], checks::style(settings))?;
    graph.register("test", &[], checks::test(settings))?;
    graph.register("clean", &[], checks::clean(settings))?;

    Ok(graph)
}

/// Action running the pipeline `build` returns.
///
/// Per-file failures go through the invocation's error policy. Successful
/// runs notify whoever the settings name.
fn pipeline_task<F>(settings: &Arc<Settings>, message: &'static str, build: F) -> impl Action
where
    F: Fn(&Settings) -> Pipeline + Send + Sync + 'static,
{
    let settings = Arc::clone(settings);
    from_fn(move |cx| {
        let mut pipeline = build(settings.as_ref());
        if let Some(notifier) = settings.notifier() {
            pipeline = pipeline.notify(notifier, message);
        }
        let policy = settings.error_policy();

        async move {
            let report = pipeline
                .run()
                .await
                .with_context(|| format!("Pipeline '{}' could not run", cx.task()))?
                .check(policy)?;
            tracing::debug!(
                "'{}' wrote {} file(s) in {}ms",
                cx.task(),
                report.written.len(),
                report.duration_ms
            );
            Ok(Completion::Done)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::env::Env;
    use crate::settings::BuildMode;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn settings(root: &Path, target: &str, mode: BuildMode) -> Arc<Settings> {
        Arc::new(Settings::new(
            root.to_path_buf(),
            Config::default(),
            Env::default(),
            mode,
            target,
        ))
    }

    fn graph(settings: &Arc<Settings>) -> Arc<TaskGraph> {
        let graph = build_graph(settings).unwrap();
        graph.validate().unwrap();
        Arc::new(graph)
    }

    #[test]
    fn build_runs_every_asset_task_once() {
        let settings = settings(Path::new("/site"), "build", BuildMode::Development);
        let graph = graph(&settings);

        assert_eq!(
            graph.resolve("build").unwrap(),
            vec![
                "images",
                "scripts.vendor",
                "stylesheets.vendor",
                "stylesheets.project",
                "scripts.project",
                "sprites",
                "templates",
                "views",
                "build",
            ]
        );
    }

    #[test]
    fn default_serves_after_watching() {
        let settings = settings(Path::new("/site"), "default", BuildMode::Development);
        let graph = graph(&settings);

        let order = graph.resolve("default").unwrap();

        assert_eq!(order[order.len() - 3..], ["watch", "server", "default"]);
        assert!(!order.contains(&"build"));
        assert_eq!(graph.prerequisites("stylesheets.project").unwrap(), ["stylesheets.vendor"]);
    }

    #[test]
    fn checks_stand_alone() {
        let settings = settings(Path::new("/site"), "test", BuildMode::Development);
        let graph = graph(&settings);

        for name in ["lint", "style", "test", "clean"] {
            assert_eq!(graph.resolve(name).unwrap(), vec![name]);
        }
    }

    #[tokio::test]
    async fn production_stylesheets_are_minified_without_maps() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("assets/styles")).unwrap();
        fs::create_dir_all(root.join("assets/vendor")).unwrap();
        fs::write(
            root.join("assets/styles/main.scss"),
            "$accent: red;\n\n.button {\n  color: $accent;\n}\n",
        )
        .unwrap();
        fs::write(root.join("assets/styles/_partial.scss"), ".p { margin: 0; }\n").unwrap();
        fs::write(root.join("assets/vendor/reset.css"), "body { margin: 0; }\n").unwrap();

        let settings = settings(root, "stylesheets.project", BuildMode::Production);
        let report = graph(&settings).run("stylesheets.project").await.unwrap();

        assert_eq!(report.executed, vec!["stylesheets.vendor", "stylesheets.project"]);
        let css = fs::read_to_string(root.join("build/css/main.css")).unwrap();
        assert!(css.contains(".button{color:red}"));
        assert!(!css.contains("sourceMappingURL"));
        assert!(!root.join("build/css/_partial.css").exists());
        assert!(root.join("build/css/vendor/reset.css").exists());
    }

    #[tokio::test]
    async fn development_stylesheets_carry_a_source_map() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("assets/styles")).unwrap();
        fs::write(root.join("assets/styles/main.scss"), ".a {\n  color: blue;\n}\n").unwrap();

        let settings = settings(root, "stylesheets.project", BuildMode::Development);
        graph(&settings).run("stylesheets.project").await.unwrap();

        let css = fs::read_to_string(root.join("build/css/main.css")).unwrap();
        assert!(css.contains("sourceMappingURL"));
        assert!(css.contains("color: #00f") || css.contains("color: blue"));
    }

    #[tokio::test]
    async fn one_shot_build_fails_on_a_bad_file() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("assets/styles")).unwrap();
        fs::write(root.join("assets/styles/good.scss"), ".a { color: red; }\n").unwrap();
        fs::write(root.join("assets/styles/bad.scss"), ".a { color: red;\n").unwrap();

        let settings = settings(root, "stylesheets.project", BuildMode::Production);
        let err = graph(&settings).run("stylesheets.project").await.unwrap_err();

        assert_eq!(err.failed_task(), Some("stylesheets.project"));
        assert!(root.join("build/css/good.css").exists());
        assert!(!root.join("build/css/bad.css").exists());
    }

    #[tokio::test]
    async fn long_running_build_reports_and_continues() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("assets/styles")).unwrap();
        fs::write(root.join("assets/styles/bad.scss"), ".a { color: red;\n").unwrap();

        let settings = settings(root, "server", BuildMode::Production);
        let completion = graph(&settings).run_only("stylesheets.project").await.unwrap();

        assert_eq!(completion, Completion::Done);
    }
}
