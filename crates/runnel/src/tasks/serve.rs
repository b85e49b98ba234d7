//! The long-running tasks: rebuild on change, and serve the build.

use std::sync::Arc;
use std::time::Duration;

use runnel_graph::{from_fn, Action, Completion, TaskGraph};
use runnel_server::{DevServer, DevServerConfig, FileWatcher, WatchBinding};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::settings::Settings;

/// Which sources retrigger which asset task.
pub fn watch_bindings(config: &Config) -> Vec<WatchBinding> {
    vec![
        WatchBinding::new(&config.views.src, "views"),
        WatchBinding::new(&config.templates.src, "templates"),
        WatchBinding::new(&config.images.src, "images"),
        WatchBinding::new(&config.sprites.src, "sprites"),
        WatchBinding::new(&config.scripts.project.watch, "scripts.project"),
        WatchBinding::new(&config.scripts.vendor.src, "scripts.vendor"),
        WatchBinding::new(&config.styles.project.watch, "stylesheets.project"),
        WatchBinding::new(&config.styles.vendor.src, "stylesheets.vendor"),
    ]
}

/// Rerun asset tasks when their sources change.
///
/// Invoked directly, the task watches until Ctrl-C. As a prerequisite of
/// the server it starts watching in the background and completes at once,
/// so the server can start.
pub fn watch(settings: &Arc<Settings>) -> impl Action {
    let settings = Arc::clone(settings);
    from_fn(move |cx| {
        let settings = Arc::clone(&settings);
        async move {
            let (watcher, batches) = FileWatcher::new(
                &settings.root,
                &watch_bindings(&settings.config),
                &[settings.config.build.clone()],
                Duration::from_millis(settings.config.debounce_ms),
            )?;
            let graph = Arc::clone(cx.graph());

            if settings.target == cx.task() {
                tracing::info!("Watching for changes, press Ctrl-C to stop");
                tokio::select! {
                    _ = rebuild(graph, watcher, batches) => {}
                    _ = tokio::signal::ctrl_c() => tracing::info!("Stopped watching"),
                }
            } else {
                tokio::spawn(rebuild(graph, watcher, batches));
            }

            Ok(Completion::Done)
        }
    })
}

/// Run each batch of triggered tasks, one after another. A failing task is
/// already logged by the graph and does not stop watching.
async fn rebuild(
    graph: Arc<TaskGraph>,
    _watcher: FileWatcher,
    mut batches: mpsc::Receiver<Vec<String>>,
) {
    while let Some(tasks) = batches.recv().await {
        tracing::debug!("Changes trigger {}", tasks.join(", "));
        for task in tasks {
            let _ = graph.run_only(&task).await;
        }
    }
}

/// Serve the build directory with live reload until Ctrl-C.
pub fn server(settings: &Arc<Settings>) -> impl Action {
    let settings = Arc::clone(settings);
    from_fn(move |_| {
        let config = DevServerConfig {
            root: settings.path(&settings.config.build),
            fallback: settings.config.fallback.clone(),
            host: settings.config.host.clone(),
            port: settings.config.port,
            open: settings.config.open,
            livereload: true,
        };
        let server = DevServer::new(config, settings.hub.clone());

        async move {
            server.start().await?;
            Ok(Completion::Done)
        }
    })
}
