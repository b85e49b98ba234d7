//! Development server with live reload for runnel.
//!
//! Serves the build directory, pushes reload messages to connected browsers
//! whenever a pipeline writes output, and maps file changes to the tasks
//! that rebuild them.

pub mod livereload;
pub mod server;
pub mod watcher;

pub use livereload::{inject_reload_script, ReloadHub, ReloadMessage};
pub use server::{DevServer, DevServerConfig, ServerError};
pub use watcher::{FileWatcher, WatchBinding, WatchSet};
