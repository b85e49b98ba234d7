//! File transform pipelines for runnel.
//!
//! A pipeline reads the files matched by a [`Source`], passes them through a
//! chain of [`Transform`] steps and writes the survivors to a destination
//! directory. Steps may fail per file; a failed file is reported and left
//! out of the output while the rest of the batch carries on.

pub mod check;
pub mod file;
pub mod pipeline;
pub mod scripts;
pub mod source;
pub mod sourcemap;
pub mod sprites;
pub mod styles;
pub mod templates;
pub mod transform;

pub use check::{check_stylesheets, lint_scripts, Diagnostic};
pub use file::FileEntry;
pub use pipeline::{
    ErrorPolicy, LogNotifier, Notifier, Pipeline, PipelineError, PipelineReport,
};
pub use scripts::{BundleScripts, MinifyScripts};
pub use source::{glob_base, GlobMatcher, Source};
pub use sourcemap::{InitSourceMaps, SourceMap, WriteSourceMaps};
pub use sprites::{Rasterize, SvgSprite};
pub use styles::{Autoprefix, CompileStylesheets, MinifyCss};
pub use templates::{PrecompileTemplates, RenderViews};
pub use transform::{when, Concat, Filter, Flatten, Outcome, Transform, TransformError, When};
