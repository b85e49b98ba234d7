//! Stylesheet compilation, prefixing and minification.

use std::fmt;
use std::sync::OnceLock;

use lightningcss::error::Error as CssError;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::Regex;

use crate::file::FileEntry;
use crate::transform::{Outcome, Transform, TransformError};

/// Compiles `.scss` and `.sass` files to CSS. Plain `.css` passes through.
///
/// Imports resolve relative to the directory of the file being compiled.
pub struct CompileStylesheets;

impl Transform for CompileStylesheets {
    fn name(&self) -> &str {
        "stylesheets"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        Outcome::each(files, |file| {
            let syntax = match file.extension() {
                Some("scss") => grass::InputSyntax::Scss,
                Some("sass") => grass::InputSyntax::Sass,
                _ => return Ok(file),
            };

            let mut options = grass::Options::default().input_syntax(syntax);
            if let Some(dir) = file.source.parent() {
                options = options.load_path(dir);
            }

            let css = grass::from_string(file.text(self.name())?.to_string(), &options)
                .map_err(|e| sass_error(self.name(), &file, &e.to_string()))?;

            let mut file = file.with_extension("css");
            rewrite(&mut file, css);
            Ok(file)
        })
    }
}

/// Adds the vendor prefixes the configured browsers need.
pub struct Autoprefix {
    targets: Targets,
}

impl Autoprefix {
    /// Prefix for a browserslist query such as `["> 1%", "last 2 versions"]`.
    ///
    /// An invalid query is reported and falls back to no targets.
    pub fn new(browsers: &[String]) -> Self {
        let browsers = match Browsers::from_browserslist(browsers) {
            Ok(browsers) => browsers,
            Err(e) => {
                tracing::warn!("Ignoring browser list {:?}: {}", browsers, e);
                None
            }
        };

        Self {
            targets: Targets {
                browsers,
                ..Targets::default()
            },
        }
    }
}

impl Transform for Autoprefix {
    fn name(&self) -> &str {
        "autoprefixer"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        Outcome::each(files, |mut file| {
            let css = process_css(self.name(), &file, self.targets, false)?;
            rewrite(&mut file, css);
            Ok(file)
        })
    }
}

/// Minifies CSS.
pub struct MinifyCss;

impl Transform for MinifyCss {
    fn name(&self) -> &str {
        "minify-css"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        Outcome::each(files, |mut file| {
            let css = process_css(self.name(), &file, Targets::default(), true)?;
            rewrite(&mut file, css);
            Ok(file)
        })
    }
}

/// Parse, optimize for `targets` and print.
fn process_css(
    step: &str,
    file: &FileEntry,
    targets: Targets,
    minify: bool,
) -> Result<String, TransformError> {
    let source = file.text(step)?;
    let filename = file.source.display().to_string();

    let mut stylesheet = StyleSheet::parse(
        source,
        ParserOptions {
            filename,
            ..ParserOptions::default()
        },
    )
    .map_err(|e| css_error(step, file, e))?;

    stylesheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| css_error(step, file, e))?;

    let printed = stylesheet
        .to_css(PrinterOptions {
            minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| css_error(step, file, e))?;

    Ok(printed.code)
}

/// Replace a stylesheet's text, keeping any source map pointed at the
/// original file.
fn rewrite(file: &mut FileEntry, css: String) {
    if let Some(map) = file.source_map.as_mut() {
        map.collapse(&css);
    }
    file.set_text(css);
}

fn css_error<T: fmt::Display>(step: &str, file: &FileEntry, err: CssError<T>) -> TransformError {
    let line = err.loc.as_ref().map(|loc| loc.line as usize + 1);
    TransformError::new(step, file, err.kind.to_string()).at_line(line)
}

/// Sass errors carry their position only in the rendered text, which ends
/// with the location of the failing span (`./stdin:2:10`).
fn sass_error(step: &str, file: &FileEntry, rendered: &str) -> TransformError {
    static LOCATION: OnceLock<Option<Regex>> = OnceLock::new();
    let location = LOCATION.get_or_init(|| Regex::new(r"(?m):(\d+):\d+\s*$").ok());

    let line = location
        .as_ref()
        .and_then(|re| re.captures_iter(rendered).last())
        .and_then(|caps| caps[1].parse().ok());
    let message = rendered
        .lines()
        .next()
        .unwrap_or(rendered)
        .trim_start_matches("Error: ");

    TransformError::new(step, file, message).at_line(line)
}
