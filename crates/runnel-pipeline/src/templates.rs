//! HTML views and client-side templates.

use std::path::{Path, PathBuf};

use minijinja::{path_loader, AutoEscape, Environment, Value};
use serde::Serialize;

use crate::file::FileEntry;
use crate::transform::{Outcome, Transform, TransformError};

/// Renders each file as a minijinja template into an `.html` page.
///
/// `extends` and `include` resolve against the views base directory, so
/// layouts and partials live next to the pages that use them.
pub struct RenderViews {
    env: Environment<'static>,
    locals: Value,
}

impl RenderViews {
    /// Renderer loading shared templates from `base`, with `locals`
    /// available to every page.
    pub fn new(base: impl AsRef<Path>, locals: impl Serialize) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(base.as_ref()));
        env.set_auto_escape_callback(|_| AutoEscape::None);

        Self {
            env,
            locals: Value::from_serialize(&locals),
        }
    }
}

impl Transform for RenderViews {
    fn name(&self) -> &str {
        "views"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        Outcome::each(files, |file| {
            let name = file.relative_name();
            let rendered = {
                let source = file.text(self.name())?;
                self.env
                    .render_named_str(&name, source, &self.locals)
                    .map_err(|e| template_error(self.name(), &file, &e))?
            };

            let mut file = file.with_extension("html");
            file.set_text(rendered);
            Ok(file)
        })
    }
}

/// Compiles client-side templates into one script that registers their
/// sources under a global object.
///
/// Every template is parsed first; a template with a syntax error is
/// reported and left out of the bundle.
pub struct PrecompileTemplates {
    out: PathBuf,
    variable: String,
}

impl PrecompileTemplates {
    pub fn new(out: impl Into<PathBuf>, variable: impl Into<String>) -> Self {
        Self {
            out: out.into(),
            variable: variable.into(),
        }
    }
}

impl Transform for PrecompileTemplates {
    fn name(&self) -> &str {
        "templates"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        let mut checked = Outcome::each(files, |file| {
            let source = file.text(self.name())?.to_string();
            Environment::new()
                .add_template_owned(file.relative_name(), source)
                .map_err(|e| template_error(self.name(), &file, &e))?;
            Ok(file)
        });

        if checked.files.is_empty() || !checked.failures.is_empty() {
            checked.files.clear();
            return checked;
        }

        let variable = &self.variable;
        let mut script = format!("var {variable} = {variable} || {{}};\n");
        for file in &checked.files {
            // Text was validated above.
            let source = String::from_utf8_lossy(&file.contents);
            let name = serde_json::Value::from(file.relative_name()).to_string();
            let body = serde_json::Value::from(source.as_ref()).to_string();
            script.push_str(&format!("{variable}[{name}] = {body};\n"));
        }

        checked.files = vec![FileEntry::new(self.out.clone(), self.out.clone(), script)];
        checked
    }

    fn aggregates(&self) -> bool {
        true
    }
}

fn template_error(step: &str, file: &FileEntry, err: &minijinja::Error) -> TransformError {
    let message = match err.detail() {
        Some(detail) => format!("{}: {}", err.kind(), detail),
        None => err.kind().to_string(),
    };
    TransformError::new(step, file, message).at_line(err.line())
}
