//! Source checks for the `lint` and `style` tasks.
//!
//! Checks never stop at the first problem: every file is checked and every
//! problem is returned, so a single run lists everything that needs fixing.

use std::fmt;
use std::path::PathBuf;

use crate::file::FileEntry;
use crate::scripts::{check_script, source_type};
use crate::styles::{CompileStylesheets, MinifyCss};
use crate::transform::{Filter, Transform, TransformError};

/// A problem found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: PathBuf,
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.path.display(), line, self.message),
            None => write!(f, "{}: {}", self.path.display(), self.message),
        }
    }
}

impl From<TransformError> for Diagnostic {
    fn from(err: TransformError) -> Self {
        Self {
            path: err.path,
            line: err.line,
            message: err.message,
        }
    }
}

/// Syntax-check scripts. Sources are parsed as ES modules, the way the
/// bundler reads them.
pub fn lint_scripts(files: Vec<FileEntry>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for file in &files {
        let source = match file.text("lint") {
            Ok(source) => source,
            Err(err) => {
                diagnostics.push(err.into());
                continue;
            }
        };

        for problem in check_script(source, source_type(&file.source).with_module(true)) {
            diagnostics.push(Diagnostic {
                path: file.source.clone(),
                line: problem.line,
                message: problem.message,
            });
        }
    }

    sorted(diagnostics)
}

/// Check that stylesheets compile and the result is valid CSS.
///
/// Partials are only checked through the stylesheets that import them.
pub fn check_stylesheets(files: Vec<FileEntry>) -> Vec<Diagnostic> {
    let entries = Filter::skip_partials().apply(files).files;
    let compiled = CompileStylesheets.apply(entries);
    let parsed = MinifyCss.apply(compiled.files);

    let diagnostics = compiled
        .failures
        .into_iter()
        .chain(parsed.failures)
        .map(Diagnostic::from)
        .collect();

    sorted(diagnostics)
}

fn sorted(mut diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    diagnostics.sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lint_reports_every_file() {
        let files = vec![
            FileEntry::new("src/b.js", "b.js", "let x = ;\n"),
            FileEntry::new("src/ok.js", "ok.js", "export const ok = 1;\n"),
            FileEntry::new("src/a.js", "a.js", "const a = 1;\n\nfunction (\n"),
        ];

        let diagnostics = lint_scripts(files);

        let paths: Vec<_> = diagnostics.iter().map(|d| d.path.clone()).collect();
        assert!(paths.contains(&PathBuf::from("src/a.js")));
        assert!(paths.contains(&PathBuf::from("src/b.js")));
        assert!(!paths.contains(&PathBuf::from("src/ok.js")));
        assert_eq!(diagnostics[0].path, PathBuf::from("src/a.js"));
        assert_eq!(diagnostics[0].line, Some(3));
    }

    #[test]
    fn clean_scripts_have_no_diagnostics() {
        let files = vec![FileEntry::new(
            "src/date.js",
            "date.js",
            "export default function format(d) {\n  return d.toISOString();\n}\n",
        )];

        assert!(lint_scripts(files).is_empty());
    }

    #[test]
    fn style_check_reports_each_broken_sheet() {
        let files = vec![
            FileEntry::new("styles/_mixins.scss", "_mixins.scss", "@mixin x { color: $undefined; }"),
            FileEntry::new("styles/ok.scss", "ok.scss", ".a { .b { color: red; } }\n"),
            FileEntry::new("styles/bad.scss", "bad.scss", ".a {\n  color: $nope;\n}\n"),
            FileEntry::new("styles/plain.css", "plain.css", ".c { color: blue; }\n..d { color: red; }\n"),
        ];

        let diagnostics = check_stylesheets(files);

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].path, PathBuf::from("styles/bad.scss"));
        assert_eq!(diagnostics[0].line, Some(2));
        assert_eq!(diagnostics[1].path, PathBuf::from("styles/plain.css"));
    }

    #[test]
    fn diagnostic_display() {
        let with_line = Diagnostic {
            path: PathBuf::from("a.js"),
            line: Some(4),
            message: "Unexpected token".to_string(),
        };
        let without = Diagnostic {
            line: None,
            ..with_line.clone()
        };

        assert_eq!(with_line.to_string(), "a.js:4: Unexpected token");
        assert_eq!(without.to_string(), "a.js: Unexpected token");
    }
}
