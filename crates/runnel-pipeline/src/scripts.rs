//! Script bundling and minification.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::{Parser, ParserReturn};
use oxc_span::SourceType;
use regex::Regex;

use crate::file::FileEntry;
use crate::transform::{Outcome, Transform, TransformError};

/// A syntax problem found while parsing a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Problem {
    pub line: Option<usize>,
    pub message: String,
}

/// Source type for a script path, defaulting to JavaScript.
pub(crate) fn source_type(path: &Path) -> SourceType {
    SourceType::from_path(path).unwrap_or_default()
}

/// Parse `source` and return its syntax errors.
pub(crate) fn check_script(source: &str, source_type: SourceType) -> Vec<Problem> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, source_type).parse();
    problems(source, &parsed)
}

fn problems(source: &str, parsed: &ParserReturn<'_>) -> Vec<Problem> {
    parsed
        .errors
        .iter()
        .map(|error| {
            let line = error
                .labels
                .as_ref()
                .and_then(|labels| labels.first())
                .map(|label| line_of(source, label.offset()));
            Problem {
                line,
                message: error.message.to_string(),
            }
        })
        .collect()
}

/// 1-based line of a byte offset.
fn line_of(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

/// Bundles each entry script with an external bundler (esbuild).
///
/// Entries are bundled into a self-executing script. `defines` become
/// `process.env.*` replacements, so build settings reach client code.
pub struct BundleScripts {
    program: String,
    defines: BTreeMap<String, String>,
    minify: bool,
    source_maps: bool,
}

impl BundleScripts {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            defines: BTreeMap::new(),
            minify: false,
            source_maps: false,
        }
    }

    /// Replace `process.env.<key>` with the string `value`.
    pub fn define(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(key.into(), value.into());
        self
    }

    pub fn minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    /// Embed an inline source map.
    pub fn source_maps(mut self, source_maps: bool) -> Self {
        self.source_maps = source_maps;
        self
    }

    /// Command-line arguments for bundling `entry`.
    pub fn arguments(&self, entry: &Path) -> Vec<String> {
        let mut args = vec![
            entry.display().to_string(),
            "--bundle".to_string(),
            "--format=iife".to_string(),
            "--log-level=error".to_string(),
        ];

        for (key, value) in &self.defines {
            let literal = serde_json::Value::from(value.as_str()).to_string();
            args.push(format!("--define:process.env.{}={}", key, literal));
        }

        if self.minify {
            args.push("--minify".to_string());
        }
        if self.source_maps {
            args.push("--sourcemap=inline".to_string());
        }

        args
    }

    fn bundle(&self, file: &FileEntry) -> Result<Vec<u8>, TransformError> {
        let output = Command::new(&self.program)
            .args(self.arguments(&file.source))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                TransformError::new(
                    self.name(),
                    file,
                    format!("failed to run {}: {}", self.program, e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(bundler_error(self.name(), file, &stderr));
        }

        Ok(output.stdout)
    }
}

impl Transform for BundleScripts {
    fn name(&self) -> &str {
        "bundle"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        Outcome::each(files, |file| {
            let bundled = self.bundle(&file)?;
            let mut file = file.with_extension("js");
            file.contents = bundled;
            Ok(file)
        })
    }
}

/// esbuild reports locations as `path:line:column:` under the message.
fn bundler_error(step: &str, file: &FileEntry, stderr: &str) -> TransformError {
    static LOCATION: OnceLock<Option<Regex>> = OnceLock::new();
    let location = LOCATION.get_or_init(|| Regex::new(r"(?m)^\s+\S+:(\d+):\d+:").ok());

    let line = location
        .as_ref()
        .and_then(|re| re.captures(stderr))
        .and_then(|caps| caps[1].parse().ok());
    let message = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("bundler failed");

    TransformError::new(step, file, message).at_line(line)
}

/// Minifies plain scripts by parsing and re-printing them without
/// whitespace or comments.
///
/// Files parse as classic scripts, not modules, which is what vendored
/// libraries are.
pub struct MinifyScripts;

impl Transform for MinifyScripts {
    fn name(&self) -> &str {
        "minify-js"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        Outcome::each(files, |mut file| {
            let minified = {
                let source = file.text(self.name())?;
                let allocator = Allocator::default();
                let source_type = source_type(&file.source).with_script(true);
                let parsed = Parser::new(&allocator, source, source_type).parse();

                if let Some(problem) = problems(source, &parsed).into_iter().next() {
                    return Err(TransformError::new(self.name(), &file, problem.message)
                        .at_line(problem.line));
                }

                Codegen::new()
                    .with_options(CodegenOptions::minify())
                    .build(&parsed.program)
                    .code
            };

            if let Some(map) = file.source_map.as_mut() {
                map.collapse(&minified);
            }
            file.set_text(minified);
            Ok(file)
        })
    }
}
