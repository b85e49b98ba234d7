//! SVG sprite sheets and their raster fallback.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use regex::Regex;

use crate::file::FileEntry;
use crate::transform::{Outcome, Transform, TransformError};

struct SvgPatterns {
    root: Regex,
    view_box: Regex,
}

fn svg_patterns() -> Option<&'static SvgPatterns> {
    static PATTERNS: OnceLock<Option<SvgPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(SvgPatterns {
                root: Regex::new(r"(?s)<svg\b([^>]*)>(.*)</svg>").ok()?,
                view_box: Regex::new(r#"viewBox\s*=\s*"([^"]*)""#).ok()?,
            })
        })
        .as_ref()
}

/// Merges SVG icons into one sprite sheet of `<symbol>` elements.
///
/// Each icon becomes a symbol whose id is the icon's file stem, so
/// `icons/arrow.svg` is used as `<use href="sprite.svg#arrow"/>`. Two icons
/// with the same stem in different directories are an error.
pub struct SvgSprite {
    out: PathBuf,
}

impl SvgSprite {
    pub fn new(out: impl Into<PathBuf>) -> Self {
        Self { out: out.into() }
    }

    fn symbol(&self, file: &FileEntry) -> Result<String, TransformError> {
        let text = file.text(self.name())?;
        let patterns = svg_patterns()
            .ok_or_else(|| TransformError::new(self.name(), file, "invalid sprite patterns"))?;

        let caps = patterns
            .root
            .captures(text)
            .ok_or_else(|| TransformError::new(self.name(), file, "no <svg> root element"))?;

        let attributes = &caps[1];
        let body = caps[2].trim();
        let view_box = patterns
            .view_box
            .captures(attributes)
            .map(|c| format!(" viewBox=\"{}\"", &c[1]))
            .unwrap_or_default();

        Ok(format!(
            "<symbol id=\"{}\"{}>{}</symbol>",
            escape_attribute(file.stem()),
            view_box,
            body
        ))
    }
}

impl Transform for SvgSprite {
    fn name(&self) -> &str {
        "sprites"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        let mut outcome = Outcome::default();
        let mut symbols = Vec::new();
        let mut ids: HashMap<&str, &FileEntry> = HashMap::new();

        for file in files.iter().filter(|f| f.extension() == Some("svg")) {
            let id = file.stem();
            if let Some(first) = ids.get(id) {
                outcome.failures.push(TransformError::new(
                    self.name(),
                    file,
                    format!("symbol id \"{}\" is already used by {}", id, first.source.display()),
                ));
                continue;
            }
            match self.symbol(file) {
                Ok(symbol) => symbols.push(symbol),
                Err(err) => outcome.failures.push(err),
            }
            ids.insert(id, file);
        }

        if symbols.is_empty() || !outcome.failures.is_empty() {
            return outcome;
        }

        let sprite = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" style=\"display:none\">\n{}\n</svg>\n",
            symbols.join("\n")
        );
        outcome
            .files
            .push(FileEntry::new(self.out.clone(), self.out.clone(), sprite));
        outcome
    }

    fn aggregates(&self) -> bool {
        true
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Renders every `.svg` in the batch to a `.png` next to it with an
/// external rasterizer that reads SVG on stdin and writes PNG to stdout
/// (`rsvg-convert` by default). The SVG files stay in the batch.
pub struct Rasterize {
    program: String,
    args: Vec<String>,
}

impl Rasterize {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn render(&self, svg: &FileEntry) -> Result<FileEntry, TransformError> {
        let fail = |message: String| TransformError::new(self.name(), svg, message);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fail(format!("failed to run {}: {}", self.program, e)))?;

        let input = svg.contents.clone();
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(&input))
        });

        let output = child
            .wait_with_output()
            .map_err(|e| fail(format!("{} did not finish: {}", self.program, e)))?;

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(fail(format!("failed to feed {}: {}", self.program, e))),
                Err(_) => return Err(fail(format!("failed to feed {}", self.program))),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("{} failed: {}", self.program, stderr.trim())));
        }

        let mut png = FileEntry::new(svg.source.clone(), svg.relative.clone(), output.stdout);
        png.relative.set_extension("png");
        Ok(png)
    }
}

impl Default for Rasterize {
    fn default() -> Self {
        Self::new("rsvg-convert", vec!["--format=png".to_string()])
    }
}

impl Transform for Rasterize {
    fn name(&self) -> &str {
        "rasterize"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        let mut outcome = Outcome::default();

        for file in files {
            if file.extension() == Some("svg") {
                match self.render(&file) {
                    Ok(png) => {
                        outcome.files.push(file);
                        outcome.files.push(png);
                    }
                    Err(err) => {
                        outcome.failures.push(err);
                        outcome.files.push(file);
                    }
                }
            } else {
                outcome.files.push(file);
            }
        }

        outcome
    }
}
