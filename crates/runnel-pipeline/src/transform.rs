//! The transform contract and the generic steps.

use std::fmt;
use std::path::PathBuf;

use rayon::prelude::*;

use crate::file::FileEntry;
use crate::sourcemap::SourceMap;

/// One file failing one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    /// Step that failed.
    pub step: String,

    /// File the step failed on.
    pub path: PathBuf,

    /// 1-based line, when the underlying tool reports one.
    pub line: Option<usize>,

    /// What went wrong.
    pub message: String,
}

impl TransformError {
    /// Error for `file` in `step`.
    pub fn new(step: &str, file: &FileEntry, message: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            path: file.source.clone(),
            line: None,
            message: message.into(),
        }
    }

    /// Attach a line number.
    pub fn at_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.path.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for TransformError {}

/// Result of applying a step to a batch.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Files that made it through, in input order.
    pub files: Vec<FileEntry>,

    /// Files that did not.
    pub failures: Vec<TransformError>,
}

impl Outcome {
    /// Every file passed.
    pub fn ok(files: Vec<FileEntry>) -> Self {
        Self {
            files,
            failures: Vec::new(),
        }
    }

    /// Apply `f` to every file independently, in parallel. Output order
    /// matches input order.
    pub fn each<F>(files: Vec<FileEntry>, f: F) -> Self
    where
        F: Fn(FileEntry) -> Result<FileEntry, TransformError> + Send + Sync,
    {
        let results: Vec<_> = files.into_par_iter().map(f).collect();

        let mut outcome = Self::default();
        for result in results {
            match result {
                Ok(file) => outcome.files.push(file),
                Err(err) => outcome.failures.push(err),
            }
        }
        outcome
    }
}

/// A pipeline step: consumes a batch of files and produces a new one.
pub trait Transform: Send + Sync {
    /// Step name for logs and errors.
    fn name(&self) -> &str;

    /// Apply the step.
    fn apply(&self, files: Vec<FileEntry>) -> Outcome;

    /// Whether the step merges the whole batch into one output. Such a step
    /// only runs on a complete batch: once any file has failed, the
    /// pipeline emits nothing and the last good output stays in place.
    fn aggregates(&self) -> bool {
        false
    }
}

/// A step that only runs when a condition held at construction time.
pub struct When {
    enabled: bool,
    step: Box<dyn Transform>,
}

/// Run `step` only if `enabled`; otherwise files pass through unchanged.
pub fn when(enabled: bool, step: impl Transform + 'static) -> When {
    When {
        enabled,
        step: Box::new(step),
    }
}

impl Transform for When {
    fn name(&self) -> &str {
        self.step.name()
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        if self.enabled {
            self.step.apply(files)
        } else {
            Outcome::ok(files)
        }
    }

    fn aggregates(&self) -> bool {
        self.enabled && self.step.aggregates()
    }
}

type Predicate = Box<dyn Fn(&FileEntry) -> bool + Send + Sync>;

/// Keeps the files matching a predicate.
pub struct Filter {
    name: String,
    keep: Predicate,
}

impl Filter {
    /// Filter with a custom predicate.
    pub fn new(
        name: impl Into<String>,
        keep: impl Fn(&FileEntry) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            keep: Box::new(keep),
        }
    }

    /// Drop partials (`_`-prefixed files and directories).
    pub fn skip_partials() -> Self {
        Self::new("skip-partials", |file| !file.is_partial())
    }
}

impl Transform for Filter {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        Outcome::ok(files.into_iter().filter(|f| (self.keep)(f)).collect())
    }
}

/// Drops the directory part of every output path.
pub struct Flatten;

impl Transform for Flatten {
    fn name(&self) -> &str {
        "flatten"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        Outcome::ok(
            files
                .into_iter()
                .map(|mut file| {
                    if let Some(name) = file.relative.file_name() {
                        file.relative = PathBuf::from(name);
                    }
                    file
                })
                .collect(),
        )
    }
}

/// Joins the batch into a single file.
///
/// Source maps of the parts are merged, so a map started before the
/// concatenation still points at the original files. Inline
/// `sourceMappingURL` comments of the parts are dropped when more than one
/// part is joined, since each only describes its own part.
pub struct Concat {
    out: PathBuf,
}

impl Concat {
    /// Concatenate into `out` (relative to the destination).
    pub fn new(out: impl Into<PathBuf>) -> Self {
        Self { out: out.into() }
    }
}

impl Transform for Concat {
    fn name(&self) -> &str {
        "concat"
    }

    fn apply(&self, files: Vec<FileEntry>) -> Outcome {
        if files.is_empty() {
            return Outcome::default();
        }

        let tracks_maps = files.iter().any(|f| f.source_map.is_some());
        let strip = files.len() > 1;
        let mut contents = Vec::new();
        let mut parts = Vec::with_capacity(files.len());

        for file in files {
            if !contents.is_empty() && !contents.ends_with(b"\n") {
                contents.push(b'\n');
            }
            let part = if strip {
                strip_map_comments(file.contents)
            } else {
                file.contents
            };
            let lines = line_count(&part);
            contents.extend_from_slice(&part);
            parts.push((lines, file.source_map));
        }

        let mut joined = FileEntry::new(self.out.clone(), self.out.clone(), contents);
        if tracks_maps {
            joined.source_map = Some(SourceMap::concat(parts));
        }

        Outcome::ok(vec![joined])
    }

    fn aggregates(&self) -> bool {
        true
    }
}

/// Removes `//# sourceMappingURL=` and `/*# sourceMappingURL=` lines.
fn strip_map_comments(contents: Vec<u8>) -> Vec<u8> {
    const MARKERS: [&[u8]; 2] = [b"//# sourceMappingURL=", b"/*# sourceMappingURL="];

    let mut out = Vec::with_capacity(contents.len());
    for line in contents.split_inclusive(|b| *b == b'\n') {
        let start = line
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(line.len());
        if MARKERS.iter().any(|m| line[start..].starts_with(m)) {
            continue;
        }
        out.extend_from_slice(line);
    }
    out
}

/// Number of lines a chunk occupies once a newline separates it from the
/// next one.
pub(crate) fn line_count(contents: &[u8]) -> usize {
    if contents.is_empty() {
        return 0;
    }
    let newlines = contents.iter().filter(|b| **b == b'\n').count();
    if contents.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}
