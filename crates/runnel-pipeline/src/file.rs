//! File entries flowing through a pipeline.

use std::path::{Path, PathBuf};

use crate::sourcemap::SourceMap;
use crate::transform::TransformError;

/// A file in flight between pipeline steps.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Where the file was read from. Used for diagnostics and for resolving
    /// imports relative to the original location.
    pub source: PathBuf,

    /// Output path relative to the destination directory.
    pub relative: PathBuf,

    /// Current contents.
    pub contents: Vec<u8>,

    /// Source map, once a step has started tracking one.
    pub source_map: Option<SourceMap>,
}

impl FileEntry {
    /// Create an entry without a source map.
    pub fn new(
        source: impl Into<PathBuf>,
        relative: impl Into<PathBuf>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            source: source.into(),
            relative: relative.into(),
            contents: contents.into(),
            source_map: None,
        }
    }

    /// Contents as UTF-8 text, failing the given step otherwise.
    pub fn text(&self, step: &str) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.contents)
            .map_err(|e| TransformError::new(step, self, format!("not valid UTF-8: {}", e)))
    }

    /// Replace the contents with text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.contents = text.into().into_bytes();
    }

    /// Extension of the output path.
    pub fn extension(&self) -> Option<&str> {
        self.relative.extension().and_then(|e| e.to_str())
    }

    /// File stem of the output path.
    pub fn stem(&self) -> &str {
        self.relative
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// Change the extension of the output path.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.relative.set_extension(extension);
        self
    }

    /// Output path with forward slashes, as used for template names and
    /// source map entries.
    pub fn relative_name(&self) -> String {
        slash_path(&self.relative)
    }

    /// Partials are files (or files inside directories) whose name starts
    /// with an underscore. They are inputs for other files, never outputs.
    pub fn is_partial(&self) -> bool {
        self.relative
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('_'))
    }
}

/// Render a path with `/` separators regardless of platform.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_partials_at_any_depth() {
        assert!(FileEntry::new("a", "_layout.html", "").is_partial());
        assert!(FileEntry::new("a", "_shared/nav.html", "").is_partial());
        assert!(!FileEntry::new("a", "blog/index.html", "").is_partial());
    }

    #[test]
    fn changes_extension_of_output_path() {
        let file = FileEntry::new("src/main.scss", "css/main.scss", "").with_extension("css");

        assert_eq!(file.relative, PathBuf::from("css/main.css"));
        assert_eq!(file.stem(), "main");
        assert_eq!(file.relative_name(), "css/main.css");
    }

    #[test]
    fn rejects_binary_contents_as_text() {
        let file = FileEntry::new("logo.png", "logo.png", vec![0xff, 0xfe, 0x00]);

        let err = file.text("render").unwrap_err();

        assert_eq!(err.step, "render");
        assert!(err.message.contains("UTF-8"));
    }
}
