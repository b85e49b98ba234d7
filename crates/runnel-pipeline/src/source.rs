//! Reading the files matched by glob patterns.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::file::{slash_path, FileEntry};
use crate::pipeline::PipelineError;

/// Include and exclude glob sets compiled from a pattern list.
///
/// Patterns starting with `!` exclude. `*` does not cross directory
/// boundaries; `**` does.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    include: GlobSet,
    exclude: GlobSet,
}

impl GlobMatcher {
    /// Compile a pattern list.
    pub fn new(patterns: &[String]) -> Result<Self, PipelineError> {
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();

        for pattern in patterns {
            let (builder, glob) = match pattern.strip_prefix('!') {
                Some(negated) => (&mut exclude, negated),
                None => (&mut include, pattern.as_str()),
            };
            let glob = GlobBuilder::new(glob.trim_start_matches("./"))
                .literal_separator(true)
                .build()
                .map_err(|e| PipelineError::Glob {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
            builder.add(glob);
        }

        let build = |builder: GlobSetBuilder| {
            builder.build().map_err(|e| PipelineError::Glob {
                pattern: patterns.join(", "),
                message: e.to_string(),
            })
        };

        Ok(Self {
            include: build(include)?,
            exclude: build(exclude)?,
        })
    }

    /// Whether a root-relative path (with `/` separators) is selected.
    pub fn is_match(&self, path: &str) -> bool {
        self.include.is_match(path) && !self.exclude.is_match(path)
    }
}

/// The non-glob directory prefix of a pattern.
///
/// `assets/styles/**/*.scss` has base `assets/styles`; a literal file path
/// such as `assets/scripts/main.js` has its parent directory as base.
pub fn glob_base(pattern: &str) -> PathBuf {
    let pattern = pattern.trim_start_matches('!').trim_start_matches("./");
    let parts: Vec<&str> = pattern.split('/').collect();

    let magic = parts
        .iter()
        .position(|part| part.contains(['*', '?', '[', '{']));
    let take = match magic {
        Some(index) => index,
        None => parts.len().saturating_sub(1),
    };

    parts[..take].iter().collect()
}

/// Files selected by glob patterns under a project root.
#[derive(Debug, Clone)]
pub struct Source {
    root: PathBuf,
    patterns: Vec<String>,
    base: Option<PathBuf>,
}

impl Source {
    /// Select files under `root` matching `patterns`.
    pub fn new(root: impl Into<PathBuf>, patterns: &[String]) -> Self {
        Self {
            root: root.into(),
            patterns: patterns.to_vec(),
            base: None,
        }
    }

    /// Compute output paths relative to `base` (itself relative to the root)
    /// instead of each pattern's glob base.
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Patterns this source selects.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Read every matching file, sorted by path.
    pub fn read(&self) -> Result<Vec<FileEntry>, PipelineError> {
        let matcher = GlobMatcher::new(&self.patterns)?;
        let mut found: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

        for pattern in self.patterns.iter().filter(|p| !p.starts_with('!')) {
            let pattern_base = glob_base(pattern);
            let walk_root = self.root.join(&pattern_base);
            if !walk_root.exists() {
                tracing::debug!("Nothing to read under {}", walk_root.display());
                continue;
            }

            for entry in WalkDir::new(&walk_root)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                let Ok(relative_to_root) = path.strip_prefix(&self.root) else {
                    continue;
                };
                if found.contains_key(path) || !matcher.is_match(&slash_path(relative_to_root)) {
                    continue;
                }

                let base = self.base.clone().unwrap_or_else(|| pattern_base.clone());
                found.insert(path.to_path_buf(), base);
            }
        }

        let mut files = Vec::with_capacity(found.len());
        for (path, base) in found {
            let contents = fs::read(&path).map_err(|source| PipelineError::Read {
                path: path.clone(),
                source,
            })?;
            let relative = relative_to(&path, &self.root.join(&base));
            files.push(FileEntry::new(path, relative, contents));
        }

        Ok(files)
    }
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    match path.strip_prefix(base) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_glob_base() {
        assert_eq!(glob_base("assets/styles/**/*.scss"), PathBuf::from("assets/styles"));
        assert_eq!(glob_base("assets/scripts/main.js"), PathBuf::from("assets/scripts"));
        assert_eq!(glob_base("./views/*.html"), PathBuf::from("views"));
        assert_eq!(glob_base("*.js"), PathBuf::new());
        assert_eq!(glob_base("vendor/{a,b}/*.js"), PathBuf::from("vendor"));
    }

    #[test]
    fn matcher_honours_exclusions_and_separators() {
        let matcher = GlobMatcher::new(&patterns(&[
            "assets/**/*.js",
            "assets/*.css",
            "!assets/**/*.min.js",
        ]))
        .unwrap();

        assert!(matcher.is_match("assets/scripts/main.js"));
        assert!(matcher.is_match("assets/main.js"));
        assert!(matcher.is_match("assets/site.css"));
        assert!(!matcher.is_match("assets/nested/site.css"));
        assert!(!matcher.is_match("assets/vendor/jquery.min.js"));
    }

    #[test]
    fn rejects_invalid_pattern() {
        let err = GlobMatcher::new(&patterns(&["assets/[.js"])).unwrap_err();

        assert!(matches!(err, PipelineError::Glob { .. }));
    }

    #[test]
    fn reads_matches_relative_to_glob_base() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("assets/images/icons")).unwrap();
        fs::write(root.join("assets/images/logo.png"), b"png").unwrap();
        fs::write(root.join("assets/images/icons/star.svg"), b"<svg/>").unwrap();
        fs::write(root.join("assets/images/notes.txt"), b"skip").unwrap();

        let files = Source::new(root, &patterns(&["assets/images/**/*.{png,svg}"]))
            .read()
            .unwrap();

        let names: Vec<_> = files.iter().map(|f| f.relative_name()).collect();
        assert_eq!(names, vec!["icons/star.svg", "logo.png"]);
        assert_eq!(files[1].contents, b"png");
        assert_eq!(files[1].source, root.join("assets/images/logo.png"));
    }

    #[test]
    fn explicit_base_overrides_glob_base() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("views/blog")).unwrap();
        fs::write(root.join("views/blog/post.html"), b"post").unwrap();

        let files = Source::new(root, &patterns(&["views/blog/*.html"]))
            .with_base("views")
            .read()
            .unwrap();

        assert_eq!(files[0].relative_name(), "blog/post.html");
    }

    #[test]
    fn overlapping_patterns_read_each_file_once() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.js"), b"main").unwrap();

        let files = Source::new(root, &patterns(&["src/*.js", "src/main.js"]))
            .read()
            .unwrap();

        assert_eq!(files.len(), 1);
    }

    #[test]
    fn missing_directories_yield_nothing() {
        let temp = tempdir().unwrap();

        let files = Source::new(temp.path(), &patterns(&["nope/**/*.js"]))
            .read()
            .unwrap();

        assert!(files.is_empty());
    }
}
