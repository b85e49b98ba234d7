//! The `.env` file and when it must exist.
//!
//! Variables the file does not set fall back to the process environment,
//! so `RUNNEL_MODE=production runnel build` works without editing the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::ConfigError;

/// How an invocation treats the environment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvPolicy {
    /// Missing or malformed is fatal.
    Required,

    /// Missing or malformed is a warning; defaults apply.
    Optional,

    /// Not read at all.
    Skip,
}

impl EnvPolicy {
    /// Policy for invoking `task` from the command line.
    ///
    /// Checks and `clean` do not depend on it. The dev server and watcher
    /// keep going without it. Everything else produces shipped output and
    /// needs it.
    pub fn for_task(task: &str) -> Self {
        match task {
            "lint" | "style" | "test" | "clean" => Self::Skip,
            "server" | "watch" | "default" => Self::Optional,
            _ => Self::Required,
        }
    }
}

/// Variables read from an environment file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: BTreeMap<String, String>,
}

impl Env {
    /// Load `path` under `policy`.
    pub fn load(path: &Path, policy: EnvPolicy) -> Result<Self, ConfigError> {
        if policy == EnvPolicy::Skip {
            return Ok(Self::default());
        }

        let loaded = if path.is_file() {
            fs::read_to_string(path)
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
                .and_then(|content| Self::parse(path, &content))
        } else {
            Err(ConfigError::MissingEnv(path.to_path_buf()))
        };

        match (loaded, policy) {
            (Ok(env), _) => {
                tracing::debug!("Loaded {} variable(s) from {}", env.vars.len(), path.display());
                Ok(env)
            }
            (Err(e), EnvPolicy::Optional) => {
                tracing::warn!("{}; continuing with defaults", e);
                Ok(Self::default())
            }
            (Err(e), _) => Err(e),
        }
    }

    /// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped,
    /// an `export ` prefix is allowed, and values may be quoted.
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let mut vars = BTreeMap::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::EnvSyntax {
                    path: path.to_path_buf(),
                    line: index + 1,
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::EnvSyntax {
                    path: path.to_path_buf(),
                    line: index + 1,
                });
            }

            vars.insert(key.to_string(), unquote(value.trim()));
        }

        Ok(Self { vars })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Add the variables of `fallback` the file does not set.
    pub fn with_fallback(mut self, fallback: impl IntoIterator<Item = (String, String)>) -> Self {
        for (key, value) in fallback {
            self.vars.entry(key).or_insert(value);
        }
        self
    }

    /// Fall back to the process environment. Variables that are not valid
    /// UTF-8 are ignored.
    pub fn with_process_env(self) -> Self {
        let process = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        self.with_fallback(process)
    }
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 {
        if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            return inner.replace("\\n", "\n").replace("\\\"", "\"");
        }
        if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
            return inner.to_string();
        }
    }

    // Unquoted values end at an inline comment.
    match value.find(" #") {
        Some(index) => value[..index].trim_end().to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn parse(content: &str) -> Env {
        Env::parse(Path::new(".env"), content).unwrap()
    }

    #[test]
    fn parses_assignments() {
        let env = parse(
            "# deployment\n\
             url=https://example.com\n\
             export RUNNEL_MODE = production\n\
             \n\
             TITLE=\"My \\\"site\\\"\"\n\
             RAW='a # b'\n\
             PORT=3000 # dev only\n\
             EMPTY=\n",
        );

        assert_eq!(env.get("url"), Some("https://example.com"));
        assert_eq!(env.get("RUNNEL_MODE"), Some("production"));
        assert_eq!(env.get("TITLE"), Some("My \"site\""));
        assert_eq!(env.get("RAW"), Some("a # b"));
        assert_eq!(env.get("PORT"), Some("3000"));
        assert_eq!(env.get("EMPTY"), Some(""));
        assert_eq!(env.get("missing"), None);
    }

    #[test]
    fn rejects_lines_without_assignment() {
        let err = Env::parse(Path::new(".env"), "A=1\nnot an assignment\n").unwrap_err();

        assert!(matches!(err, ConfigError::EnvSyntax { line: 2, .. }));
    }

    #[test]
    fn policy_depends_on_task() {
        assert_eq!(EnvPolicy::for_task("build"), EnvPolicy::Required);
        assert_eq!(EnvPolicy::for_task("stylesheets.project"), EnvPolicy::Required);
        assert_eq!(EnvPolicy::for_task("server"), EnvPolicy::Optional);
        assert_eq!(EnvPolicy::for_task("default"), EnvPolicy::Optional);
        assert_eq!(EnvPolicy::for_task("test"), EnvPolicy::Skip);
        assert_eq!(EnvPolicy::for_task("clean"), EnvPolicy::Skip);
    }

    #[test]
    fn missing_file_follows_policy() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".env");

        assert!(matches!(
            Env::load(&path, EnvPolicy::Required),
            Err(ConfigError::MissingEnv(_))
        ));
        assert_eq!(Env::load(&path, EnvPolicy::Optional).unwrap(), Env::default());
        assert_eq!(Env::load(&path, EnvPolicy::Skip).unwrap(), Env::default());
    }

    #[test]
    fn skip_does_not_read_a_broken_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".env");
        fs::write(&path, "garbage\n").unwrap();

        assert!(Env::load(&path, EnvPolicy::Skip).is_ok());
        assert_eq!(Env::load(&path, EnvPolicy::Optional).unwrap(), Env::default());
        assert!(Env::load(&path, EnvPolicy::Required).is_err());
    }

    #[test]
    fn loads_existing_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".env");
        fs::write(&path, "url=http://example.test\n").unwrap();

        let env = Env::load(&path, EnvPolicy::Required).unwrap();

        assert_eq!(env.get("url"), Some("http://example.test"));
    }

    #[test]
    fn file_values_win_over_the_fallback() {
        let env = parse("url=https://example.com\n").with_fallback([
            ("url".to_string(), "http://shell.test".to_string()),
            ("RUNNEL_MODE".to_string(), "production".to_string()),
        ]);

        assert_eq!(env.get("url"), Some("https://example.com"));
        assert_eq!(env.get("RUNNEL_MODE"), Some("production"));
    }

    #[test]
    fn process_environment_fills_the_gaps() {
        std::env::set_var("RUNNEL_ENV_FALLBACK_CHECK", "from-shell");

        let env = parse("RUNNEL_ENV_FALLBACK_FILE=from-file\n").with_process_env();

        assert_eq!(env.get("RUNNEL_ENV_FALLBACK_CHECK"), Some("from-shell"));
        assert_eq!(env.get("RUNNEL_ENV_FALLBACK_FILE"), Some("from-file"));
    }
}
