//! Build configuration (runnel.toml).

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors loading configuration or the environment file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Missing environment file {}. Create one before building.", .0.display())]
    MissingEnv(PathBuf),

    #[error("{}:{line}: expected KEY=VALUE", path.display())]
    EnvSyntax { path: PathBuf, line: usize },
}

/// Configuration file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Output directory everything is built into
    #[serde(default = "default_build")]
    pub build: PathBuf,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Document served for unknown routes
    #[serde(default = "default_fallback")]
    pub fallback: String,

    /// Open the browser when the server starts
    #[serde(default = "default_open")]
    pub open: bool,

    /// Quiet window for coalescing file changes
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default)]
    pub views: ViewsConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub images: ImagesConfig,

    #[serde(default)]
    pub sprites: SpritesConfig,

    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub styles: StylesConfig,

    #[serde(default)]
    pub lint: CheckConfig,

    #[serde(default = "default_style_check")]
    pub style: CheckConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewsConfig {
    pub src: Vec<String>,
    /// Root for layouts and includes
    pub base: PathBuf,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            src: vec!["views/**/*.html".to_string()],
            base: PathBuf::from("views"),
        }
    }
}

/// Client-side templates, compiled into one script.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub src: Vec<String>,
    pub base: PathBuf,
    pub out: String,
    /// Global object the templates are registered on
    pub variable: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            src: vec!["templates/**/*.html".to_string()],
            base: PathBuf::from("templates"),
            out: "templates.js".to_string(),
            variable: "templates".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    pub src: Vec<String>,
    pub dest: PathBuf,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            src: vec!["assets/images/**/*".to_string()],
            dest: PathBuf::from("build/images"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpritesConfig {
    pub src: Vec<String>,
    pub dest: PathBuf,
    pub out: String,
    /// Command rendering SVG from stdin to PNG on stdout, e.g.
    /// `["rsvg-convert", "--format=png"]`. No PNG is produced without one.
    pub rasterizer: Option<Vec<String>>,
}

impl Default for SpritesConfig {
    fn default() -> Self {
        Self {
            src: vec!["assets/sprites/**/*.svg".to_string()],
            dest: PathBuf::from("build/images"),
            out: "sprite.svg".to_string(),
            rasterizer: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    pub dest: PathBuf,
    pub project: ProjectScriptsConfig,
    pub vendor: VendorScriptsConfig,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            dest: PathBuf::from("build/js"),
            project: ProjectScriptsConfig::default(),
            vendor: VendorScriptsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectScriptsConfig {
    /// Bundle entry points
    pub src: Vec<String>,
    /// Everything the entries may import
    pub watch: Vec<String>,
    pub out: String,
    /// Bundler executable
    pub bundler: String,
}

impl Default for ProjectScriptsConfig {
    fn default() -> Self {
        Self {
            src: vec!["assets/scripts/main.js".to_string()],
            watch: vec!["assets/scripts/**/*.js".to_string()],
            out: "main.js".to_string(),
            bundler: "esbuild".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VendorScriptsConfig {
    pub src: Vec<String>,
    pub out: String,
}

impl Default for VendorScriptsConfig {
    fn default() -> Self {
        Self {
            src: vec!["assets/vendor/**/*.js".to_string()],
            out: "vendor.js".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StylesConfig {
    pub project: ProjectStylesConfig,
    pub vendor: VendorStylesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectStylesConfig {
    pub src: Vec<String>,
    pub watch: Vec<String>,
    pub dest: PathBuf,
    /// Browserslist queries for vendor prefixing
    pub browsers: Vec<String>,
}

impl Default for ProjectStylesConfig {
    fn default() -> Self {
        Self {
            src: vec!["assets/styles/**/*.scss".to_string()],
            watch: vec!["assets/styles/**/*.scss".to_string()],
            dest: PathBuf::from("build/css"),
            browsers: vec!["last 2 versions".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VendorStylesConfig {
    pub src: Vec<String>,
    pub dest: PathBuf,
}

impl Default for VendorStylesConfig {
    fn default() -> Self {
        Self {
            src: vec!["assets/vendor/**/*.css".to_string()],
            dest: PathBuf::from("build/css/vendor"),
        }
    }
}

/// Files a check task reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub src: Vec<String>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            src: vec!["assets/scripts/**/*.js".to_string()],
        }
    }
}

fn default_build() -> PathBuf {
    PathBuf::from("build")
}
fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_fallback() -> String {
    "index.html".to_string()
}
fn default_open() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    150
}
fn default_style_check() -> CheckConfig {
    CheckConfig {
        src: vec!["assets/styles/**/*.scss".to_string()],
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build: default_build(),
            port: default_port(),
            host: default_host(),
            fallback: default_fallback(),
            open: default_open(),
            debounce_ms: default_debounce_ms(),
            views: ViewsConfig::default(),
            templates: TemplatesConfig::default(),
            images: ImagesConfig::default(),
            sprites: SpritesConfig::default(),
            scripts: ScriptsConfig::default(),
            styles: StylesConfig::default(),
            lint: CheckConfig::default(),
            style: default_style_check(),
        }
    }
}

impl Config {
    /// Load configuration from `path` if it exists.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.message().to_string())
    }
}
