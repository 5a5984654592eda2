use crate::error::{DapperError, IoContext, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "_config.yml";
pub const DEFAULT_SOURCE_DIR: &str = "_source";
pub const DEFAULT_LAYOUT_DIR: &str = "_layout";
pub const DEFAULT_OUTPUT_DIR: &str = "_output";

#[derive(Debug, Clone, PartialEq)]
pub struct SiteConfig {
    pub name: String,
    pub source_dir: PathBuf,
    pub layout_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config_path: PathBuf,
    /// Every other top-level key, exposed to templates as `site.<key>`.
    pub extra: Map<String, Value>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            layout_dir: PathBuf::from(DEFAULT_LAYOUT_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    name: Option<String>,
    source: Option<PathBuf>,
    layout: Option<PathBuf>,
    output: Option<PathBuf>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Path overrides coming from the command line. They win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source: Option<PathBuf>,
    pub layout: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl SiteConfig {
    /// Loads the config file at `config_path`. A missing file yields the
    /// defaults; a file that exists but does not parse is a fatal error.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let base = config_path.parent().unwrap_or(Path::new(""));

        let mut config = Self {
            config_path: config_path.to_path_buf(),
            source_dir: base.join(DEFAULT_SOURCE_DIR),
            layout_dir: base.join(DEFAULT_LAYOUT_DIR),
            output_dir: base.join(DEFAULT_OUTPUT_DIR),
            ..Self::default()
        };

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(config);
        }

        let content = fs::read_to_string(config_path).read_context(config_path)?;
        let raw = parse_config(&content, config_path)?;

        if let Some(name) = raw.name {
            config.name = name;
        }
        if let Some(source) = raw.source {
            config.source_dir = base.join(source);
        }
        if let Some(layout) = raw.layout {
            config.layout_dir = base.join(layout);
        }
        if let Some(output) = raw.output {
            config.output_dir = base.join(output);
        }
        config.extra = raw.extra;

        Ok(config)
    }

    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(source) = &overrides.source {
            self.source_dir = source.clone();
        }
        if let Some(layout) = &overrides.layout {
            self.layout_dir = layout.clone();
        }
        if let Some(output) = &overrides.output {
            self.output_dir = output.clone();
        }
        self
    }

    /// Paths whose changes trigger a rebuild. The output directory is never watched.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        vec![
            self.source_dir.clone(),
            self.layout_dir.clone(),
            self.config_path.clone(),
        ]
    }
}

fn parse_config(content: &str, path: &Path) -> Result<RawConfig> {
    if content.trim().is_empty() {
        return Ok(RawConfig::default());
    }

    serde_yaml::from_str(content).map_err(|error| DapperError::Config {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}
