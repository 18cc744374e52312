//! Viewer configuration: built-in defaults, an optional TOML file, then
//! environment overrides.

use anyhow::{Context, Result};
use dirs_next::config_dir;
use ecgscope_lib::viewport::DEFAULT_SEGMENT_S;
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "ECGSCOPE_CONFIG";
pub const API_URL_ENV: &str = "ECGSCOPE_API_URL";
pub const SEGMENT_ENV: &str = "ECGSCOPE_SEGMENT_S";
pub const THEME_FILE_ENV: &str = "ECGSCOPE_THEME_FILE";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub api_base_url: String,
    pub default_segment_s: f64,
    pub request_timeout_s: f64,
    pub use_session_cache: bool,
    pub theme_file: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            default_segment_s: DEFAULT_SEGMENT_S,
            request_timeout_s: 30.0,
            use_session_cache: true,
            theme_file: None,
        }
    }
}

impl ViewerConfig {
    /// Resolve from `path` (else `ECGSCOPE_CONFIG`) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| env::var(key).ok())
    }

    /// Same as [`Self::load`] with an explicit environment lookup.
    pub fn load_with(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = path.map(Path::to_path_buf).or_else(|| lookup(CONFIG_ENV).map(PathBuf::from));
        let mut config = match file {
            Some(file) => {
                info!("reading viewer config from {}", file.display());
                Self::from_file(&file)?
            }
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(API_URL_ENV) {
            info!("{API_URL_ENV} overrides api_base_url");
            self.api_base_url = url;
        }
        if let Some(raw) = lookup(SEGMENT_ENV) {
            self.default_segment_s = raw
                .trim()
                .parse()
                .with_context(|| format!("{SEGMENT_ENV}={raw} is not a number"))?;
        }
        if let Some(theme) = lookup(THEME_FILE_ENV) {
            self.theme_file = Some(PathBuf::from(theme));
        }
        Ok(())
    }

    /// Where the theme preference is stored.
    pub fn theme_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.theme_file {
            return Ok(path.clone());
        }
        let base = config_dir().context("unable to locate config directory")?;
        Ok(base.join("ecgscope").join("theme.json"))
    }
}
