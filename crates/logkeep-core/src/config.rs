//! Configuration file parsing for logkeep
//!
//! Supports multiple configuration file formats:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_excluded_images() -> Vec<String> {
    vec![HELPER_IMAGE.to_string()]
}

fn default_excluded_names() -> Vec<String> {
    vec![SELF_NAME.to_string()]
}

fn default_name_label() -> String {
    NAME_LABEL.to_string()
}

fn default_preview_label() -> String {
    PREVIEW_LABEL.to_string()
}

/// Service configuration (logkeep.toml/yaml/json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the archive
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    /// Size ceiling of a single archive file in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// HTTP bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token guarding the query API (None = open)
    pub token: Option<String>,
    /// Images whose containers are never captured
    #[serde(default = "default_excluded_images")]
    pub excluded_images: Vec<String>,
    /// Container names that are never captured
    #[serde(default = "default_excluded_names")]
    pub excluded_names: Vec<String>,
    #[serde(default)]
    pub naming: NamingConfig,
    /// Cap on remembered lines per capture channel (None = unbounded)
    pub dedup_capacity: Option<usize>,
    /// Docker endpoint, e.g. "tcp://10.0.0.2:2375" (None = local defaults)
    pub docker_host: Option<String>,
}

/// Labels used to derive a workload's display name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamingConfig {
    #[serde(default = "default_name_label")]
    pub name_label: String,
    #[serde(default = "default_preview_label")]
    pub preview_label: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            name_label: default_name_label(),
            preview_label: default_preview_label(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            bind: default_bind(),
            token: None,
            excluded_images: default_excluded_images(),
            excluded_names: default_excluded_names(),
            naming: NamingConfig::default(),
            dedup_capacity: None,
            docker_host: None,
        }
    }
}

impl Config {
    /// Load config from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content, format)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Reject settings the capture engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.logs_dir.as_os_str().is_empty() {
            return Err(Error::config("logs_dir must not be empty"));
        }
        if self.max_file_size == 0 {
            return Err(Error::config("max_file_size must be greater than zero"));
        }
        if self.dedup_capacity == Some(0) {
            return Err(Error::config("dedup_capacity must be greater than zero when set"));
        }
        Ok(())
    }

    /// Whether a container with this image and runtime name belongs to the service itself
    pub fn is_excluded(&self, image: &str, names: &[String]) -> bool {
        if self.excluded_images.iter().any(|i| i == image) {
            return true;
        }
        names
            .iter()
            .map(|n| n.trim_start_matches('/'))
            .any(|n| self.excluded_names.iter().any(|e| e == n))
    }
}
