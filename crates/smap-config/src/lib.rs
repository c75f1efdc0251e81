//! Configuration management for smap.
//!
//! Parses `smap.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ```toml
//! [cache]
//! limit = 500
//!
//! [negotiation]
//! on_unacceptable = "fallback"
//! empty_accept = "accept-all"
//!
//! [documents]
//! root = "${SMAP_ROOT:-docs}"
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `documents.root` supports `${VAR}` (errors if unset) and
//! `${VAR:-default}`. Relative roots are resolved against the directory
//! holding the config file.

mod expand;

use serde::Deserialize;
use smap_negotiate::{NegotiationPolicy, Unacceptable};
use std::path::{Path, PathBuf};

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "smap.toml";

/// Default document root, relative to the config directory.
const DEFAULT_ROOT: &str = "docs";

/// CLI settings that override configuration file values.
///
/// Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the cache limit.
    pub cache_limit: Option<i64>,
    /// Override the document root.
    pub root: Option<PathBuf>,
    /// Override the behaviour when nothing offered is acceptable.
    pub on_unacceptable: Option<Unacceptable>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache configuration.
    pub cache: CacheConfig,
    /// Negotiation policy.
    pub negotiation: NegotiationPolicy,
    /// Documents configuration (root as written in TOML).
    documents: DocumentsConfigRaw,

    /// Resolved documents configuration (set after loading).
    #[serde(skip)]
    pub documents_resolved: DocumentsConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Cache configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Global soft limit on cached objects; 0 means unlimited.
    pub limit: i64,
}

/// Raw documents configuration as parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DocumentsConfigRaw {
    root: Option<String>,
}

/// Resolved documents configuration.
#[derive(Debug, Default)]
pub struct DocumentsConfig {
    /// Directory file-sourced partitions are rooted at.
    pub root: PathBuf,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`documents.root`").
        field: String,
        /// Error message (e.g., "${`SMAP_ROOT`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `smap.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, and the
    /// result is validated again.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails
    /// or a value is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(limit) = settings.cache_limit {
            self.cache.limit = limit;
        }
        if let Some(root) = &settings.root {
            self.documents_resolved.root.clone_from(root);
        }
        if let Some(on_unacceptable) = settings.on_unacceptable {
            self.negotiation.on_unacceptable = on_unacceptable;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            cache: CacheConfig::default(),
            negotiation: NegotiationPolicy::default(),
            documents: DocumentsConfigRaw::default(),
            documents_resolved: DocumentsConfig {
                root: base.join(DEFAULT_ROOT),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for a negative cache limit or an
    /// empty document root.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.limit < 0 {
            return Err(ConfigError::Validation(format!(
                "cache.limit cannot be negative (got {})",
                self.cache.limit
            )));
        }
        if let Some(root) = &self.documents.root {
            require_non_empty(root, "documents.root")?;
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref root) = self.documents.root {
            self.documents.root = Some(expand::expand_env(root, "documents.root")?);
        }
        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let root = self.documents.root.as_deref().unwrap_or(DEFAULT_ROOT);
        self.documents_resolved = DocumentsConfig {
            root: config_dir.join(root),
        };
    }
}
