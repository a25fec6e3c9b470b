//! # cvault-config
//!
//! Configuration management for Chunkvault.
//!
//! Loads configuration from:
//! 1. `~/.cvault/config.toml` (global)
//! 2. `.cvault/config.toml` (project-local, overrides global key by key)
//! 3. Environment variables (highest priority)

pub mod logging;

use std::path::{Path, PathBuf};

use cvault_store::{DigestAlgorithm, StoreOptions};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ENV_ROOT: &str = "CVAULT_ROOT";
pub const ENV_AVAILABLE_SPACE: &str = "CVAULT_AVAILABLE_SPACE";
pub const ENV_CHECK_THREADS: &str = "CVAULT_CHECK_THREADS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub vault: VaultConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let project = Path::new(".cvault/config.toml");
        let mut config = Self::load_layers(global.as_deref(), Some(project))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a single file, ignoring the standard locations and environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Read `global` then overlay `project`. Missing files are skipped.
    pub fn load_layers(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for path in [global, project].into_iter().flatten() {
            if path.exists() {
                debug!("Loading config from {:?}", path);
                let contents = std::fs::read_to_string(path)?;
                let layer: toml::Table = toml::from_str(&contents)?;
                merge_tables(&mut merged, layer);
            }
        }
        Ok(Config::deserialize(toml::Value::Table(merged))?)
    }

    /// Global config path: ~/.cvault/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".cvault/config.toml"))
    }

    /// Apply overrides from an environment lookup. Unparseable values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_ROOT) {
            self.store.root = PathBuf::from(root);
        }
        if let Some(n) = lookup(ENV_AVAILABLE_SPACE).and_then(|v| v.parse().ok()) {
            self.vault.available_space = n;
        }
        if let Some(n) = lookup(ENV_CHECK_THREADS).and_then(|v| v.parse().ok()) {
            self.store.check_threads = Some(n);
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Config::default().to_toml()
    }
}

/// Overlay `layer` onto `base`; nested tables merge, everything else replaces.
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Chunk store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store root directory (`~` is expanded)
    pub root: PathBuf,
    pub digest: DigestAlgorithm,
    pub detect_hashability: bool,
    pub verify_on_init: bool,
    /// Hash-check threads (None = auto)
    pub check_threads: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("~/.cvault/chunkstore"),
            digest: DigestAlgorithm::default(),
            detect_hashability: false,
            verify_on_init: false,
            check_threads: None,
        }
    }
}

impl StoreConfig {
    /// `root` with a leading `~` replaced by the home directory.
    pub fn resolved_root(&self) -> PathBuf {
        expand_home(&self.root)
    }

    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            digest: self.digest,
            detect_hashability: self.detect_hashability,
            verify_on_init: self.verify_on_init,
            check_threads: self.check_threads,
        }
    }
}

/// Vault configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Bytes the vault may use for permanent and cached chunks
    pub available_space: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            available_space: 1 << 30,
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
