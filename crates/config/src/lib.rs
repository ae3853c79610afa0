//! Configuration for mimedb.
//!
//! Values are merged from, lowest precedence first: built-in defaults, an
//! optional file (TOML, YAML or JSON, chosen by extension) and `MIMEDB_`
//! environment variables, where `__` separates nested keys.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::BaseDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use mimedb_format::{CACHE_FILE_NAME, GLOBS_FILE_NAME, TYPES_FILE_NAME};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

pub const ENV_PREFIX: &str = "MIMEDB_";
/// Used when `XDG_DATA_DIRS` is unset or empty.
pub const DEFAULT_DATA_DIRS: &str = "/usr/local/share:/usr/share";
pub const DEFAULT_RECHECK_INTERVAL: u64 = 5;
pub const DEFAULT_SNIFF_BUFFER_SIZE: usize = 64 * 1024;

/// One MIME data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    /// Directory containing `mime.cache` (and optionally `types`).
    pub directory: PathBuf,
    /// Extra files whose modification invalidates the cache, e.g. the
    /// `packages` directory it was generated from.
    #[serde(default)]
    pub stamp_files: Vec<PathBuf>,
}
impl LayerConfig {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), directory: directory.into(), stamp_files: Vec::new() }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.directory.join(CACHE_FILE_NAME)
    }

    pub fn types_path(&self) -> PathBuf {
        self.directory.join(TYPES_FILE_NAME)
    }

    pub fn globs_path(&self) -> PathBuf {
        self.directory.join(GLOBS_FILE_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directories, most-local first.
    pub layers: Vec<LayerConfig>,
    /// Seconds between checks for on-disk changes, per layer. Zero checks on
    /// every query.
    pub recheck_interval: u64,
    /// Bytes read from a file or stream before sniffing its content.
    pub sniff_buffer_size: usize,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            layers: default_layers(),
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
            sniff_buffer_size: DEFAULT_SNIFF_BUFFER_SIZE,
        }
    }
}
impl Config {
    /// The merged configuration sources, before extraction.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = match path.extension().and_then(OsStr::to_str) {
                Some("toml") => figment.merge(Toml::file_exact(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
                Some("json") => figment.merge(Json::file_exact(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load, merge and validate the configuration.
    #[instrument(level = "debug")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Config = Self::figment(path)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(layers = config.layers.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for layer in &self.layers {
            if layer.name.trim().is_empty() {
                exn::bail!(ErrorKind::Invalid("layer names must not be empty".into()));
            }
            if layer.directory.as_os_str().is_empty() {
                exn::bail!(ErrorKind::Invalid(format!("layer {:?} has no directory", layer.name)));
            }
            if !names.insert(layer.name.as_str()) {
                exn::bail!(ErrorKind::Invalid(format!("duplicate layer name {:?}", layer.name)));
            }
        }
        if self.sniff_buffer_size == 0 {
            exn::bail!(ErrorKind::Invalid("sniff_buffer_size must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval)
    }
}

/// The user's data directory followed by every `XDG_DATA_DIRS` entry, each
/// with `mime` appended.
pub fn default_layers() -> Vec<LayerConfig> {
    let user = BaseDirs::new().map(|dirs| dirs.data_local_dir().to_path_buf());
    let data_dirs = std::env::var("XDG_DATA_DIRS").ok();
    layers_from(user, data_dirs.as_deref())
}

fn layers_from(user: Option<PathBuf>, data_dirs: Option<&str>) -> Vec<LayerConfig> {
    let mut layers: Vec<LayerConfig> = user.into_iter().map(|dir| LayerConfig::new("user", dir.join("mime"))).collect();
    let data_dirs = data_dirs.filter(|dirs| !dirs.is_empty()).unwrap_or(DEFAULT_DATA_DIRS);
    let system = std::env::split_paths(data_dirs).filter(|dir| !dir.as_os_str().is_empty());
    for (index, dir) in system.enumerate() {
        let directory = dir.join("mime");
        if layers.iter().any(|layer| layer.directory == directory) {
            continue;
        }
        let name = match index {
            0 => "system".to_string(),
            index => format!("system-{index}"),
        };
        layers.push(LayerConfig::new(name, directory));
    }
    layers
}
