//! Configuration parsing and management.

use crate::exclude::{ExcludeError, ExcludeRules};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("No include directories configured")]
    NoIncludes,

    #[error("Include directory {path:?} does not exist: {source}")]
    MissingInclude {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Include path {0:?} is not a directory")]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Exclude(#[from] ExcludeError),
}

/// Server configuration, matching the `mdwiki.yml` schema:
///
/// ```yaml
/// include: [notes, journal]
/// exclude: [drafts, "*.tmp"]
/// watch: true
/// server:
///   hostname: localhost
///   port: 8123
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub include: Vec<PathBuf>,

    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub watch: bool,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_hostname() -> String {
    String::from("localhost")
}

fn default_port() -> u16 {
    8123
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            server: ServerConfig::default(),
            watch: false,
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&contents)?
        };

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Include directories, resolved and checked to exist.
    ///
    /// Relative entries from a config file resolve against the file's
    /// directory; others against the working directory. The result is
    /// absolute and deduplicated, in configuration order.
    pub fn include_roots(&self) -> Result<Vec<PathBuf>, ConfigError> {
        if self.include.is_empty() {
            return Err(ConfigError::NoIncludes);
        }

        let mut roots: Vec<PathBuf> = Vec::with_capacity(self.include.len());
        for include in &self.include {
            let path = self.resolve_path(include);
            let root = path
                .canonicalize()
                .map_err(|source| ConfigError::MissingInclude {
                    path: path.clone(),
                    source,
                })?;
            if !root.is_dir() {
                return Err(ConfigError::NotADirectory(path));
            }
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        Ok(roots)
    }

    /// Compile the exclude list
    pub fn exclude_rules(&self) -> Result<ExcludeRules, ConfigError> {
        Ok(ExcludeRules::new(&self.exclude)?)
    }

    /// `hostname:port` the server binds to
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.hostname, self.server.port)
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(parent) = self.config_path.as_deref().and_then(Path::parent) {
            parent.join(path)
        } else {
            path.to_path_buf()
        }
    }
}
