//! Project configuration: networks, paths and default library links

use crate::{blockchain::NetworkConfig, linking::Libraries};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Default name of the configuration file
pub const CONFIG_FILE_NAME: &str = "conflux.toml";

/// Main configuration of a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginConfig {
    /// Network used when none is requested explicitly
    pub default_network: String,

    /// User defined networks keyed by name
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Project layout
    pub paths: PathsConfig,

    /// Library addresses used whenever a contract needs them and the caller
    /// did not pass its own
    pub libraries: Libraries,
}

/// Project directory layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Project root directory
    /// If relative, it's relative to the config file (or the working directory)
    pub root: PathBuf,

    /// Compiled artifacts directory
    /// If relative, it's relative to root
    pub artifacts: PathBuf,

    /// Solidity sources directory
    /// If relative, it's relative to root
    pub sources: PathBuf,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            default_network: "conflux-testnet".to_string(),
            networks: BTreeMap::new(),
            paths: PathsConfig::default(),
            libraries: Libraries::new(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            artifacts: PathBuf::from("artifacts"),
            sources: PathBuf::from("contracts"),
        }
    }
}

impl PluginConfig {
    /// Loads configuration from a TOML file.
    ///
    /// A relative `paths.root` is resolved against the directory holding the file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if config.paths.root.is_relative() {
            config.paths.root = base.join(&config.paths.root);
        }

        config.validate()?;
        tracing::debug!(
            "Loaded config from {} with {} networks",
            path.display(),
            config.networks.len()
        );
        Ok(config)
    }

    /// Loads `path` if it exists, falling back to defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parses configuration from TOML text without touching the filesystem
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: PluginConfig = toml::from_str(content)?;
        for (name, network) in config.networks.iter_mut() {
            if network.name.is_empty() {
                network.name = name.clone();
            }
        }
        Ok(config)
    }

    /// Returns the artifacts directory resolved against the project root
    pub fn artifacts_dir(&self) -> PathBuf {
        resolve(&self.paths.root, &self.paths.artifacts)
    }

    /// Returns the sources directory resolved against the project root
    pub fn sources_dir(&self) -> PathBuf {
        resolve(&self.paths.root, &self.paths.sources)
    }

    /// Selects a network by name, or the default network when `name` is `None`.
    /// Configured networks shadow the built-in presets.
    pub fn network(&self, name: Option<&str>) -> Result<NetworkConfig> {
        let name = name.unwrap_or(&self.default_network);
        if let Some(network) = self.networks.get(name) {
            return Ok(network.clone());
        }
        NetworkConfig::preset(name).ok_or_else(|| {
            let available: Vec<&str> = self.networks.keys().map(String::as_str).collect();
            eyre::eyre!(
                "Unknown network {:?}. Configured networks: [{}]",
                name,
                available.join(", ")
            )
        })
    }

    /// Validates the entire configuration
    pub fn validate(&self) -> Result<()> {
        for network in self.networks.values() {
            network.validate()?;
        }
        self.network(None).context("Invalid default_network")?;
        Ok(())
    }

    /// Create a new builder for PluginConfig
    pub fn builder() -> PluginConfigBuilder {
        PluginConfigBuilder::default()
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Builder for creating PluginConfig with a fluent API
#[derive(Default)]
pub struct PluginConfigBuilder {
    config: PluginConfig,
}

impl PluginConfigBuilder {
    /// Set the project root directory
    pub fn root(mut self, path: PathBuf) -> Self {
        self.config.paths.root = path;
        self
    }

    /// Set the artifacts directory
    pub fn artifacts(mut self, path: PathBuf) -> Self {
        self.config.paths.artifacts = path;
        self
    }

    /// Set the sources directory
    pub fn sources(mut self, path: PathBuf) -> Self {
        self.config.paths.sources = path;
        self
    }

    /// Set the default network name
    pub fn default_network(mut self, name: impl Into<String>) -> Self {
        self.config.default_network = name.into();
        self
    }

    /// Add a network, keyed by its name
    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.config.networks.insert(network.name.clone(), network);
        self
    }

    /// Add a default library link
    pub fn library(mut self, identifier: impl Into<String>, address: impl Into<String>) -> Self {
        self.config
            .libraries
            .insert(identifier.into(), address.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PluginConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
