//! Configuration loading and the live-reloadable config store

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{HookError, Result};

/// Log destination meaning "write to stdout".
pub const STDOUT_LOG: &str = "-";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HookConfig {
    #[serde(alias = "Logfile", default = "default_logfile")]
    pub logfile: String,
    #[serde(alias = "Address", default)]
    pub address: String,
    #[serde(alias = "Port")]
    pub port: u16,
    #[serde(alias = "Secret", default)]
    pub secret: String,
    #[serde(alias = "Repositories", default)]
    pub repositories: Vec<RepositoryRule>,
    /// Seconds a single command may run before it is killed.
    #[serde(default)]
    pub command_timeout: Option<u64>,
    /// Upper bound on subprocesses running at once, across all requests.
    /// Unset or `0` means unbounded.
    #[serde(default)]
    pub max_concurrent_commands: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RepositoryRule {
    /// Repository full name (`owner/repo`) or its html URL.
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Commands", default)]
    pub commands: Vec<String>,
}

fn default_logfile() -> String {
    STDOUT_LOG.to_string()
}

impl HookConfig {
    /// Address the listener binds to. An empty host means all interfaces.
    pub fn listen_address(&self) -> String {
        match self.address.as_str() {
            "" => format!("0.0.0.0:{}", self.port),
            host if host.contains(':') && !host.starts_with('[') => {
                format!("[{}]:{}", host, self.port)
            }
            host => format!("{}:{}", host, self.port),
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout.map(Duration::from_secs)
    }

    pub fn logs_to_stdout(&self) -> bool {
        self.logfile.is_empty() || self.logfile == STDOUT_LOG
    }
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML, everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

pub fn parse_config(content: &str, format: ConfigFormat) -> Result<HookConfig> {
    let config = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Toml => toml::from_str(content)?,
    };
    Ok(config)
}

/// Load and parse the configuration file
pub fn load_config(path: &Path) -> Result<HookConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        HookError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&content, ConfigFormat::from_path(path)).map_err(|e| {
        HookError::ConfigError(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// One fully loaded configuration. Never mutated after construction.
#[derive(Debug)]
pub struct ConfigSnapshot {
    pub config: HookConfig,
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
}

/// Holds the active configuration and swaps it whole on reload.
///
/// Readers take an `Arc` to the current snapshot and keep using it for the
/// rest of their request, so a concurrent reload never shows them a mix of
/// two generations.
#[derive(Debug)]
pub struct ConfigStore {
    source: PathBuf,
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Loads the configuration at `source` and makes it the active snapshot.
    pub fn open(source: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let config = load_config(&source)?;
        info!("Loaded configuration from {:?}", source);
        Ok(Self {
            source,
            current: RwLock::new(Arc::new(ConfigSnapshot {
                config,
                generation: 1,
                loaded_at: Utc::now(),
            })),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Current snapshot; stays valid even if a reload happens afterwards.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Re-reads the source. On failure the active snapshot is left untouched.
    pub fn reload(&self) -> Result<Arc<ConfigSnapshot>> {
        let config = load_config(&self.source)?;

        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(ConfigSnapshot {
            config,
            generation: guard.generation + 1,
            loaded_at: Utc::now(),
        });
        *guard = Arc::clone(&next);
        debug!("Configuration generation {} is now active", next.generation);
        Ok(next)
    }
}
