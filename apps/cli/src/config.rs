//! User configuration, persisted as JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use burrow_mirror::MirrorPolicy;
use burrow_transfer::{DEFAULT_WORKERS, RetryPolicy};
use serde::{Deserialize, Serialize};

const CONFIG_ENV: &str = "BURROW_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sshclient: SshClientConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshClientConfig {
    pub identity: Option<PathBuf>,
    pub known_hosts: Option<PathBuf>,
    pub insecure: bool,
    pub username: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for SshClientConfig {
    fn default() -> Self {
        Self {
            identity: None,
            known_hosts: None,
            insecure: false,
            username: None,
            connect_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub max_workers: usize,
    pub retry: RetryConfig,
    pub mirror_policy: MirrorPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_WORKERS,
            retry: RetryConfig::default(),
            mirror_policy: MirrorPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 0 retries forever.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
        }
    }
}

impl Config {
    /// Loads the config from `explicit`, `$BURROW_CONFIG` or the default path.
    ///
    /// A missing default file yields defaults. A file named on the command line
    /// must exist. Unparseable content is logged and replaced by defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            anyhow::ensure!(path.exists(), "config file {} not found", path.display());
            return Self::load_from(path);
        }
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        match serde_json::from_str(&data) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }
}

/// `$BURROW_CONFIG` if set, else `<config dir>/burrow/config.json`.
pub fn config_path() -> anyhow::Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_base_dir()?.join("burrow").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        let home = std::env::var("HOME").context("HOME not set")?;
        Ok(PathBuf::from(home).join(".config"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").context("APPDATA not set")?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        let home = std::env::var("HOME").context("HOME not set")?;
        Ok(PathBuf::from(home).join(".config"))
    }
}
