//! Layered runtime configuration
//!
//! Sources are merged in order, later ones winning: built-in defaults, an
//! optional TOML/YAML/JSON file, then `ETHOSCAN__`-prefixed environment
//! variables (`ETHOSCAN__WAIT__TIMEOUT_MS=5000`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use ethoscan_core_types::SiteId;
use serde::{Deserialize, Serialize};

use crate::errors::{EthoscanError, Result};

pub const ENV_PREFIX: &str = "ETHOSCAN";

/// Per-explorer enable flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerSettings {
    pub etherscan: bool,
    pub blockscout: bool,
    pub debank: bool,
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            etherscan: true,
            blockscout: true,
            debank: true,
        }
    }
}

impl ExplorerSettings {
    /// Unrecognised sites have no switch and are always enabled.
    pub fn is_enabled(&self, site: &SiteId) -> bool {
        match site {
            SiteId::Etherscan => self.etherscan,
            SiteId::Blockscout => self.blockscout,
            SiteId::Debank => self.debank,
            SiteId::Other(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    pub timeout_ms: u64,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self { timeout_ms: 3000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { backoff_ms: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthoscanConfig {
    pub explorers: ExplorerSettings,
    pub wait: WaitSettings,
    pub retry: RetrySettings,
    pub monitor: MonitorSettings,
    pub log_level: String,
}

impl Default for EthoscanConfig {
    fn default() -> Self {
        Self {
            explorers: ExplorerSettings::default(),
            wait: WaitSettings::default(),
            retry: RetrySettings::default(),
            monitor: MonitorSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl EthoscanConfig {
    /// Reject settings that would make waits or polling degenerate.
    pub fn validate(&self) -> Result<()> {
        if self.wait.timeout_ms == 0 {
            return Err(EthoscanError::invalid_setting(
                "wait.timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(EthoscanError::invalid_setting(
                "monitor.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.log_level.trim().is_empty() {
            return Err(EthoscanError::invalid_setting("log_level", "must not be empty"));
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry.backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms)
    }
}

/// Builder over the `config` crate sources
#[derive(Debug, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    required: bool,
    env: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `path`; the format is inferred from its extension.
    pub fn with_file(mut self, path: impl AsRef<Path>, required: bool) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self.required = required;
        self
    }

    /// Use `vars` instead of the process environment.
    pub fn with_env_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    pub fn load(self) -> Result<EthoscanConfig> {
        let mut builder = Config::builder();
        if let Some(path) = &self.file {
            builder = builder.add_source(File::from(path.as_path()).required(self.required));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(self.env),
        );

        let config: EthoscanConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::new().with_env_vars(no_env()).load().unwrap();
        assert_eq!(config, EthoscanConfig::default());
        assert_eq!(config.wait_timeout(), Duration::from_millis(3000));
        assert_eq!(config.retry_backoff(), Duration::from_millis(500));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.explorers.is_enabled(&SiteId::Debank));
    }

    #[test]
    fn test_file_then_env_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "log_level = \"debug\"\n[wait]\ntimeout_ms = 1500\n[explorers]\ndebank = false"
        )
        .unwrap();

        let env = HashMap::from([(
            "ETHOSCAN__WAIT__TIMEOUT_MS".to_string(),
            "2500".to_string(),
        )]);
        let config = ConfigLoader::new()
            .with_file(file.path(), true)
            .with_env_vars(env)
            .load()
            .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.wait.timeout_ms, 2500);
        assert!(!config.explorers.is_enabled(&SiteId::Debank));
        assert!(config.explorers.is_enabled(&SiteId::Etherscan));
        assert!(config.explorers.is_enabled(&SiteId::parse("other.io")));
    }

    #[test]
    fn test_missing_optional_file_uses_defaults() {
        let config = ConfigLoader::new()
            .with_file("does/not/exist.toml", false)
            .with_env_vars(no_env())
            .load()
            .unwrap();
        assert_eq!(config.monitor.poll_interval_ms, 1000);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let env = HashMap::from([(
            "ETHOSCAN__WAIT__TIMEOUT_MS".to_string(),
            "0".to_string(),
        )]);
        let err = ConfigLoader::new().with_env_vars(env).load().unwrap_err();
        assert!(matches!(
            err,
            EthoscanError::InvalidSetting {
                field: "wait.timeout_ms",
                ..
            }
        ));
    }
}
