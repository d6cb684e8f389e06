use anyhow::{Context, Result};
use resolver_core::DirectoryConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Daemon configuration, read from TOML. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_local_addr")]
    pub local_addr: String,
    /// Seconds an address stays registered without renewal
    #[serde(default = "default_service_expiration")]
    pub service_expiration: u64,
    /// Seconds between health sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
    /// Ping new registrations right away instead of waiting for the next sweep
    #[serde(default = "default_check_new_addresses")]
    pub check_new_addresses: bool,
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_local_addr() -> String {
    "localhost:7777".to_string()
}

fn default_service_expiration() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_check_new_addresses() -> bool {
    true
}

fn default_log_level() -> String {
    "debug".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_addr: default_local_addr(),
            service_expiration: default_service_expiration(),
            sweep_interval: default_sweep_interval(),
            check_new_addresses: default_check_new_addresses(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            service_ttl: Duration::from_secs(self.service_expiration),
            sweep_interval: Duration::from_secs(self.sweep_interval.max(1)),
            check_new_addresses: self.check_new_addresses,
        }
    }
}
