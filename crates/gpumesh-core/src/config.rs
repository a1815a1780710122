//! gpumesh.toml configuration parser.
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below. Durations are written as strings ("30s", "500ms").

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::serde_str;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Heartbeat age at which a worker stops being eligible for dispatch.
    #[serde(with = "serde_str")]
    pub heartbeat_timeout: Duration,
    /// Period of the background eviction sweep.
    #[serde(with = "serde_str")]
    pub sweep_interval: Duration,
    /// Port assumed for a worker that self-registers through a heartbeat
    /// without reporting one.
    pub default_worker_port: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(15),
            default_worker_port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    #[serde(with = "serde_str")]
    pub selection_timeout: Duration,
    #[serde(with = "serde_str")]
    pub forward_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            selection_timeout: Duration::from_secs(2),
            forward_timeout: Duration::from_secs(120),
        }
    }
}

impl MeshConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: MeshConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that would make the service unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.heartbeat_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "registry.heartbeat_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.registry.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "registry.sweep_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.dispatch.selection_timeout.is_zero() || self.dispatch.forward_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "dispatch",
                reason: "timeouts must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
