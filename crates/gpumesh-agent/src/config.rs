//! Agent configuration, read from the `[agent]` table of `gpumesh.toml`.

use std::path::Path;
use std::time::Duration;

use gpumesh_core::ConfigError;
use gpumesh_core::duration::serde_str;
use gpumesh_registry::{Capabilities, GpuInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the coordinator, e.g. `http://10.0.0.5:8001`.
    pub server_url: String,
    /// Stable worker id. A random UUID is used when unset.
    pub worker_id: Option<String>,
    /// Address the coordinator should use to reach this worker.
    pub advertise_host: String,
    /// Port of this worker's inference server.
    pub port: u16,
    #[serde(with = "serde_str")]
    pub heartbeat_interval: Duration,
    /// Timeout for each call to the coordinator.
    #[serde(with = "serde_str")]
    pub request_timeout: Duration,
    pub gpu_info: GpuInfo,
    pub capabilities: Capabilities,
    pub loaded_models: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8001".to_string(),
            worker_id: None,
            advertise_host: "127.0.0.1".to_string(),
            port: 8000,
            heartbeat_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            gpu_info: GpuInfo::default(),
            capabilities: Capabilities::default(),
            loaded_models: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentFile {
    agent: AgentConfig,
}

impl AgentConfig {
    /// Load the `[agent]` table; every other table is ignored.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: AgentFile = toml::from_str(content)?;
        file.agent.validate()?;
        Ok(file.agent)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server_url.starts_with("http://") {
            return Err(ConfigError::Invalid {
                field: "agent.server_url",
                reason: format!("{:?} must be an http:// URL", self.server_url),
            });
        }
        if let Some(id) = self.worker_id.as_deref().filter(|id| !id.trim().is_empty()) {
            if !id.chars().all(is_path_safe) {
                return Err(ConfigError::Invalid {
                    field: "agent.worker_id",
                    reason: format!("{id:?} may only contain ASCII letters, digits, '-', '.', '_' and '~'"),
                });
            }
        }
        if self.advertise_host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "agent.advertise_host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                field: "agent.port",
                reason: "must not be zero".to_string(),
            });
        }
        if self.heartbeat_interval.is_zero() || self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "agent",
                reason: "intervals must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Configured worker id, or a fresh UUID v4.
    pub fn resolve_worker_id(&self) -> String {
        match &self.worker_id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// The id is placed in URL paths as-is, so only unreserved characters
/// are allowed.
fn is_path_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}
