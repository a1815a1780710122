//! Worker records as reported by the workers themselves.
//!
//! Field names follow the wire format the workers speak (`client_id`,
//! `ip_address`, `gpu_info`, ...). Everything except the identity and
//! address is optional on the wire and defaults when absent.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Unique identifier chosen by a worker at startup.
pub type WorkerId = String;

// ── Status ─────────────────────────────────────────────────────────

/// Self-reported worker status.
///
/// Advisory only: heartbeat age decides whether a worker can receive
/// work. Older workers report `online`, `offline` or `error`, which map
/// onto the current variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[default]
    #[serde(alias = "online")]
    Active,
    Busy,
    #[serde(alias = "offline", alias = "error")]
    Inactive,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerStatus::Active => "active",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Inactive => "inactive",
        };
        f.write_str(s)
    }
}

// ── Capabilities ───────────────────────────────────────────────────

/// Accelerator description. Memory figures are in GB and may be stale
/// between heartbeats.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GpuInfo {
    pub device_name: String,
    pub total_memory: f64,
    pub allocated_memory: f64,
    pub reserved_memory: f64,
    pub free_memory: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuda_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_capability: Option<String>,
}

impl GpuInfo {
    /// A named device with some memory. CPU-only workers report
    /// `total_memory == 0`.
    pub fn is_present(&self) -> bool {
        !self.device_name.trim().is_empty() && self.total_memory > 0.0
    }
}

/// What a worker says it can serve.
///
/// Keys this type does not model are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Capabilities {
    pub supported_models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_resolution: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Worker ─────────────────────────────────────────────────────────

/// A registered compute worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    #[serde(rename = "client_id", alias = "id")]
    pub id: WorkerId,
    /// Host, or `host:port` when the worker embeds the port.
    pub ip_address: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub gpu_info: GpuInfo,
    #[serde(default)]
    pub loaded_models: Vec<String>,
    #[serde(default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default)]
    pub status: WorkerStatus,
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl Worker {
    /// Minimal record: identity and address, everything else defaulted.
    pub fn new(id: impl Into<WorkerId>, ip_address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            ip_address: ip_address.into(),
            port,
            gpu_info: GpuInfo::default(),
            loaded_models: Vec::new(),
            last_heartbeat: Utc::now(),
            status: WorkerStatus::Active,
            capabilities: Capabilities::default(),
        }
    }

    /// Check the fields dispatch depends on.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.id.trim().is_empty() {
            return Err(RegistryError::InvalidRecord("client_id must not be empty".to_string()));
        }
        if self.ip_address.trim().is_empty() {
            return Err(RegistryError::InvalidRecord(format!(
                "worker {} has an empty ip_address",
                self.id
            )));
        }
        if self.port == 0 && embedded_port(strip_scheme(&self.ip_address)).is_none() {
            return Err(RegistryError::InvalidRecord(format!(
                "worker {} has no port",
                self.id
            )));
        }
        Ok(())
    }

    /// `host:port` the worker's inference server listens on.
    pub fn endpoint(&self) -> String {
        let host = strip_scheme(&self.ip_address);
        if host.parse::<SocketAddr>().is_ok() {
            return host.to_string();
        }
        if let Ok(v6) = host.parse::<Ipv6Addr>() {
            return format!("[{v6}]:{}", self.port);
        }
        if embedded_port(host).is_some() {
            return host.to_string();
        }
        format!("{host}:{}", self.port)
    }

    /// URL of the worker's `/predict` endpoint.
    pub fn predict_url(&self) -> String {
        format!("http://{}/predict", self.endpoint())
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.loaded_models.iter().any(|m| m == model)
    }

    /// Return a copy with every field present in `update` applied.
    pub fn merged(&self, update: &WorkerUpdate) -> Worker {
        let mut next = self.clone();
        if let Some(ref ip) = update.ip_address {
            next.ip_address = ip.clone();
        }
        if let Some(port) = update.port {
            next.port = port;
        }
        if let Some(ref gpu) = update.gpu_info {
            next.gpu_info = gpu.clone();
        }
        if let Some(ref models) = update.loaded_models {
            next.loaded_models = models.clone();
        }
        if let Some(ts) = update.last_heartbeat {
            next.last_heartbeat = ts;
        }
        if let Some(status) = update.status {
            next.status = status;
        }
        if let Some(ref caps) = update.capabilities {
            next.capabilities = caps.clone();
        }
        next
    }
}

fn strip_scheme(address: &str) -> &str {
    let address = address.trim();
    let address = address.strip_prefix("http://").unwrap_or(address);
    address.trim_end_matches('/')
}

/// Port suffix of a `host:port` string (not a bare IPv6 address).
fn embedded_port(host: &str) -> Option<u16> {
    if host.parse::<Ipv6Addr>().is_ok() {
        return None;
    }
    let (_, port) = host.rsplit_once(':')?;
    port.parse().ok()
}

// ── Heartbeat update ───────────────────────────────────────────────

/// Sparse field set carried by a heartbeat. Absent fields keep their
/// stored values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_info: Option<GpuInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_models: Option<Vec<String>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "timestamp::deserialize_option"
    )]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

/// Defaults used when a heartbeat arrives for an unknown worker.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext {
    /// Address the heartbeat came from.
    pub source_ip: IpAddr,
    /// Port assumed when the update carries none.
    pub default_port: u16,
}

impl WorkerUpdate {
    /// Build a full record for `id` from this update, filling gaps from
    /// the request context.
    pub fn into_worker(self, id: &str, ctx: &UpdateContext) -> Worker {
        Worker {
            id: id.to_string(),
            ip_address: self.ip_address.unwrap_or_else(|| ctx.source_ip.to_string()),
            port: self.port.unwrap_or(ctx.default_port),
            gpu_info: self.gpu_info.unwrap_or_default(),
            loaded_models: self.loaded_models.unwrap_or_default(),
            last_heartbeat: self.last_heartbeat.unwrap_or_else(Utc::now),
            status: self.status.unwrap_or_default(),
            capabilities: self.capabilities.unwrap_or_default(),
        }
    }
}

/// Timestamp parsing: RFC 3339, or a naive ISO-8601 timestamp read as UTC.
///
/// Parsed values are informational. The coordinator stamps receipt time
/// on every registration and heartbeat it accepts.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
            None => Ok(None),
        }
    }
}
