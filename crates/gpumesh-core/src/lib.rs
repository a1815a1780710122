//! gpumesh-core: shared building blocks for the gpumesh crates.
//!
//! - [`MeshConfig`]: the `gpumesh.toml` server/registry/dispatch sections
//! - [`duration`]: "5s"/"500ms" duration strings and their serde adapter
//! - [`HttpClient`]: pooled hyper client used for worker forwards and
//!   agent heartbeats

pub mod config;
pub mod duration;
pub mod error;
pub mod http;

pub use config::{DispatchConfig, MeshConfig, RegistryConfig, ServerConfig};
pub use duration::parse_duration;
pub use error::{ConfigError, HttpError, HttpResult};
pub use http::{HttpClient, HttpResponse};
