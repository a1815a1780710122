//! gpumesh-agent: runs beside a worker's inference server and keeps it
//! registered with the coordinator.

pub mod agent;
pub mod config;

pub use agent::{ModelSource, WorkerAgent};
pub use config::AgentConfig;
