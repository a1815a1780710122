//! gpumeshd: the gpumesh daemon.
//!
//! One binary, two roles:
//! - `serve`: the coordinator (worker registry, dispatcher, HTTP API)
//! - `agent`: the worker side, keeping a GPU box registered
//!
//! # Usage
//!
//! ```text
//! gpumeshd serve --config gpumesh.toml --port 8001
//! gpumeshd agent --server-url http://10.0.0.5:8001 --advertise-host 10.0.0.7
//! ```

mod agent_mode;
mod server;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use gpumesh_agent::AgentConfig;
use gpumesh_core::{MeshConfig, parse_duration};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,gpumesh=debug,gpumeshd=debug";

#[derive(Parser)]
#[command(name = "gpumeshd", about = "gpumesh GPU worker coordinator", version)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator.
    Serve {
        /// Path to gpumesh.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Heartbeat age after which a worker is no longer dispatched to.
        #[arg(long, value_parser = parse_duration)]
        heartbeat_timeout: Option<Duration>,

        /// Interval of the background eviction sweep.
        #[arg(long, value_parser = parse_duration)]
        sweep_interval: Option<Duration>,

        /// Bound on worker selection.
        #[arg(long, value_parser = parse_duration)]
        selection_timeout: Option<Duration>,

        /// Bound on each forward to a worker.
        #[arg(long, value_parser = parse_duration)]
        forward_timeout: Option<Duration>,
    },

    /// Run the worker agent.
    Agent {
        /// Path to gpumesh.toml (the `[agent]` table is used).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Coordinator base URL.
        #[arg(long)]
        server_url: Option<String>,

        /// Worker id; a random UUID when neither flag nor config sets one.
        #[arg(long)]
        worker_id: Option<String>,

        /// Address the coordinator should use to reach this worker.
        #[arg(long)]
        advertise_host: Option<String>,

        /// Port of the local inference server.
        #[arg(long)]
        port: Option<u16>,

        #[arg(long, value_parser = parse_duration)]
        heartbeat_interval: Option<Duration>,

        /// Loaded model to report (repeatable).
        #[arg(long = "model")]
        models: Vec<String>,
    },

    /// Print the effective coordinator configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            heartbeat_timeout,
            sweep_interval,
            selection_timeout,
            forward_timeout,
        } => {
            let mut config = load_mesh_config(config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(t) = heartbeat_timeout {
                config.registry.heartbeat_timeout = t;
            }
            if let Some(t) = sweep_interval {
                config.registry.sweep_interval = t;
            }
            if let Some(t) = selection_timeout {
                config.dispatch.selection_timeout = t;
            }
            if let Some(t) = forward_timeout {
                config.dispatch.forward_timeout = t;
            }
            config.validate()?;
            server::run_server(config).await
        }
        Command::Agent {
            config,
            server_url,
            worker_id,
            advertise_host,
            port,
            heartbeat_interval,
            models,
        } => {
            let mut config = match config {
                Some(path) => AgentConfig::from_file(&path)?,
                None => AgentConfig::default(),
            };
            if let Some(url) = server_url {
                config.server_url = url;
            }
            if worker_id.is_some() {
                config.worker_id = worker_id;
            }
            if let Some(host) = advertise_host {
                config.advertise_host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(interval) = heartbeat_interval {
                config.heartbeat_interval = interval;
            }
            if !models.is_empty() {
                config.loaded_models = models;
            }
            agent_mode::run_agent(config).await
        }
        Command::Config { config } => {
            let config = load_mesh_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_mesh_config(path: Option<&std::path::Path>) -> anyhow::Result<MeshConfig> {
    match path {
        Some(path) => Ok(MeshConfig::from_file(path)?),
        None => Ok(MeshConfig::default()),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
