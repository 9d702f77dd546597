#[macro_use]
extern crate tracing;

mod auth;
mod config;
mod controller;
mod error;
mod processor;
mod queue;
mod routes;
mod storage;
mod utils;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::Server;
use tracing::level_filters::LevelFilter;

use crate::config::{LogLevel, RuntimeConfig, TemplateBackend};
use crate::controller::FaceclaimController;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[clap(version, about = "Converts faceclaim images to WebP and stores them in a bucket.")]
struct Cli {
    /// The log level filter, logs which are less important than this are dropped.
    #[clap(long, env = "LOG_LEVEL", value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the server.
    Run(ServerConfig),

    /// Writes a runtime config template for the given storage backend.
    Init {
        #[clap(short, long, value_enum, default_value = "gcs")]
        backend: TemplateBackend,

        #[clap(short, long, default_value = "config.yaml")]
        out: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
struct ServerConfig {
    /// The binding host address of the server.
    #[clap(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    #[clap(long, env = "PORT", default_value = "8000")]
    port: u16,

    /// The runtime config file selecting the storage and queue backends.
    #[clap(long, env = "CONFIG_FILE", default_value = "config.yaml")]
    config_file: PathBuf,

    /// The token every request must carry in its `Authorization` header.
    #[clap(long, env = "API_TOKEN", hide_env_values = true)]
    api_token: String,

    /// The bucket faceclaims are stored in.
    #[clap(long, env = "PCS_BUCKET")]
    pcs_bucket: String,

    /// The bucket uploaded log files are stored in.
    #[clap(long, env = "LOG_BUCKET", default_value = "inconnu-logs")]
    log_bucket: String,

    /// The project deletion topics live in.
    #[clap(long, env = "PUBSUB_PROJECT", default_value = "inconnu-357402")]
    pubsub_project: String,

    /// How long to wait on a source image before giving up, 0 waits forever.
    #[clap(long, env = "FETCH_TIMEOUT_SECS", default_value = "30")]
    fetch_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(args.log_level))
        .init();

    match args.command {
        Command::Run(cfg) => run_server(cfg).await,
        Command::Init { backend, out } => run_init(backend, &out).await,
    }
}

async fn run_init(backend: TemplateBackend, out: &Path) -> Result<()> {
    let template = RuntimeConfig::template(backend);
    tokio::fs::write(out, serde_yaml::to_string(&template)?).await?;

    info!("Wrote {:?} config template to {:?}", backend, out);
    Ok(())
}

async fn run_server(cfg: ServerConfig) -> Result<()> {
    if cfg.api_token.is_empty() {
        bail!("API_TOKEN must not be empty");
    }

    let runtime = RuntimeConfig::from_file(&cfg.config_file)
        .await
        .with_context(|| format!("failed to load config file {:?}", &cfg.config_file))?;

    let http = reqwest::Client::new();

    let images = runtime.storage.open_bucket(&cfg.pcs_bucket).await?;
    let logs = runtime.storage.open_bucket(&cfg.log_bucket).await?;
    let publisher = runtime.queue.connect(&cfg.pubsub_project, http.clone());

    let fetch_timeout = Some(cfg.fetch_timeout_secs)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    let controller = FaceclaimController::new(images, logs, publisher, http, fetch_timeout);
    let app = routes::build_app(controller, &cfg.api_token);

    let addr = format!("{}:{}", &cfg.host, cfg.port);
    info!("Serving faceclaims on http://{}", &addr);

    Server::new(TcpListener::bind(addr)).run(app).await?;

    Ok(())
}
