//! Serve command: run the tether server in the foreground
//!
//! Settings come from the merged config files; flags override them.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tether_core::ResumePolicy;
use tether_server::TetherServer;
use tracing::info;

use crate::config::{ConfigLoader, ReaperMode, TetherConfig};

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Seconds a session may sit idle before it is expired
    #[arg(long, value_name = "SECS")]
    pub idle_ttl: Option<u64>,

    /// Seconds between reaper sweeps
    #[arg(long, value_name = "SECS")]
    pub sweep_interval: Option<u64>,

    /// Never expire idle sessions; only explicit removal drops them
    #[arg(long, conflicts_with = "idle_ttl")]
    pub never_expire: bool,

    /// What resuming does to a session: preserve or reset
    #[arg(long, value_name = "POLICY")]
    pub resume_policy: Option<ResumePolicy>,

    /// Read this config file instead of the user and project files
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let file_config = match &args.config {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => ConfigLoader::load()?,
    };
    let config = apply_overrides(file_config, &args).server_config();

    info!(
        addr = %config.addr(),
        reaper = config.reaper.name(),
        "starting tether server"
    );

    let server = TetherServer::new(config);
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    server.run().await?;
    Ok(())
}

/// Layer command-line flags over file configuration
fn apply_overrides(mut config: TetherConfig, args: &ServeArgs) -> TetherConfig {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ttl) = args.idle_ttl {
        config.reaper.mode = ReaperMode::Expiring;
        config.reaper.idle_ttl_secs = ttl;
    }
    if let Some(interval) = args.sweep_interval {
        config.reaper.sweep_interval_secs = interval;
    }
    if args.never_expire {
        config.reaper.mode = ReaperMode::Never;
    }
    if let Some(policy) = args.resume_policy {
        config.session.resume_policy = policy;
    }
    config
}
