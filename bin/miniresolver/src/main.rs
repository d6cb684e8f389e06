mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use resolver_core::ServiceDirectory;
use resolver_rpc::{
    DirectoryRpc, InterceptorChain, LoggingInterceptor, PingProbe, RpcServer,
    ServerDomainInterceptor,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "miniresolver", about = "Service directory for domain routed RPC services")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "MINIRESOLVER_CONFIG", default_value = "miniresolver.toml")]
    config: PathBuf,
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("Starting miniresolver...");
    if args.config.exists() {
        info!("Loaded config from {}", args.config.display());
    } else {
        warn!("Config file {} not found, using defaults", args.config.display());
    }

    let directory = ServiceDirectory::new(config.directory_config(), Arc::new(PingProbe::default()));
    let sweeper = directory.spawn_sweeper();
    info!(
        "Service directory initialized (expiration {}s, sweep every {}s)",
        config.service_expiration, config.sweep_interval
    );

    let server = RpcServer::new()
        .add_service(DirectoryRpc::new(directory.clone()))
        .context("Failed to register directory service")?
        .with_interceptors(
            InterceptorChain::new()
                .add(ServerDomainInterceptor)
                .add(LoggingInterceptor),
        );

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let local_addr = config.local_addr.clone();
    let mut server_handle = tokio::spawn(async move {
        server.serve_on(&local_addr, server_shutdown).await
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            info!("Shutdown signal received");
        }
        result = &mut server_handle => {
            directory.close().await;
            return match result.context("RPC server task failed")? {
                Ok(()) => Ok(()),
                Err(e) => Err(e).with_context(|| format!("Cannot serve on {}", config.local_addr)),
            };
        }
    }

    shutdown.cancel();
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("RPC server error: {}", e),
        Err(e) => error!("RPC server task failed: {}", e),
    }
    directory.close().await;
    if let Err(e) = sweeper.await {
        error!("Sweeper task failed: {}", e);
    }

    info!("miniresolver stopped");
    Ok(())
}
