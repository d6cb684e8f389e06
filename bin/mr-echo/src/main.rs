mod echo;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use echo::{Echo, EchoReply, EchoRequest, SAY, SERVICE_NAME};
use resolver_client::{MiniResolver, PollerConfig, RegistrarConfig, ResolveMode};
use resolver_rpc::{
    InterceptorChain, LoggingInterceptor, RpcServer, RpcTransport, ServerDomainInterceptor,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mr-echo", about = "Echo service registered with miniresolver")]
struct Cli {
    /// Directory address
    #[arg(long, global = true, env = "MINIRESOLVER_ADDR", default_value = "localhost:7777")]
    directory: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the echo service and keep it registered
    Serve(ServeArgs),
    /// Call the echo service through the directory
    Call(CallArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0:0")]
    listen: String,
    /// Host to register; defaults to the address the directory sees
    #[arg(long)]
    host: Option<String>,
    /// Domains to register under, repeatable
    #[arg(long = "domain")]
    domains: Vec<String>,
    /// Replace other instances instead of joining them
    #[arg(long)]
    single: bool,
}

#[derive(Args, Debug)]
struct CallArgs {
    #[arg(long, default_value = "")]
    domain: String,
    #[arg(long, default_value = "hello")]
    message: String,
    #[arg(long, default_value_t = 1)]
    count: u32,
    /// Seconds between calls
    #[arg(long, default_value_t = 1)]
    interval: u64,
    /// Spread calls across every registered instance
    #[arg(long)]
    all: bool,
    /// Fixed address for a qualified name, `name=host:port`, repeatable
    #[arg(long = "map", value_parser = parse_mapping)]
    client_map: Vec<(String, String)>,
}

fn parse_mapping(value: &str) -> Result<(String, String)> {
    let (name, address) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("expected name=host:port, got '{}'", value))?;
    if name.is_empty() || address.is_empty() {
        return Err(anyhow!("expected name=host:port, got '{}'", value));
    }
    Ok((name.to_string(), address.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(&cli.directory, args).await,
        Command::Call(args) => call(&cli.directory, args).await,
    }
}

async fn serve(directory: &str, args: ServeArgs) -> Result<()> {
    let listener = TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", args.listen))?;
    let local_addr = listener.local_addr()?;
    info!("Echo service listening on {}", local_addr);

    let server = RpcServer::new()
        .add_service(Echo::new(local_addr.to_string()))
        .context("Failed to register echo service")?
        .with_interceptors(
            InterceptorChain::new()
                .add(ServerDomainInterceptor)
                .add(LoggingInterceptor),
        );

    let resolver = MiniResolver::new(
        Some(directory),
        HashMap::new(),
        RpcTransport::default(),
        PollerConfig::default(),
    );
    resolver.ping().await.context("Directory is not reachable")?;

    let mut registration = RegistrarConfig::new(server.service_names(), local_addr.port())
        .with_domains(args.domains)
        .with_single(args.single);
    if let Some(host) = args.host {
        registration = registration.with_host(host);
    }
    let registrar = resolver.registrar(registration)?;

    let shutdown = CancellationToken::new();
    let registration_handle = registrar.spawn(shutdown.clone());
    let server_handle = tokio::spawn(server.serve(listener, shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Shutdown signal received");
    shutdown.cancel();

    if let Err(e) = registration_handle.await {
        error!("Registration task failed: {}", e);
    }
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Echo server error: {}", e),
        Err(e) => error!("Echo server task failed: {}", e),
    }
    resolver.close().await;
    Ok(())
}

async fn call(directory: &str, args: CallArgs) -> Result<()> {
    let poller_config = PollerConfig {
        mode: if args.all {
            ResolveMode::All
        } else {
            ResolveMode::Single
        },
        ..PollerConfig::default()
    };
    let resolver = MiniResolver::new(
        Some(directory),
        args.client_map.into_iter().collect(),
        RpcTransport::default(),
        poller_config,
    );
    let channel = resolver.channel(SERVICE_NAME, &args.domain).await?;

    let mut failures = 0;
    for round in 0..args.count {
        if round > 0 {
            tokio::time::sleep(Duration::from_secs(args.interval)).await;
        }
        let request = EchoRequest {
            message: args.message.clone(),
        };
        match channel.call::<_, EchoReply>(SAY, &request).await {
            Ok(reply) => info!(
                "Reply '{}' via domain '{}' from {}",
                reply.message, reply.domain, reply.served_by
            ),
            Err(status) => {
                failures += 1;
                error!("Call failed: {}", status);
            }
        }
    }

    resolver.close().await;
    if failures == args.count {
        return Err(anyhow!("every call to {} failed", channel.target()));
    }
    Ok(())
}
