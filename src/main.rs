//! assetd - in-memory static asset cache daemon
//!
//! Serves files under a root directory from a time-expiring cache holding
//! raw and gzip representations with SHA-256 ETags.

mod asset;
mod cache;
mod config;
mod ipc;
mod serve;

use anyhow::{anyhow, Result};
use std::env;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use cache::AssetCache;
use config::DaemonConfig;
use ipc::IpcServer;
use serve::{AssetHandler, AssetRequest, BufferedResponse, StatusPage};

/// CLI command
#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Run IPC server mode (default)
    Server,
    /// Fetch a single asset and print the response (CLI mode)
    Get { path: String, gzip: bool },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"assetd - Serve static files from an in-memory, expiring cache

USAGE:
    assetd                      # Run IPC server (default)
    assetd get <path> [--gzip]
    assetd help

COMMANDS:
    (none)  Run IPC server mode (waits for fetch/control commands)
    get     Fetch one asset and print its status, headers and size
    help    Show this help message

EXAMPLES:
    # Serve ./public over /tmp/assetd.sock
    ASSETD_ROOT=./public assetd

    # Check what a gzip-capable client would receive for /
    ASSETD_ROOT=./public assetd get / --gzip

ENVIRONMENT:
    ASSETD_ROOT            Directory to serve (default: .)
    ASSETD_TTL_SECS        Maximum age of a cached asset (default: 300)
    ASSETD_SWEEP_SECS      Seconds between expiry sweeps (default: 60)
    ASSETD_SOCKET          IPC socket path (default: /tmp/assetd.sock)
    ASSETD_CACHE_CONTROL   Cache-Control value for served assets (default: unset)
    ASSETD_COMPRESSIBLE    Comma-separated extensions to gzip, "" for none
                           (default: .txt,.html,.css,.js,.json,.md,.svg,...)
    RUST_LOG               Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args(args: &[String]) -> Result<Command> {
    if args.len() < 2 {
        return Ok(Command::Server);
    }

    match args[1].as_str() {
        "get" => {
            let path = args
                .get(2)
                .ok_or_else(|| anyhow!("Usage: assetd get <path> [--gzip]"))?
                .clone();
            let gzip = match args.get(3).map(String::as_str) {
                None => false,
                Some("--gzip") => true,
                Some(other) => return Err(anyhow!("Unknown option: {}", other)),
            };
            Ok(Command::Get { path, gzip })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

fn build_handler(config: &DaemonConfig, cache: Arc<AssetCache>) -> AssetHandler {
    let handler = AssetHandler::new(cache).with_error_handler(Arc::new(StatusPage));
    match &config.cache_control {
        Some(value) => handler.with_cache_control(value.clone()),
        None => handler,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let args: Vec<String> = env::args().collect();
    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    match command {
        Command::Server => run_server().await?,
        Command::Get { path, gzip } => run_get(path, gzip).await?,
        Command::Help => print_help(),
    }

    Ok(())
}

/// Build the cache and handler from the environment
fn start_cache() -> Result<(DaemonConfig, Arc<AssetCache>, Arc<AssetHandler>)> {
    let config = DaemonConfig::from_env()?;
    let cache = Arc::new(AssetCache::new(config.cache_options())?);
    let handler = Arc::new(build_handler(&config, Arc::clone(&cache)));
    Ok((config, cache, handler))
}

async fn run_server() -> Result<()> {
    let (config, cache, handler) = start_cache()?;
    info!(root = %cache.root().display(), "Starting assetd in IPC server mode");

    let mut ipc_server = IpcServer::new(handler, config.socket_path.clone());
    if let Err(e) = ipc_server.start().await {
        error!(error = %e, "Failed to start IPC server");
        return Err(e);
    }

    info!("Daemon ready. Waiting for commands...");

    // Run IPC server in a separate task
    let ipc_server = Arc::new(ipc_server);
    let running = Arc::clone(&ipc_server);
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = running.run().await {
            error!(error = %e, "IPC server error");
        }
    });

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;

    info!("Received shutdown signal, closing asset cache...");
    ipc_handle.abort();
    cache.log_metrics();
    cache.close();
    if let Err(e) = ipc_server.stop() {
        error!(error = %e, "Failed to clean up IPC socket");
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn run_get(path: String, gzip: bool) -> Result<()> {
    let (_, cache, handler) = start_cache()?;

    let mut request = AssetRequest::new(path);
    if gzip {
        request = request.with_accept_encoding("gzip");
    }

    let response = tokio::task::spawn_blocking(move || {
        let mut response = BufferedResponse::new();
        handler.handle(&request, &mut response).map(|_| response)
    })
    .await??;

    println!("status: {}", response.status);
    for (name, value) in &response.headers {
        println!("{}: {}", name, value);
    }
    println!("body: {} bytes", response.content_length);

    cache.close();
    Ok(())
}
