//! IPC Server - Unix socket front end for the asset cache
//!
//! Accepts connections, reads newline-delimited JSON commands and answers
//! each one with a single JSON line.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::asset::Compressible;
use crate::ipc::protocol::{parse_command, serialize_response, Command, Response, PROTOCOL_VERSION};
use crate::serve::handler::AssetHandler;
use crate::serve::response::{AssetRequest, BufferedResponse};

/// IPC Server that serves assets and cache controls over a Unix socket
pub struct IpcServer {
    /// Handler resolving fetch requests
    handler: Arc<AssetHandler>,
    /// Where the socket is bound
    socket_path: PathBuf,
    /// Socket listener
    listener: Option<UnixListener>,
    /// Active connections counter
    connection_count: Arc<RwLock<u32>>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(handler: Arc<AssetHandler>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            handler,
            socket_path: socket_path.into(),
            listener: None,
            connection_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Start the IPC server
    pub async fn start(&mut self) -> Result<()> {
        // Clean up any existing socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .context("Failed to remove existing socket file")?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind Unix socket {:?}", self.socket_path))?;

        info!(socket_path = %self.socket_path.display(), "IPC server started");

        self.listener = Some(listener);
        Ok(())
    }

    /// Run the server loop, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("Server not started")?;

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let handler = Arc::clone(&self.handler);
                    let connection_count = Arc::clone(&self.connection_count);

                    // Spawn a new task to handle this connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handler, connection_count).await {
                            error!(error = %e, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Stop the IPC server and clean up
    pub fn stop(&self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).context("Failed to remove socket file")?;
        }
        info!("IPC server stopped");
        Ok(())
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: UnixStream,
    handler: Arc<AssetHandler>,
    connection_count: Arc<RwLock<u32>>,
) -> Result<()> {
    {
        let mut count = connection_count.write().await;
        *count += 1;
        debug!(count = *count, "New connection");
    }

    let (reader, mut writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("Connection closed by client");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = match parse_command(trimmed.as_bytes()) {
                    Ok(command) => process_command(command, &handler).await,
                    Err(e) => {
                        error!(error = %e, command = %trimmed, "Failed to parse command");
                        Response::Error {
                            error: format!("Invalid command: {}", e),
                        }
                    }
                };

                match serialize_response(&response) {
                    Ok(json) => {
                        if let Err(e) = writer.write_all(&json).await {
                            error!(error = %e, "Failed to write response");
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to serialize response");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to read from socket");
                break;
            }
        }
    }

    {
        let mut count = connection_count.write().await;
        *count = count.saturating_sub(1);
        debug!(count = *count, "Connection ended");
    }

    Ok(())
}

/// Process a command and return a response
async fn process_command(command: Command, handler: &Arc<AssetHandler>) -> Response {
    match command {
        Command::Fetch {
            path,
            accept_encoding,
        } => {
            debug!(path = %path, "Processing fetch command");

            let request = AssetRequest {
                path,
                accept_encoding,
            };
            let handler = Arc::clone(handler);

            // Loading reads and compresses files, keep it off the async workers
            let served = tokio::task::spawn_blocking(move || {
                let mut response = BufferedResponse::new();
                handler
                    .handle(&request, &mut response)
                    .map(|_| response)
            })
            .await;

            match served {
                Ok(Ok(response)) => Response::from_buffered(response),
                Ok(Err(e)) => Response::Error {
                    error: format!("Fetch failed: {}", e),
                },
                Err(e) => Response::Error {
                    error: format!("Fetch task failed: {}", e),
                },
            }
        }

        Command::Invalidate { path } => {
            info!(path = %path, "Processing invalidate command");
            handler.cache().remove(&path);
            Response::Success {
                message: Some(format!("Invalidated {}", path)),
            }
        }

        Command::SetInterval { seconds } => {
            if seconds == 0 {
                return Response::Error {
                    error: "Interval must be positive".to_string(),
                };
            }
            info!(seconds = seconds, "Processing setInterval command");
            handler.cache().set_interval(Duration::from_secs(seconds));
            Response::Success {
                message: Some(format!("Sweeping every {}s", seconds)),
            }
        }

        Command::SetCompressible { extensions } => {
            info!(extensions = ?extensions, "Processing setCompressible command");
            let compressible = Compressible::new(&extensions);
            handler.cache().set_compressible(compressible);
            Response::Success {
                message: Some(format!("Compressing {} extension(s)", extensions.len())),
            }
        }

        Command::GetStatus => {
            debug!("Processing getStatus command");
            let cache = handler.cache();
            cache.log_metrics();
            let stats = cache.stats();
            Response::Status {
                version: PROTOCOL_VERSION,
                healthy: true,
                entries: stats.entries,
                hits: stats.hits,
                misses: stats.misses,
                sweeping: stats.sweeping,
                ttl_secs: cache.ttl().as_secs(),
                interval_secs: cache.interval().as_secs(),
                compressible: cache.compressible().extensions(),
            }
        }
    }
}
