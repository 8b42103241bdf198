// Daemon module - Wires the router, the read service and the IPC server together

use crate::config::SinkConfig;
use crate::error::Result;
use crate::ipc::protocol::{Command, ReadRequest, ResponseData};
use crate::ipc::server::IpcServer;
use crate::logs::{spawn_sweeper, EventRouter, LogEvent, StreamCache, WindowedReader};
use crate::service::{LogService, ReadOptions, ReadResponse};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Long-running sink: owns the stream cache and serves client commands
pub struct Daemon {
    config: SinkConfig,
    router: Arc<EventRouter>,
    service: Arc<LogService>,
    start_time: Instant,
}

impl Daemon {
    /// Build every component from a validated configuration
    pub fn new(config: SinkConfig) -> Self {
        let streams = Arc::new(StreamCache::new(&config.log_dir));
        let router = Arc::new(
            EventRouter::new(Arc::clone(&streams)).with_skip_messages(config.skip_messages.clone()),
        );
        let service = Arc::new(LogService::new(
            WindowedReader::new(config.reader_settings()),
            streams,
            config.result_cache_entries,
        ));

        Self {
            config,
            router,
            service,
            start_time: Instant::now(),
        }
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn service(&self) -> &Arc<LogService> {
        &self.service
    }

    /// Handle a command from a client
    pub async fn handle_command(&self, command: Command) -> Result<ResponseData> {
        match command {
            Command::Write(value) => {
                let event = LogEvent::from_value(value)?;
                self.router.route(event).await;
                Ok(ResponseData::Written { accepted: 1 })
            }

            Command::WriteBatch(values) => {
                // Reject the whole batch before writing anything
                let events = values
                    .into_iter()
                    .map(LogEvent::from_value)
                    .collect::<Result<Vec<_>>>()?;
                let accepted = events.len();

                for event in events {
                    self.router.route(event).await;
                }

                Ok(ResponseData::Written { accepted })
            }

            Command::Read(ReadRequest { path, level, list }) => {
                let options = ReadOptions { level, list };
                match self.service.read(&path, &options).await? {
                    ReadResponse::Records(records) => Ok(ResponseData::Records(records)),
                    ReadResponse::Listing(entries) => Ok(ResponseData::Listing(entries)),
                }
            }

            Command::Delete { path } => {
                self.service.delete(&path).await?;
                Ok(ResponseData::Deleted { path })
            }

            Command::Clear => {
                self.service.clear().await?;
                Ok(ResponseData::Cleared)
            }

            Command::Status => Ok(ResponseData::Status {
                uptime: self.start_time.elapsed(),
                open_streams: self.router.cache().len().await,
                log_dir: self.config.log_dir.clone(),
            }),
        }
    }

    /// Start the daemon and run until a shutdown signal arrives
    ///
    /// With `ingest_stdin`, newline-delimited events read from stdin are
    /// routed too, and the end of stdin also shuts the daemon down.
    pub async fn start(self, ingest_stdin: bool) -> Result<()> {
        info!("Starting logsink daemon...");

        tokio::fs::create_dir_all(&self.config.log_dir).await?;

        let mut ipc_server = IpcServer::with_socket_path(&self.config.socket_path);
        ipc_server.start()?;
        info!(
            "IPC server listening on: {}",
            ipc_server.socket_path().display()
        );

        let sweeper_handle = spawn_sweeper(
            Arc::clone(self.router.cache()),
            self.config.sweep_interval(),
        );

        let daemon = Arc::new(self);

        let handler_daemon = Arc::clone(&daemon);
        let server_handle = tokio::spawn(async move {
            let result = ipc_server
                .run(move |cmd| {
                    let daemon = Arc::clone(&handler_daemon);
                    async move { daemon.handle_command(cmd).await }
                })
                .await;

            if let Err(e) = result {
                error!("IPC server error: {}", e);
            }
        });

        let stdin_done = if ingest_stdin {
            Some(Self::spawn_stdin_ingest(Arc::clone(daemon.router())))
        } else {
            None
        };

        let shutdown_signal = Self::setup_signal_handlers();

        info!("Daemon started successfully");

        match stdin_done {
            Some(stdin_done) => {
                tokio::select! {
                    _ = shutdown_signal => {}
                    _ = stdin_done => info!("Standard input closed"),
                }
            }
            None => {
                let _ = shutdown_signal.await;
            }
        }

        info!("Stopping daemon...");

        // Dropping the server task drops the listener, which removes the socket
        server_handle.abort();
        let _ = server_handle.await;
        sweeper_handle.abort();

        daemon.shutdown().await;

        Ok(())
    }

    /// Flush every open stream
    pub async fn shutdown(&self) {
        if let Err(e) = self.router.flush().await {
            error!("Failed to flush logs: {}", e);
        } else {
            info!("All logs flushed successfully");
        }

        info!("Daemon shutdown complete");
    }

    /// Route stdin lines until EOF; the receiver fires once input is exhausted
    fn spawn_stdin_ingest(router: Arc<EventRouter>) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => router.route_line(&line).await,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read standard input: {}", e);
                        break;
                    }
                }
            }

            let _ = tx.send(());
        });

        rx
    }

    /// Setup signal handlers for graceful shutdown
    fn setup_signal_handlers() -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to setup SIGTERM handler: {}", e);
                    return;
                }
            };
            let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
                Ok(sigint) => sigint,
                Err(e) => {
                    error!("Failed to setup SIGINT handler: {}", e);
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }

            let _ = tx.send(());
        });

        rx
    }
}
