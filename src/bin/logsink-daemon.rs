use clap::Parser;
use logsink::config::SinkConfig;
use logsink::daemon::Daemon;
use logsink::logs::{spawn_ingest, SinkLayer};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// logsink daemon - routes structured events into day-partitioned files
#[derive(Parser)]
#[command(name = "logsink-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of the log tree, overrides the configuration
    #[arg(short, long)]
    log_dir: Option<PathBuf>,

    /// Socket to listen on, overrides the configuration
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Also route newline-delimited JSON events read from stdin
    #[arg(long)]
    stdin: bool,
}

fn load_config(args: &Args) -> logsink::error::Result<SinkConfig> {
    let mut config = match &args.config {
        Some(path) => SinkConfig::from_file(path)?,
        None => SinkConfig::default(),
    };

    if let Some(log_dir) = &args.log_dir {
        config.log_dir = log_dir.clone();
    }
    if let Some(socket) = &args.socket {
        config.socket_path = socket.clone();
    }

    config.validate()?;
    Ok(config)
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

#[tokio::main]
async fn main() -> logsink::error::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let daemon = Daemon::new(config);

    // The daemon's own diagnostics go to stderr and into the sink itself
    let (sender, _ingest_handle) = spawn_ingest(daemon.router().clone());
    let filter = daemon.config().log_filter.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter(&filter)),
        )
        .with(SinkLayer::new(sender).with_filter(env_filter(&filter)))
        .init();

    daemon.start(args.stdin).await
}
