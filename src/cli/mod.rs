// CLI module - User-facing command-line interface

mod output;

use crate::error::{LogSinkError, Result};
use crate::ipc::client::IpcClient;
use crate::ipc::protocol::{Command, ReadRequest};
use crate::ipc::server::DEFAULT_SOCKET_PATH;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::BufRead;
use std::path::PathBuf;

/// logsink - Day-partitioned structured log sink
#[derive(Parser)]
#[command(name = "logsink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Daemon socket to talk to
    #[arg(short, long, global = true, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route one JSON event
    Write {
        /// Event object, e.g. '{"level":30,"msg":"hello"}'
        event: String,
    },

    /// Route newline-delimited JSON events read from stdin
    Ingest,

    /// Read the most recent records of a file or directory
    Read {
        /// Path relative to the log root (empty for everything)
        #[arg(default_value = "")]
        path: String,

        /// Only show records of this level
        #[arg(short, long)]
        level: Option<String>,

        /// Print raw JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List a directory of the log tree
    Ls {
        /// Path relative to the log root
        #[arg(default_value = "")]
        path: String,
    },

    /// Delete a log file or directory
    Delete {
        /// Path relative to the log root
        path: String,
    },

    /// Delete every log
    Clear,

    /// Show daemon status
    Status,
}

impl Cli {
    /// Run the CLI application
    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute()
    }

    /// Execute the parsed command
    fn execute(&self) -> Result<()> {
        let command = self.build_command()?;

        let client = IpcClient::with_socket_path(&self.socket);
        let response = client.send_command(command)?;

        match response.result {
            Ok(data) => {
                output::print_success(&data, self.raw_json());
                Ok(())
            }
            Err(error) => {
                output::print_error(&error.message);
                Err(LogSinkError::Other(error.message))
            }
        }
    }

    fn raw_json(&self) -> bool {
        matches!(self.command, Commands::Read { json: true, .. })
    }

    /// Build an IPC command from the CLI arguments
    fn build_command(&self) -> Result<Command> {
        match &self.command {
            Commands::Write { event } => Ok(Command::Write(parse_event(event)?)),

            Commands::Ingest => {
                let stdin = std::io::stdin();
                let events = read_events(stdin.lock())?;
                Ok(Command::WriteBatch(events))
            }

            Commands::Read { path, level, .. } => Ok(Command::Read(ReadRequest {
                path: path.clone(),
                level: level.clone(),
                list: false,
            })),

            Commands::Ls { path } => Ok(Command::Read(ReadRequest {
                path: path.clone(),
                level: None,
                list: true,
            })),

            Commands::Delete { path } => Ok(Command::Delete { path: path.clone() }),

            Commands::Clear => Ok(Command::Clear),

            Commands::Status => Ok(Command::Status),
        }
    }
}

/// Parse a single event, which must be a JSON object
fn parse_event(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| LogSinkError::DeserializationError(format!("Invalid event JSON: {}", e)))?;

    if !value.is_object() {
        return Err(LogSinkError::DeserializationError(
            "Event must be a JSON object".to_string(),
        ));
    }

    Ok(value)
}

/// Collect one event per non-blank line
fn read_events<R: BufRead>(input: R) -> Result<Vec<Value>> {
    let mut events = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = parse_event(&line).map_err(|e| {
            LogSinkError::DeserializationError(format!("line {}: {}", index + 1, e))
        })?;
        events.push(event);
    }

    Ok(events)
}
