// Output formatting and display for CLI

use crate::ipc::protocol::ResponseData;
use crate::logs::Level;
use crate::service::{DirEntry, EntryKind};
use colored::*;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print a success response to stdout
pub fn print_success(data: &ResponseData, raw_json: bool) {
    match data {
        ResponseData::Written { accepted } => {
            println!(
                "{}",
                format!("✓ {} event(s) accepted", accepted).green().bold()
            );
        }

        ResponseData::Records(records) => {
            if raw_json {
                for record in records {
                    println!("{}", record);
                }
            } else {
                print_records(records);
            }
        }

        ResponseData::Listing(entries) => {
            if entries.is_empty() {
                println!("{}", "Directory is empty".yellow());
            } else {
                print_listing(entries);
            }
        }

        ResponseData::Deleted { path } => {
            println!("{}", format!("✓ Deleted {}", path).green().bold());
        }

        ResponseData::Cleared => {
            println!("{}", "✓ All logs deleted".green().bold());
        }

        ResponseData::Status {
            uptime,
            open_streams,
            log_dir,
        } => print_status(uptime, *open_streams, log_dir),
    }
}

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

fn print_status(uptime: &Duration, open_streams: usize, log_dir: &Path) {
    println!("{}", "✓ Daemon is running".green().bold());
    println!("  {:<14} {}", "Uptime:".bold(), format_duration(uptime));
    println!("  {:<14} {}", "Open streams:".bold(), open_streams);
    println!("  {:<14} {}", "Log dir:".bold(), log_dir.display());
}

/// Print records oldest last, one line each
fn print_records(records: &[Value]) {
    if records.is_empty() {
        println!("{}", "No records".yellow());
        return;
    }

    for record in records {
        let time = record
            .get("time")
            .and_then(Value::as_str)
            .map(short_time)
            .unwrap_or_default();
        let level = record_level(record);
        let msg = record.get("msg").and_then(Value::as_str).unwrap_or("");

        println!(
            "{} {} {}",
            format!("[{}]", time).dimmed(),
            format_level_colored(&level),
            msg
        );
    }

    println!(
        "{}",
        format!("{} record(s)", records.len()).dimmed().italic()
    );
}

/// Level name of a record, numeric levels mapped to their names
fn record_level(record: &Value) -> String {
    match record.get("level") {
        Some(Value::String(name)) => name.clone(),
        Some(other) => Level::from_value(other)
            .map(|level| level.as_str().to_string())
            .unwrap_or_else(|| other.to_string()),
        None => "-".to_string(),
    }
}

/// `2024-01-01T12:30:00.123+01:00` → `2024-01-01 12:30:00`
fn short_time(time: &str) -> String {
    time.get(..19).unwrap_or(time).replacen('T', " ", 1)
}

/// Format a level name with color coding
fn format_level_colored(level: &str) -> String {
    let padded = format!("{:<5}", level.to_uppercase());
    match level.to_lowercase().as_str() {
        "fatal" => padded.red().bold().to_string(),
        "error" => padded.red().to_string(),
        "warn" => padded.yellow().to_string(),
        "info" => padded.green().to_string(),
        "debug" | "trace" => padded.bright_black().to_string(),
        _ => padded,
    }
}

/// Print a formatted table of directory entries
fn print_listing(entries: &[DirEntry]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "Size")]
        size: String,
        #[tabled(rename = "Path")]
        path: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|entry| EntryRow {
            name: truncate(&entry.name, 32),
            kind: match entry.kind {
                EntryKind::Dir => "dir".cyan().to_string(),
                EntryKind::File => "file".to_string(),
            },
            size: match entry.kind {
                EntryKind::Dir => "-".to_string(),
                EntryKind::File => format_size(entry.size),
            },
            path: entry.path.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
    println!(
        "{}",
        format!("Total: {} entr(ies)", entries.len()).dimmed().italic()
    );
}

/// Format a duration in human-readable format
fn format_duration(duration: &Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        let secs = secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else if secs < 86400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}

/// Format a file size in human-readable format
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{}B", bytes)
    } else if bytes < MB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    }
}

/// Truncate a string to a maximum number of characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
