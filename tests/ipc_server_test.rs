// Integration tests for the IPC server and client against a live daemon core

use logsink::config::SinkConfig;
use logsink::daemon::Daemon;
use logsink::error::LogSinkError;
use logsink::ipc::{Command, ErrorKind, IpcClient, IpcServer, ReadRequest, ResponseData};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Serve a daemon core on a socket inside `dir`; returns the socket path
async fn serve(dir: &TempDir) -> PathBuf {
    let socket_path = dir.path().join("logsink.sock");
    let config = SinkConfig {
        log_dir: dir.path().join("log"),
        socket_path: socket_path.clone(),
        ..SinkConfig::default()
    };
    let daemon = Arc::new(Daemon::new(config));

    let mut server = IpcServer::with_socket_path(&socket_path);
    server.start().expect("Failed to start server");

    tokio::spawn(async move {
        let _ = server
            .run(move |cmd| {
                let daemon = Arc::clone(&daemon);
                async move { daemon.handle_command(cmd).await }
            })
            .await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    socket_path
}

/// The client blocks, so it runs off the runtime threads
async fn send(socket_path: &Path, command: Command) -> logsink::ipc::Response {
    let socket_path = socket_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        IpcClient::with_socket_path(socket_path)
            .send_command(command)
            .expect("Failed to send command")
    })
    .await
    .expect("Client task panicked")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_then_read_over_socket() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = serve(&temp_dir).await;

    let response = send(
        &socket_path,
        Command::WriteBatch(vec![
            json!({"level": 30, "msg": "started"}),
            json!({"level": 50, "msg": "crashed", "err": {"status": 500}}),
        ]),
    )
    .await;
    assert_eq!(response.result, Ok(ResponseData::Written { accepted: 2 }));

    let response = send(
        &socket_path,
        Command::Read(ReadRequest {
            path: String::new(),
            level: Some("error".to_string()),
            list: false,
        }),
    )
    .await;

    match response.result {
        Ok(ResponseData::Records(records)) => {
            // Primary and status bucket both hold the error
            assert_eq!(records.len(), 2);
            assert!(records.iter().all(|r| r["msg"] == json!("crashed")));
        }
        other => panic!("Expected records, got: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listing_over_socket() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = serve(&temp_dir).await;

    send(
        &socket_path,
        Command::Write(json!({"level": 40, "msg": "slow query"})),
    )
    .await;

    let response = send(
        &socket_path,
        Command::Read(ReadRequest {
            path: String::new(),
            level: None,
            list: true,
        }),
    )
    .await;

    match response.result {
        Ok(ResponseData::Listing(entries)) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].name, "warn");
        }
        other => panic!("Expected listing, got: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_errors_over_socket() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = serve(&temp_dir).await;

    let missing = send(
        &socket_path,
        Command::Read(ReadRequest {
            path: "nope/2024-01-01.log".to_string(),
            level: None,
            list: false,
        }),
    )
    .await;
    assert_eq!(missing.result.unwrap_err().kind, ErrorKind::NotFound);

    let escape = send(
        &socket_path,
        Command::Delete {
            path: "../outside".to_string(),
        },
    )
    .await;
    assert_eq!(escape.result.unwrap_err().kind, ErrorKind::BadRequest);

    let not_object = send(&socket_path, Command::Write(json!([1, 2, 3]))).await;
    assert_eq!(not_object.result.unwrap_err().kind, ErrorKind::BadRequest);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_over_socket() {
    let temp_dir = TempDir::new().unwrap();
    let socket_path = serve(&temp_dir).await;

    let response = send(&socket_path, Command::Status).await;
    match response.result {
        Ok(ResponseData::Status {
            open_streams,
            log_dir,
            ..
        }) => {
            assert_eq!(open_streams, 0);
            assert_eq!(log_dir, temp_dir.path().join("log"));
        }
        other => panic!("Expected status, got: {:?}", other),
    }
}

#[test]
fn test_client_without_daemon() {
    let temp_dir = TempDir::new().unwrap();
    let client = IpcClient::with_socket_path(temp_dir.path().join("absent.sock"));

    let result = client.send_command(Command::Status);
    assert!(matches!(result, Err(LogSinkError::DaemonNotRunning)));
}
