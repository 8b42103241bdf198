// Integration tests for the IPC protocol wire format

use logsink::error::LogSinkError;
use logsink::ipc::{
    Command, ErrorKind, ErrorResponse, ReadRequest, Request, Response, ResponseData,
};
use logsink::service::{DirEntry, EntryKind};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_request_round_trip() {
    let commands = vec![
        Command::Write(json!({"level": 30, "msg": "hello"})),
        Command::WriteBatch(vec![json!({"msg": "a"}), json!({"msg": "b"})]),
        Command::Read(ReadRequest {
            path: "error".to_string(),
            level: Some("error".to_string()),
            list: false,
        }),
        Command::Delete {
            path: "info/2024-01-01.log".to_string(),
        },
        Command::Clear,
        Command::Status,
    ];

    for (id, command) in commands.into_iter().enumerate() {
        let request = Request::new(id as u64, command);
        let line = serde_json::to_string(&request).unwrap();
        assert!(!line.contains('\n'));
        let decoded: Request = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded, request);
    }
}

#[test]
fn test_response_round_trip() {
    let responses = vec![
        Response::success(1, ResponseData::Written { accepted: 3 }),
        Response::success(2, ResponseData::Records(vec![json!({"msg": "x"})])),
        Response::success(
            3,
            ResponseData::Listing(vec![DirEntry {
                name: "error".to_string(),
                kind: EntryKind::Dir,
                size: 0,
                path: "error".to_string(),
            }]),
        ),
        Response::success(
            4,
            ResponseData::Status {
                uptime: Duration::from_secs(42),
                open_streams: 2,
                log_dir: PathBuf::from("/var/log/sink"),
            },
        ),
        Response::error(5, LogSinkError::NotFound("nope.log".to_string())),
    ];

    for response in responses {
        let line = serde_json::to_string(&response).unwrap();
        let decoded: Response = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded, response);
    }
}

#[test]
fn test_error_kinds() {
    let not_found: ErrorResponse = LogSinkError::NotFound("x".to_string()).into();
    assert_eq!(not_found.kind, ErrorKind::NotFound);

    let bad_path: ErrorResponse = LogSinkError::InvalidPath("../x".to_string()).into();
    assert_eq!(bad_path.kind, ErrorKind::BadRequest);

    let bad_event: ErrorResponse =
        LogSinkError::DeserializationError("not an object".to_string()).into();
    assert_eq!(bad_event.kind, ErrorKind::BadRequest);

    let unreadable: ErrorResponse = LogSinkError::DirectoryRead("log".to_string()).into();
    assert_eq!(unreadable.kind, ErrorKind::Internal);
}

#[test]
fn test_dir_entry_uses_type_field() {
    let entry = DirEntry {
        name: "2024-01-01.log".to_string(),
        kind: EntryKind::File,
        size: 120,
        path: "info/2024-01-01.log".to_string(),
    };

    assert_eq!(
        serde_json::to_value(&entry).unwrap(),
        json!({
            "name": "2024-01-01.log",
            "type": "file",
            "size": 120,
            "path": "info/2024-01-01.log"
        })
    );
}
