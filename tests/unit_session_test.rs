// tests/unit_session_test.rs

mod common;

use common::MemoryTransport;
use tempfile::TempDir;
use topicmirror::MirrorError;
use topicmirror::core::upstream::session::{ClientSession, SessionRole};
use topicmirror::core::upstream::transport::{UpstreamError, UpstreamErrorKind};

#[tokio::test]
async fn test_clean_connect_reports_no_heal() {
    let transport = MemoryTransport::new();
    let session = ClientSession::new(SessionRole::Reader, transport);
    assert!(!session.ensure_connected().await.unwrap());
}

#[tokio::test]
async fn test_corrupt_session_store_is_rebuilt_in_place() {
    let dir = TempDir::new().unwrap();
    let session_file = dir.path().join("reader.session");
    for suffix in ["", "-journal", "-wal", "-shm"] {
        std::fs::write(
            dir.path().join(format!("reader.session{suffix}")),
            b"garbage",
        )
        .unwrap();
    }

    let transport = MemoryTransport::new();
    transport.set_session_path(session_file.clone());
    transport.push_connect_error(UpstreamError::new(
        UpstreamErrorKind::SessionStorage,
        "no such table: sessions",
    ));

    let session = ClientSession::new(SessionRole::Reader, transport);
    // Healed: the corrupt store and its siblings are gone, reconnect worked.
    assert!(session.ensure_connected().await.unwrap());
    for suffix in ["", "-journal", "-wal", "-shm"] {
        assert!(!dir.path().join(format!("reader.session{suffix}")).exists());
    }

    // The next connect is clean.
    assert!(!session.ensure_connected().await.unwrap());
}

#[tokio::test]
async fn test_corruption_is_detected_from_error_text() {
    let dir = TempDir::new().unwrap();
    let session_file = dir.path().join("writer.session");
    std::fs::write(&session_file, b"garbage").unwrap();

    let transport = MemoryTransport::new();
    transport.set_session_path(session_file.clone());
    // A generic error kind whose text carries the corruption shape.
    transport.push_connect_error(UpstreamError::other("file is not a database"));

    let session = ClientSession::new(SessionRole::Writer, transport);
    assert!(session.ensure_connected().await.unwrap());
    assert!(!session_file.exists());
}

#[tokio::test]
async fn test_other_connect_errors_propagate() {
    let transport = MemoryTransport::new();
    transport.push_connect_error(UpstreamError::new(
        UpstreamErrorKind::Network,
        "connection refused",
    ));

    let session = ClientSession::new(SessionRole::Reader, transport);
    assert!(matches!(
        session.ensure_connected().await,
        Err(MirrorError::Upstream(_))
    ));
}

#[tokio::test]
async fn test_corruption_without_session_store_is_surfaced() {
    let transport = MemoryTransport::new();
    transport.push_connect_error(UpstreamError::new(
        UpstreamErrorKind::SessionStorage,
        "malformed",
    ));

    let session = ClientSession::new(SessionRole::Reader, transport);
    assert!(matches!(
        session.ensure_connected().await,
        Err(MirrorError::SessionCorrupt(_))
    ));
}
