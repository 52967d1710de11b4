//! Update Channel Contract Tests
//!
//! Verify the request the client sends and how each response status of the
//! update endpoint maps onto an `UpdateOutcome`, against a mock server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use dm_launch::integrity::digest_file;
use dm_launch::platform::{PlatformKey, is_executable, set_executable};
use dm_launch::update::channel::PART_SUFFIX;
use dm_launch::update::{UpdateChannelClient, UpdateOutcome};
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUILD: &[u8] = b"\x7fELF pretend dm-langserver build";

fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

fn linux_x64() -> PlatformKey {
    PlatformKey::from_rust_names("linux", "x86_64")
}

fn partial_downloads(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.to_string_lossy().ends_with(PART_SUFFIX))
        .collect()
}

/// Serve one response announcing 1000 body bytes but sending only 8. With
/// `hold_open` the connection then stalls; otherwise it is closed.
async fn truncated_body_server(hold_open: bool) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/update", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\nPARTIAL!")
            .await
            .unwrap();
        socket.flush().await.unwrap();
        if hold_open {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    });
    (url, server)
}

fn client(server: &MockServer) -> UpdateChannelClient {
    UpdateChannelClient::new(format!("{}/update", server.uri()))
}

// ────────────────────────────────────────────────────────────────────────────
// Request format
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_download_identifies_platform_without_hash() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/update"))
        .and(query_param("platform", "linux"))
        .and(query_param("arch", "x64"))
        .and(query_param("client_version", "1.2.3"))
        .and(query_param_is_missing("hash"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BUILD.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dm-langserver-x64-linux");
    let outcome = client(&server)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dest)
        .await;

    assert_eq!(outcome, UpdateOutcome::Updated);
    assert_eq!(std::fs::read(&dest).unwrap(), BUILD);
    assert!(is_executable(&dest));
}

#[tokio::test]
async fn current_hash_is_sent_and_unmodified_leaves_dest_alone() {
    let dir = tempfile::tempdir().unwrap();
    let cached = dir.path().join("dm-langserver-x64-linux");
    std::fs::write(&cached, BUILD).unwrap();
    let hash = digest_file(&cached).unwrap();
    let dest = dir.path().join("dm-langserver-x64-linux.update");
    std::fs::write(&dest, b"previous contents").unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/update"))
        .and(query_param("hash", md5_hex(BUILD)))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server)
        .check_and_fetch(&linux_x64(), "1.2.3", Some(&hash), &dest)
        .await;

    assert_eq!(outcome, UpdateOutcome::Unmodified);
    assert_eq!(std::fs::read(&dest).unwrap(), b"previous contents");
}

#[tokio::test]
async fn no_content_is_unmodified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("engine.update");
    let outcome = client(&server)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dest)
        .await;

    assert_eq!(outcome, UpdateOutcome::Unmodified);
    assert!(!dest.exists());
}

// ────────────────────────────────────────────────────────────────────────────
// Download verification
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn matching_digest_header_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(BUILD.to_vec())
                .insert_header("x-md5", md5_hex(BUILD).to_uppercase()),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("engine");
    let outcome = client(&server)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dest)
        .await;

    assert_eq!(outcome, UpdateOutcome::Updated);
    assert_eq!(digest_file(&dest).unwrap().as_str(), md5_hex(BUILD));
}

#[tokio::test]
async fn digest_mismatch_discards_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(BUILD[..10].to_vec())
                .insert_header("x-md5", md5_hex(BUILD)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("engine");
    let outcome = client(&server)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dest)
        .await;

    match outcome {
        UpdateOutcome::NetworkError { detail } => assert!(detail.contains("verification")),
        other => panic!("expected NetworkError, got {other:?}"),
    }
    assert!(!dest.exists(), "corrupt download must not be left behind");
    assert!(partial_downloads(dir.path()).is_empty());
}

#[tokio::test]
async fn corrupt_download_keeps_previous_staged_build() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"garbage".to_vec())
                .insert_header("x-md5", md5_hex(BUILD)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("engine.update");
    std::fs::write(&dest, BUILD).unwrap();
    set_executable(&dest).unwrap();

    let outcome = client(&server)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dest)
        .await;

    assert!(matches!(outcome, UpdateOutcome::NetworkError { .. }));
    assert_eq!(std::fs::read(&dest).unwrap(), BUILD);
    assert!(partial_downloads(dir.path()).is_empty());
}

#[tokio::test]
async fn connection_closed_mid_body_leaves_nothing_behind() {
    let (url, server) = truncated_body_server(false).await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("engine");
    let outcome = UpdateChannelClient::new(url)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dest)
        .await;
    server.await.unwrap();

    assert!(
        matches!(outcome, UpdateOutcome::NetworkError { .. }),
        "got {outcome:?}"
    );
    assert!(!dest.exists());
    assert!(partial_downloads(dir.path()).is_empty());
}

#[tokio::test]
async fn interrupted_download_never_replaces_staged_build() {
    let (url, server) = truncated_body_server(true).await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dm-langserver-x64-linux.update");
    std::fs::write(&dest, BUILD).unwrap();
    set_executable(&dest).unwrap();

    let fetch = {
        let dest = dest.clone();
        tokio::spawn(async move {
            UpdateChannelClient::new(url)
                .check_and_fetch(&linux_x64(), "1.2.3", None, &dest)
                .await
        })
    };

    // Wait until the body has started arriving.
    let mut started = false;
    for _ in 0..100 {
        if !partial_downloads(dir.path()).is_empty() {
            started = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(started, "download never started");
    assert_eq!(std::fs::read(&dest).unwrap(), BUILD);
    #[cfg(unix)]
    for part in partial_downloads(dir.path()) {
        assert!(!is_executable(&part), "{} is executable", part.display());
    }

    fetch.abort();
    assert!(fetch.await.unwrap_err().is_cancelled());
    server.abort();

    assert_eq!(std::fs::read(&dest).unwrap(), BUILD);
    assert!(is_executable(&dest));
    assert!(partial_downloads(dir.path()).is_empty());
}

#[tokio::test]
async fn download_creates_missing_parent_directories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BUILD.to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("cache").join("dm-langserver").join("engine");
    let outcome = client(&server)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dest)
        .await;

    assert_eq!(outcome, UpdateOutcome::Updated);
    assert!(dest.is_file());
}

// ────────────────────────────────────────────────────────────────────────────
// Status mapping
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn not_found_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let outcome = client(&server)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dir.path().join("engine"))
        .await;

    assert_eq!(
        outcome,
        UpdateOutcome::Unavailable {
            reason: "no build for this platform/arch".to_owned()
        }
    );
}

#[tokio::test]
async fn gone_is_channel_removed_with_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(410).set_body_string("Use the marketplace build.\n"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let outcome = client(&server)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dir.path().join("engine"))
        .await;

    assert_eq!(
        outcome,
        UpdateOutcome::ChannelRemoved {
            detail: "Use the marketplace build.".to_owned()
        }
    );
    assert!(outcome.disables_auto_update());
}

#[tokio::test]
async fn unexpected_status_is_network_error_with_reason() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let outcome = client(&server)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dir.path().join("engine"))
        .await;

    assert_eq!(
        outcome,
        UpdateOutcome::NetworkError {
            detail: "503 Service Unavailable".to_owned()
        }
    );
}

#[tokio::test]
async fn transport_failure_is_network_error() {
    // Bind and release a port so nothing is listening on it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/update", listener.local_addr().unwrap());
    drop(listener);

    let dir = tempfile::tempdir().unwrap();
    let outcome = UpdateChannelClient::new(url)
        .check_and_fetch(&linux_x64(), "1.2.3", None, &dir.path().join("engine"))
        .await;

    assert!(
        matches!(outcome, UpdateOutcome::NetworkError { .. }),
        "got {outcome:?}"
    );
}
