//! API client tests against one-shot local HTTP fixtures
//!
//! Each fixture server answers its scripted responses in order, one
//! connection per response, then goes away. `Connection: close` keeps the
//! client from trying to reuse sockets between responses.

use osufetch_core::{ApiClient, ApiHosts, FetchError, OsufetchCore, RetryDownloader};
use osufetch_types::{Config, Credentials, FetchEvent, ScoreKind};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// A scripted response: full HTTP bytes, or `None` to drop the connection
/// without answering.
type Scripted = Option<String>;

async fn serve(responses: Vec<Scripted>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = [0u8; 8192];
            let _ = socket.read(&mut buf).await;
            if let Some(response) = response {
                let _ = socket.write_all(response.as_bytes()).await;
            }
            let _ = socket.shutdown().await;
        }
    });
    addr
}

fn json_response(body: &str) -> Scripted {
    Some(format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ))
}

fn file_response(body: &str) -> Scripted {
    Some(format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ))
}

fn token_response() -> Scripted {
    json_response(r#"{"access_token":"test-bearer","expires_in":86400}"#)
}

fn hosts_for(addr: SocketAddr) -> ApiHosts {
    ApiHosts {
        v1: format!("http://{}/api", addr),
        v2: format!("http://{}/api/v2", addr),
        oauth_token: format!("http://{}/oauth/token", addr),
        files: format!("http://{}", addr),
    }
}

fn credentials() -> Credentials {
    Credentials {
        api_key: "v1-key".to_string(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
    }
}

fn client_for(addr: SocketAddr) -> ApiClient {
    let (event_tx, _) = broadcast::channel(64);
    ApiClient::with_hosts(reqwest::Client::new(), &credentials(), hosts_for(addr), event_tx)
}

// ============================================================================
// v1 surface
// ============================================================================

#[tokio::test]
async fn user_lookup_resolves_id() {
    let addr = serve(vec![json_response(r#"[{"user_id":"12345","username":"peppy"}]"#)]).await;
    let client = client_for(addr);

    assert_eq!(client.lookup_user_id("peppy").await.unwrap(), "12345");
}

#[tokio::test]
async fn user_lookup_empty_result_is_user_not_found() {
    let addr = serve(vec![json_response("[]")]).await;
    let client = client_for(addr);

    let err = client.lookup_user_id("nonexistent_user_xyz").await.unwrap_err();
    match err {
        FetchError::UserNotFound(name) => assert_eq!(name, "nonexistent_user_xyz"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn beatmap_hash_lookup_hit_and_miss() {
    let addr = serve(vec![
        json_response(r#"[{"beatmap_id":"129891","beatmapset_id":"39804"}]"#),
        json_response("[]"),
    ])
    .await;
    let client = client_for(addr);

    assert_eq!(
        client.lookup_beatmap_by_hash("abc123").await.unwrap(),
        Some("129891".to_string())
    );
    assert_eq!(client.lookup_beatmap_by_hash("zzz").await.unwrap(), None);
}

#[tokio::test]
async fn replay_fetch_decodes_content_and_tolerates_absence() {
    // "cmVwbGF5ZGF0YQ==" is base64 for "replaydata"
    let addr = serve(vec![
        json_response(r#"{"content":"cmVwbGF5ZGF0YQ==","encoding":"base64"}"#),
        json_response(r#"{"error":"Replay not available."}"#),
    ])
    .await;
    let client = client_for(addr);

    let bytes = client.fetch_replay_bytes("111").await.unwrap().unwrap();
    assert_eq!(bytes, b"replaydata");

    assert!(client.fetch_replay_bytes("222").await.unwrap().is_none());
}

// ============================================================================
// v2 surface
// ============================================================================

#[tokio::test]
async fn user_score_with_replay_and_misses_is_returned() {
    let addr = serve(vec![
        token_response(),
        json_response(r#"[{"id":222,"replay":true,"perfect":false}]"#),
    ])
    .await;
    let client = client_for(addr);

    let score = client
        .fetch_user_score("12345", ScoreKind::Recent, 0, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(score["id"], 222);
}

#[tokio::test]
async fn perfect_score_yields_no_eligible_score() {
    let addr = serve(vec![
        token_response(),
        json_response(r#"[{"id":222,"replay":true,"perfect":true}]"#),
    ])
    .await;
    let client = client_for(addr);

    let score = client
        .fetch_user_score("12345", ScoreKind::Best, 0, false)
        .await
        .unwrap();
    assert!(score.is_none());
}

#[tokio::test]
async fn unexpected_v2_shape_degrades_to_no_score() {
    let addr = serve(vec![
        token_response(),
        json_response(r#"{"error":"temporarily unavailable"}"#),
    ])
    .await;
    let client = client_for(addr);

    let score = client
        .fetch_user_score("12345", ScoreKind::Recent, 3, true)
        .await
        .unwrap();
    assert!(score.is_none());
}

#[tokio::test]
async fn beatmap_score_indexes_into_leaderboard() {
    let addr = serve(vec![
        token_response(),
        json_response(
            r#"{"scores":[{"id":1,"replay":true,"perfect":true},{"id":2,"replay":true,"perfect":false}]}"#,
        ),
    ])
    .await;
    let client = client_for(addr);

    let score = client
        .fetch_beatmap_score("129891", 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(score["id"], 2);
}

#[tokio::test]
async fn token_is_refreshed_once_and_reused() {
    // Exactly one token response is scripted; a second exchange would
    // consume a score response and fail to parse as a token.
    let addr = serve(vec![
        token_response(),
        json_response(r#"[{"id":1,"replay":true,"perfect":false}]"#),
        json_response(r#"[{"id":2,"replay":true,"perfect":false}]"#),
    ])
    .await;
    let client = client_for(addr);

    let first = client
        .fetch_user_score("1", ScoreKind::Recent, 0, true)
        .await
        .unwrap()
        .unwrap();
    let second = client
        .fetch_user_score("1", ScoreKind::Recent, 1, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first["id"], 1);
    assert_eq!(second["id"], 2);

    // Lifetime resets to the granted duration after the refresh.
    let remaining = client.token_manager().remaining_lifetime().await;
    assert!(remaining > Duration::from_secs(86_000));
}

// ============================================================================
// Downloader
// ============================================================================

#[tokio::test]
async fn download_retries_until_the_stream_succeeds() {
    let map = "osu file format v14\n\n[Metadata]\nTitle:Test\n";
    // First connection drops without a response, second serves the file.
    let addr = serve(vec![None, file_response(map)]).await;

    let (event_tx, mut event_rx) = broadcast::channel(16);
    let downloader = RetryDownloader::new(
        reqwest::Client::new(),
        format!("http://{}", addr),
        event_tx,
    )
    .with_backoff(Duration::from_millis(10), Duration::from_millis(50));

    let dir = tempfile::tempdir().unwrap();
    let path = downloader
        .ensure_beatmap_file("54321", dir.path())
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("54321.osu"));
    assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), map);

    // The failed first attempt was reported.
    let mut saw_retry = false;
    while let Ok(event) = event_rx.try_recv() {
        if matches!(event, FetchEvent::DownloadRetried { .. }) {
            saw_retry = true;
        }
    }
    assert!(saw_retry);
}

// ============================================================================
// Core resolve flow
// ============================================================================

fn config_without_local_db(downloads_dir: std::path::PathBuf) -> Config {
    Config {
        credentials: credentials(),
        osu_dir: None,
        downloads_dir,
    }
}

#[tokio::test]
async fn resolve_falls_back_to_remote_download() {
    let map = "osu file format v14\n";
    let addr = serve(vec![
        json_response(r#"[{"beatmap_id":"777"}]"#),
        file_response(map),
    ])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let core = OsufetchCore::with_hosts(
        &config_without_local_db(dir.path().to_path_buf()),
        hosts_for(addr),
    )
    .unwrap();

    let resolved = core.resolve_beatmap("abc123").await.unwrap().unwrap();
    assert_eq!(resolved.beatmap_id.as_deref(), Some("777"));
    assert_eq!(resolved.path, dir.path().join("777.osu"));
    assert!(resolved.path.exists());
}

#[tokio::test]
async fn resolve_unknown_hash_is_none() {
    let addr = serve(vec![json_response("[]")]).await;

    let dir = tempfile::tempdir().unwrap();
    let core = OsufetchCore::with_hosts(
        &config_without_local_db(dir.path().to_path_buf()),
        hosts_for(addr),
    )
    .unwrap();

    assert!(core.resolve_beatmap("zzz").await.unwrap().is_none());
}
