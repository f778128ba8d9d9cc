//! Integration tests for the tracker HTTP API

use rarity_tracker::{ChunkMatrix, Coordinator, Registration, TrackerClient, TrackerError, api};
use std::sync::Arc;

async fn spawn_tracker() -> (TrackerClient, Arc<Coordinator>) {
    let coordinator = Arc::new(Coordinator::new());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(api::serve(listener, Arc::clone(&coordinator)));

    let client = TrackerClient::new(&format!("http://{addr}")).unwrap();
    (client, coordinator)
}

#[tokio::test]
async fn test_register_twice() {
    let (client, coordinator) = spawn_tracker().await;

    assert_eq!(client.register(7001).await.unwrap(), Registration::Registered);
    assert_eq!(
        client.register(7001).await.unwrap(),
        Registration::AlreadyRegistered
    );
    assert_eq!(coordinator.peer_count().await, 1);
}

#[tokio::test]
async fn test_register_missing_port() {
    let (client, _) = spawn_tracker().await;

    let resp = reqwest::Client::new()
        .post(format!("{}/register", client.url()))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing port");
}

#[tokio::test]
async fn test_peers_excludes_caller() {
    let (client, _) = spawn_tracker().await;

    for port in [7001, 7002, 7003] {
        client.register(port).await.unwrap();
    }

    let peers = client.peers(7002).await.unwrap();
    assert_eq!(peers, vec!["127.0.0.1:7001", "127.0.0.1:7003"]);
}

#[tokio::test]
async fn test_swarm_bookkeeping_round() {
    let (client, _) = spawn_tracker().await;

    let mut matrix = ChunkMatrix::new();
    matrix.insert("127.0.0.1:7001".into(), vec![true, true, false, false]);
    matrix.insert("127.0.0.1:7002".into(), vec![false, false, true, true]);

    let stored = client
        .initialize_chunks("notes.txt", 4, matrix.clone(), 7000)
        .await
        .unwrap();
    assert_eq!(stored, matrix);

    let pick = client.request_chunk("notes.txt", 7001).await.unwrap();
    assert_eq!(pick.chunk_id, Some(2));
    assert_eq!(pick.holder, "127.0.0.1:7002");

    let after = client.update_chunk("notes.txt", 7001, 2).await.unwrap();
    assert_eq!(after["127.0.0.1:7001"], vec![true, true, true, false]);

    let info = client.torrent("notes.txt").await.unwrap();
    assert_eq!(info.origin, "127.0.0.1:7000");
    assert_eq!(info.chunk_freq, vec![1, 1, 2, 1]);

    let stats = client.stats().await.unwrap();
    assert_eq!(stats["127.0.0.1:7001"].chunks_downloaded, 1);
}

#[tokio::test]
async fn test_uninitialized_torrent_is_reported() {
    let (client, _) = spawn_tracker().await;

    let err = client.update_chunk("ghost.bin", 7001, 0).await.unwrap_err();
    assert!(err.is_not_initialized());

    let err = client.request_chunk("ghost.bin", 7001).await.unwrap_err();
    assert!(matches!(err, TrackerError::Api { status: 400, .. }));
}

#[tokio::test]
async fn test_oversized_torrent_is_an_error_response() {
    let (client, coordinator) = spawn_tracker().await;

    let err = client
        .initialize_chunks("huge.bin", u32::MAX, ChunkMatrix::new(), 7000)
        .await
        .unwrap_err();
    match err {
        TrackerError::Api { status, kind, .. } => {
            assert_eq!(status, 400);
            assert_eq!(kind.as_deref(), Some("too_many_chunks"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Tracker keeps serving
    assert_eq!(coordinator.torrent_count(), 0);
    assert_eq!(client.register(7001).await.unwrap(), Registration::Registered);
}

#[tokio::test]
async fn test_complete_peer_gets_minus_one() {
    let (client, _) = spawn_tracker().await;

    let mut matrix = ChunkMatrix::new();
    matrix.insert("127.0.0.1:7001".into(), vec![true, true]);
    client
        .initialize_chunks("done.bin", 2, matrix, 7000)
        .await
        .unwrap();

    let resp = reqwest::Client::new()
        .get(format!("{}/request_chunk", client.url()))
        .json(&serde_json::json!({"file_id": "done.bin", "port": 7001}))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["chunk_id"], -1);
    assert_eq!(body["node"], "127.0.0.1:7000");
}

#[tokio::test]
async fn test_report_stats_visible_in_stats() {
    let (client, _) = spawn_tracker().await;

    let stats = rarity_tracker::TransferStats {
        chunks_uploaded: 10,
        bytes_uploaded: 5000,
        files_uploaded: 2,
        ..Default::default()
    };
    client.report_stats(7005, stats).await.unwrap();

    let all = client.stats().await.unwrap();
    assert_eq!(all["127.0.0.1:7005"].reported, Some(stats));
}

#[tokio::test]
async fn test_unreachable_tracker() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = TrackerClient::new(&format!("http://{addr}")).unwrap();
    let err = client.register(7000).await.unwrap_err();
    assert!(err.is_unreachable());
}
