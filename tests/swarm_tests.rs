//! End-to-end swarm tests: push phase, rarest-first pull phase, tracker
//! bookkeeping, all over loopback TCP and HTTP.

use rarity_core::FileState;
use rarity_files::digest_file;
use rarity_integration_tests::{SwarmFixture, pattern};

const FILE_SIZE: usize = 5000;
const CHUNK_SIZE: usize = 512;
const TOTAL_CHUNKS: u32 = 10;

// ============================================================================
// Full Distribution
// ============================================================================

/// Seed 5000 bytes to two peers; each gets five chunks pushed and pulls
/// the other five from its neighbour.
#[tokio::test]
async fn test_end_to_end_two_peers() {
    let swarm = SwarmFixture::new(2).await.unwrap();
    let path = swarm.write_file("sample.bin", FILE_SIZE);

    let report = swarm.seeder.seed_file(&path).await.unwrap();
    assert_eq!(report.file_id, "sample.bin");
    assert_eq!(report.total_chunks, TOTAL_CHUNKS);
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].assigned, 0..5);
    assert_eq!(report.outcomes[1].assigned, 5..10);
    assert!(report.outcomes.iter().all(|o| o.is_success()));
    assert_eq!(report.delivered_count(), 10);

    let outputs = swarm.wait_all(&report.file_id).await.unwrap();
    for output in &outputs {
        assert_eq!(digest_file(output).unwrap(), report.digest);
        assert_eq!(std::fs::read(output).unwrap(), pattern(FILE_SIZE));
    }

    for peer in &swarm.peers {
        let handle = peer.local_file("sample.bin").unwrap();
        let file = handle.lock().await;
        assert_eq!(file.state(), &FileState::Complete);
        assert_eq!(file.held_count(), TOTAL_CHUNKS);
        assert_eq!(file.chunk(0).unwrap().len(), CHUNK_SIZE);
        assert_eq!(
            file.chunk(TOTAL_CHUNKS - 1).unwrap().len(),
            FILE_SIZE - 9 * CHUNK_SIZE
        );
    }

    let info = swarm.tracker.torrent("sample.bin").await.unwrap();
    assert_eq!(info.origin, swarm.seeder.peer_id().await.unwrap());
    assert_eq!(info.chunk_freq, vec![2; TOTAL_CHUNKS as usize]);
    assert!(info.chunk_data.values().all(|row| row.iter().all(|&held| held)));

    // Every pulled chunk came from the other peer, none from the origin
    let stats = swarm.coordinator.statistics();
    for peer in &swarm.peers {
        let id = peer.peer_id().await.unwrap();
        assert_eq!(stats[&id].chunks_downloaded, 5);
    }

    swarm.shutdown().await;
}

#[tokio::test]
async fn test_three_peers_uneven_blocks() {
    let swarm = SwarmFixture::new(3).await.unwrap();
    let path = swarm.write_file("three.bin", FILE_SIZE);

    let report = swarm.seeder.seed_file(&path).await.unwrap();
    let ranges: Vec<_> = report.outcomes.iter().map(|o| o.assigned.clone()).collect();
    assert_eq!(ranges, vec![0..4, 4..7, 7..10]);

    for output in swarm.wait_all("three.bin").await.unwrap() {
        assert_eq!(digest_file(output).unwrap(), report.digest);
    }

    let info = swarm.tracker.torrent("three.bin").await.unwrap();
    assert_eq!(info.chunk_freq, vec![3; TOTAL_CHUNKS as usize]);

    swarm.shutdown().await;
}

#[tokio::test]
async fn test_two_files_in_one_swarm() {
    let swarm = SwarmFixture::new(2).await.unwrap();
    let first = swarm.write_file("first.bin", FILE_SIZE);
    let second = swarm.write_file("second.bin", 3 * CHUNK_SIZE + 1);

    let a = swarm.seeder.seed_file(&first).await.unwrap();
    let b = swarm.seeder.seed_file(&second).await.unwrap();
    assert_eq!(b.total_chunks, 4);

    swarm.wait_all(&a.file_id).await.unwrap();
    swarm.wait_all(&b.file_id).await.unwrap();
    assert_eq!(swarm.coordinator.torrent_count(), 2);

    let mut ids = swarm.peers[0].file_ids();
    ids.sort();
    assert_eq!(ids, vec!["first.bin", "second.bin"]);

    swarm.shutdown().await;
}

/// A peer that registers between two seeds only takes part in the second
#[tokio::test]
async fn test_late_peer_joins_next_seed() {
    let swarm = SwarmFixture::new(2).await.unwrap();
    let early = swarm.write_file("early.bin", FILE_SIZE);
    let a = swarm.seeder.seed_file(&early).await.unwrap();
    swarm.wait_all(&a.file_id).await.unwrap();

    let late = swarm.spawn_node("late").await.unwrap();
    let late_id = late.peer_id().await.unwrap();
    let next = swarm.write_file("next.bin", FILE_SIZE);
    let b = swarm.seeder.seed_file(&next).await.unwrap();

    assert_eq!(b.outcomes.len(), 3);
    assert_eq!(b.outcomes[2].peer, late_id);
    assert_eq!(b.outcomes[2].assigned, 7..10);

    swarm.wait_all(&b.file_id).await.unwrap();
    let output = late.wait_for_file("next.bin").await.unwrap();
    assert_eq!(digest_file(&output).unwrap(), b.digest);
    assert!(late.local_file("early.bin").is_none());

    let info = swarm.tracker.torrent("next.bin").await.unwrap();
    assert_eq!(info.chunk_freq, vec![3; TOTAL_CHUNKS as usize]);

    late.stop().await.unwrap();
    swarm.shutdown().await;
}

// ============================================================================
// Failure Isolation
// ============================================================================

/// A registered peer that is not listening only fails its own session.
/// Its block is served by the origin instead.
#[tokio::test]
async fn test_dead_peer_is_isolated() {
    let swarm = SwarmFixture::new(2).await.unwrap();
    let dead_port = swarm.register_dead_peer().await.unwrap();
    let path = swarm.write_file("isolated.bin", FILE_SIZE);

    let report = swarm.seeder.seed_file(&path).await.unwrap();
    assert_eq!(report.outcomes.len(), 3);

    let failed: Vec<_> = report.failed_peers().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].peer, format!("127.0.0.1:{dead_port}"));
    assert!(failed[0].delivered.is_empty());
    assert!(failed[0].error.as_ref().unwrap().is_transient());

    for output in swarm.wait_all("isolated.bin").await.unwrap() {
        assert_eq!(digest_file(output).unwrap(), report.digest);
    }

    let info = swarm.tracker.torrent("isolated.bin").await.unwrap();
    assert_eq!(info.chunk_freq, vec![2; TOTAL_CHUNKS as usize]);
    let dead_row = &info.chunk_data[&failed[0].peer];
    assert!(dead_row.iter().all(|&held| !held));

    swarm.shutdown().await;
}

#[tokio::test]
async fn test_seed_without_peers() {
    let swarm = SwarmFixture::new(0).await.unwrap();
    let path = swarm.write_file("lonely.bin", FILE_SIZE);

    let report = swarm.seeder.seed_file(&path).await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.total_chunks, TOTAL_CHUNKS);

    let info = swarm.tracker.torrent("lonely.bin").await.unwrap();
    assert_eq!(info.chunk_freq, vec![0; TOTAL_CHUNKS as usize]);
    assert!(info.chunk_data.is_empty());

    swarm.shutdown().await;
}

#[tokio::test]
async fn test_seed_rejects_wire_command_names() {
    let swarm = SwarmFixture::new(1).await.unwrap();
    let path = swarm.write_file("RECOVER:evil", 100);

    assert!(swarm.seeder.seed_file(&path).await.is_err());
    assert_eq!(swarm.coordinator.torrent_count(), 0);

    swarm.shutdown().await;
}

// ============================================================================
// Statistics
// ============================================================================

#[tokio::test]
async fn test_reported_stats() {
    let swarm = SwarmFixture::new(2).await.unwrap();
    let path = swarm.write_file("counted.bin", FILE_SIZE);

    swarm.seeder.seed_file(&path).await.unwrap();
    swarm.wait_all("counted.bin").await.unwrap();

    for node in swarm.peers.iter().chain(std::iter::once(&swarm.seeder)) {
        node.report_stats().await.unwrap();
    }

    let stats = swarm.tracker.stats().await.unwrap();
    for peer in &swarm.peers {
        let reported = stats[&peer.peer_id().await.unwrap()].reported.unwrap();
        assert_eq!(reported.files_downloaded, 1);
        assert_eq!(reported.chunks_downloaded, u64::from(TOTAL_CHUNKS));
        assert_eq!(reported.bytes_downloaded, FILE_SIZE as u64);
        assert_eq!(reported.chunks_uploaded, 5);
    }

    let seeder = stats[&swarm.seeder.peer_id().await.unwrap()]
        .reported
        .unwrap();
    assert_eq!(seeder.files_uploaded, 2);
    assert_eq!(seeder.chunks_uploaded, u64::from(TOTAL_CHUNKS));

    swarm.shutdown().await;
}
