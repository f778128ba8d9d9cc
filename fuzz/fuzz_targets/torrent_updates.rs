//! Fuzz target for tracker bookkeeping
//!
//! Any sequence of holding reports keeps `chunk_freq` equal to the column
//! sums of the matrix, and selection never hands a peer its own address.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rarity_tracker::{ChunkMatrix, Torrent};

#[derive(Debug, Arbitrary)]
struct Input {
    total: u8,
    rows: Vec<Vec<bool>>,
    updates: Vec<(u8, u8)>,
    seed: u64,
}

fuzz_target!(|input: Input| {
    let total = u32::from(input.total % 64);

    let mut matrix = ChunkMatrix::new();
    for (p, row) in input.rows.iter().take(8).enumerate() {
        let mut row = row.clone();
        row.resize(total as usize, false);
        matrix.insert(format!("10.0.0.{p}:7000"), row);
    }

    let Ok(mut torrent) = Torrent::new("fuzz.bin", total, matrix, "10.0.0.254:7000".into()) else {
        return;
    };
    let mut rng = StdRng::seed_from_u64(input.seed);

    for (peer, chunk) in input.updates.iter().take(256) {
        let peer = format!("10.0.0.{}:7000", peer % 12);
        let _ = torrent.mark_held(&peer, u32::from(*chunk));
        assert!(torrent.is_consistent());

        let assignment = torrent.select(&peer, &mut rng);
        if assignment.chunk_id.is_some() {
            assert_ne!(assignment.holder, peer);
        }
    }
});
