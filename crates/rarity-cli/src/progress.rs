//! Seeding progress display.

use indicatif::{ProgressBar, ProgressStyle};
use rarity_core::PeerOutcome;
use std::time::Duration;

/// Progress over the chunks pushed to the swarm
pub struct SeedProgress {
    bar: ProgressBar,
}

impl SeedProgress {
    /// Create a bar; its length is set once pushes start
    #[must_use]
    pub fn new(filename: &str) -> Self {
        let bar = ProgressBar::new(0);

        if let Ok(style) = ProgressStyle::default_bar().template(
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} chunks",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }

        bar.set_message(format!("Seeding: {filename}"));

        Self { bar }
    }

    /// Pushes are starting
    pub fn start(&self, peers: usize, total_chunks: u32) {
        self.bar.set_length(u64::from(total_chunks));
        self.bar
            .println(format!("Pushing {total_chunks} chunks to {peers} peer(s)"));
    }

    /// One peer session ended
    pub fn peer_finished(&self, outcome: &PeerOutcome) {
        self.bar.inc(outcome.delivered.len() as u64);
        match &outcome.error {
            None => self.bar.println(format!(
                "  {} acknowledged {} chunk(s)",
                outcome.peer,
                outcome.delivered.len()
            )),
            Some(e) => self.bar.println(format!("  {} failed: {e}", outcome.peer)),
        }
    }

    /// Finish with custom message
    pub fn finish_with_message(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Format bytes in human-readable format
///
/// # Example
///
/// ```ignore
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}

/// Format duration in human-readable format
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(5000), "4.88 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024_u64.pow(4)), "1.00 TB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m");
    }

    #[test]
    fn test_progress_counts_delivered_chunks() {
        let progress = SeedProgress::new("sample.bin");
        progress.bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        progress.start(2, 10);

        progress.peer_finished(&PeerOutcome {
            peer: "127.0.0.1:7001".to_string(),
            delivered: (0..5).collect(),
            assigned: 0..5,
            error: None,
        });
        progress.peer_finished(&PeerOutcome {
            peer: "127.0.0.1:7002".to_string(),
            delivered: vec![5, 6],
            assigned: 5..10,
            error: Some(rarity_core::NodeError::timeout("ack")),
        });

        assert_eq!(progress.bar.length(), Some(10));
        assert_eq!(progress.bar.position(), 7);
    }
}
