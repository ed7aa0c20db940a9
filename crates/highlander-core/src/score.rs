//! Monotonic fight counter shared by every immortal.

use std::sync::atomic::{AtomicU64, Ordering};

/// Count of completed fight rounds.
///
/// Increments never block and never block readers.
#[derive(Debug, Default)]
pub struct ScoreCounter {
    total_fights: AtomicU64,
}

impl ScoreCounter {
    pub const fn new() -> Self {
        Self {
            total_fights: AtomicU64::new(0),
        }
    }

    /// Record one landed hit.
    pub fn record_fight(&self) {
        self.total_fights.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "total_fights", "counter incremented");
    }

    /// Fights recorded so far.
    pub fn total_fights(&self) -> u64 {
        self.total_fights.load(Ordering::Relaxed)
    }

    /// Emit the current count as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(metric = "flush", total_fights = self.total_fights());
    }
}
