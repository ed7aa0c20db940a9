//! Global pause/resume barrier with an exact count of blocked callers.
//!
//! Two `watch` channels carry the state: one for the paused flag, one for the
//! number of callers currently suspended in [`PauseBarrier::await_if_paused`].
//! Keeping the count on its own channel lets a controller wait for "N agents
//! are now parked" without racing the pause/resume signal itself.
//!
//! A suspended caller holds a [`BlockedGuard`]; the count is decremented when
//! the guard drops, which also happens when the waiting future is cancelled.

use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Pause/resume controller shared by every immortal of a simulation.
#[derive(Debug)]
pub struct PauseBarrier {
    paused: watch::Sender<bool>,
    blocked: watch::Sender<usize>,
}

impl Default for PauseBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseBarrier {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        let (blocked, _) = watch::channel(0);
        Self { paused, blocked }
    }

    /// Enter the paused state. Agents block at their next poll point.
    pub fn pause(&self) {
        let changed = self.paused.send_if_modified(|paused| {
            if *paused {
                false
            } else {
                *paused = true;
                true
            }
        });
        if changed {
            debug!(event = "barrier.paused");
        }
    }

    /// Leave the paused state and release every suspended caller.
    pub fn resume(&self) {
        let changed = self.paused.send_if_modified(|paused| {
            if *paused {
                *paused = false;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(event = "barrier.resumed", released = self.paused_count());
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Suspend while the barrier is paused.
    ///
    /// Returns immediately when running. The paused flag is re-checked after
    /// every wake-up, so a resume immediately followed by another pause keeps
    /// the caller parked. Cancel-safe: dropping the future releases the
    /// caller's slot in the blocked count.
    pub async fn await_if_paused(&self) {
        let mut paused = self.paused.subscribe();
        loop {
            if !*paused.borrow_and_update() {
                return;
            }
            let _blocked = BlockedGuard::enter(&self.blocked);
            // The sender is owned by `self`, so the channel cannot close here.
            let _ = paused.wait_for(|paused| !*paused).await;
        }
    }

    /// Wait until at least `expected` callers are suspended.
    ///
    /// Returns `false` once `timeout` elapses without reaching the count.
    /// Callers that have already terminated never arrive, so asking for more
    /// than the number of live agents always ends in a timeout.
    pub async fn wait_for_all_paused(&self, expected: usize, timeout: Duration) -> bool {
        let mut blocked = self.blocked.subscribe();
        let reached = matches!(
            tokio::time::timeout(timeout, blocked.wait_for(|count| *count >= expected)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// Wait until no caller is suspended, e.g. after a resume.
    pub async fn wait_for_released(&self, timeout: Duration) -> bool {
        let mut blocked = self.blocked.subscribe();
        let reached = matches!(
            tokio::time::timeout(timeout, blocked.wait_for(|count| *count == 0)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// Instantaneous number of suspended callers.
    pub fn paused_count(&self) -> usize {
        *self.blocked.borrow()
    }
}

/// Registration of one suspended caller in the blocked count.
struct BlockedGuard<'a> {
    blocked: &'a watch::Sender<usize>,
}

impl<'a> BlockedGuard<'a> {
    fn enter(blocked: &'a watch::Sender<usize>) -> Self {
        blocked.send_modify(|count| *count += 1);
        Self { blocked }
    }
}

impl Drop for BlockedGuard<'_> {
    fn drop(&mut self) {
        self.blocked.send_modify(|count| *count -= 1);
    }
}
