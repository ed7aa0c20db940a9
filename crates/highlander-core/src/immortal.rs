//! A single immortal and its fight loop.

use crate::config::FightMode;
use crate::lock_order::{lock_in_call_order, lock_ordered};
use crate::pause::PauseBarrier;
use crate::population::Population;
use crate::score::ScoreCounter;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

/// Draws that may land on the caller before falling back to a linear scan.
const MAX_OPPONENT_DRAWS: usize = 8;

/// Result of one fight round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FightOutcome {
    /// Damage dealt, attacker healed, score recorded.
    Landed,
    /// A participant was already at or below zero health; nothing changed.
    Skipped,
}

/// Everything an immortal's run loop shares with the rest of the simulation.
#[derive(Clone)]
pub struct Arena {
    pub population: Arc<Population>,
    pub barrier: Arc<PauseBarrier>,
    pub score: Arc<ScoreCounter>,
    pub mode: FightMode,
    pub round_delay: Duration,
}

/// One simulated participant.
///
/// Health sits behind the immortal's own async mutex and may go negative.
/// The `running` flag is independent of health: a dead immortal keeps
/// looping until it is told to stop.
pub struct Immortal {
    name: String,
    ordinal: usize,
    health: Mutex<i64>,
    damage: i64,
    running: watch::Sender<bool>,
}

impl fmt::Debug for Immortal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Immortal")
            .field("name", &self.name)
            .field("ordinal", &self.ordinal)
            .field("damage", &self.damage)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Immortal {
    /// Create an immortal. `ordinal` breaks ties between equal names in the
    /// lock order.
    pub fn new(name: impl Into<String>, ordinal: usize, health: i64, damage: i64) -> Self {
        let (running, _) = watch::channel(true);
        Self {
            name: name.into(),
            ordinal,
            health: Mutex::new(health),
            damage,
            running,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn damage(&self) -> i64 {
        self.damage
    }

    /// Current health, read under the immortal's lock.
    pub async fn health(&self) -> i64 {
        *self.health.lock().await
    }

    /// Current health if the lock is free right now.
    pub fn try_health(&self) -> Option<i64> {
        self.health.try_lock().ok().map(|health| *health)
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Alive means positive health and not stopped.
    pub async fn is_alive(&self) -> bool {
        self.is_running() && self.health().await > 0
    }

    /// Ask the run loop to exit at its next suspension point.
    pub fn stop(&self) {
        self.running.send_if_modified(|running| std::mem::replace(running, false));
    }

    /// Clear a previous stop request so the immortal can be run again.
    pub(crate) fn rearm(&self) {
        self.running.send_if_modified(|running| !std::mem::replace(running, true));
    }

    async fn stopped(&self) {
        let mut running = self.running.subscribe();
        let _ = running.wait_for(|running| !*running).await;
    }

    fn order_key(&self) -> (&str, usize) {
        (&self.name, self.ordinal)
    }

    /// Fight one round against `other`.
    ///
    /// Both health locks are held for the whole round. The attacker deals
    /// `damage` and heals `damage / 2`, saturating at `i64::MAX`. If either
    /// side is already at or below zero once the locks are held, the round is
    /// a no-op.
    pub async fn fight(
        &self,
        other: &Immortal,
        mode: FightMode,
        score: &ScoreCounter,
    ) -> FightOutcome {
        if std::ptr::eq(self, other) {
            return FightOutcome::Skipped;
        }

        let (mut mine, mut theirs) = match mode {
            FightMode::Ordered => {
                lock_ordered(&self.health, self.order_key(), &other.health, other.order_key())
                    .await
            }
            FightMode::Naive => lock_in_call_order(&self.health, &other.health).await,
        };

        if *mine <= 0 || *theirs <= 0 {
            return FightOutcome::Skipped;
        }

        *theirs -= self.damage;
        *mine = mine.saturating_add(self.damage / 2);
        score.record_fight();
        trace!(attacker = %self.name, defender = %other.name, defender_health = *theirs, "hit");
        FightOutcome::Landed
    }

    /// Pick a uniformly random opponent other than `self` from the current
    /// population snapshot.
    pub fn pick_opponent(&self, population: &Population) -> Option<Arc<Immortal>> {
        let snapshot = population.snapshot();
        if snapshot.len() < 2 {
            return None;
        }

        let mut rng = rand::rng();
        for _ in 0..MAX_OPPONENT_DRAWS {
            let candidate = &snapshot[rng.random_range(0..snapshot.len())];
            if !std::ptr::eq(candidate.as_ref(), self) {
                return Some(Arc::clone(candidate));
            }
        }

        let others = snapshot
            .iter()
            .filter(|candidate| !std::ptr::eq(candidate.as_ref(), self))
            .count();
        if others == 0 {
            return None;
        }
        snapshot
            .iter()
            .filter(|candidate| !std::ptr::eq(candidate.as_ref(), self))
            .nth(rng.random_range(0..others))
            .cloned()
    }

    /// The immortal's task body. Loops until stopped; health is not an exit
    /// condition.
    pub async fn run(self: Arc<Self>, arena: Arena) {
        debug!(event = "immortal.started", name = %self.name);

        while self.is_running() {
            tokio::select! {
                biased;
                _ = self.stopped() => break,
                _ = arena.barrier.await_if_paused() => {}
            }
            if !self.is_running() {
                break;
            }

            if let Some(opponent) = self.pick_opponent(&arena.population) {
                tokio::select! {
                    biased;
                    _ = self.stopped() => break,
                    _ = self.fight(&opponent, arena.mode, &arena.score) => {}
                }
            }

            if arena.round_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(arena.round_delay).await;
            }
        }

        debug!(event = "immortal.stopped", name = %self.name);
    }
}
