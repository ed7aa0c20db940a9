//! Simulation lifecycle: spawning, pausing, reaping and stopping immortals.
//!
//! The manager owns the population, the pause barrier and the score counter.
//! `start` spawns one Tokio task per immortal plus a periodic reaper; `stop`
//! flags every immortal, aborts all tasks and drains them within the
//! configured grace period. All read-only queries work while running.

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::immortal::{Arena, Immortal};
use crate::pause::PauseBarrier;
use crate::population::{Population, Snapshot};
use crate::score::ScoreCounter;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Lifecycle state of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationState {
    Stopped,
    Running,
}

/// Point-in-time aggregate of a simulation, suitable for printing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub state: SimulationState,
    pub population: usize,
    pub alive: usize,
    pub total_health: i64,
    pub total_fights: u64,
    pub paused: bool,
}

/// Tasks created by `start` and torn down by `stop`.
struct Workers {
    agents: JoinSet<()>,
    roster: Vec<Arc<Immortal>>,
    reaper: Option<JoinHandle<()>>,
}

impl Workers {
    fn new() -> Self {
        Self {
            agents: JoinSet::new(),
            roster: Vec::new(),
            reaper: None,
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
    }
}

/// Orchestrates a population of immortals.
pub struct SimulationManager {
    config: SimulationConfig,
    population: Arc<Population>,
    barrier: Arc<PauseBarrier>,
    score: Arc<ScoreCounter>,
    initial_count: usize,
    running: AtomicBool,
    workers: Mutex<Workers>,
}

impl SimulationManager {
    /// Create `config.population_size` immortals named `Immortal-<i>`.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let members = (0..config.population_size)
            .map(|i| {
                Arc::new(Immortal::new(
                    format!("Immortal-{i}"),
                    i,
                    config.initial_health,
                    config.damage,
                ))
            })
            .collect();

        Ok(Self {
            initial_count: config.population_size,
            population: Arc::new(Population::from_members(members)),
            barrier: Arc::new(PauseBarrier::new()),
            score: Arc::new(ScoreCounter::new()),
            running: AtomicBool::new(false),
            workers: Mutex::new(Workers::new()),
            config,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn initial_count(&self) -> usize {
        self.initial_count
    }

    pub fn initial_health(&self) -> i64 {
        self.config.initial_health
    }

    pub fn state(&self) -> SimulationState {
        if self.running.load(Ordering::Acquire) {
            SimulationState::Running
        } else {
            SimulationState::Stopped
        }
    }

    /// Spawn one task per immortal currently in the population and the
    /// reaper. Starting a running simulation restarts it.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        if self.state() == SimulationState::Running {
            self.shutdown(&mut workers).await;
        }

        let arena = Arena {
            population: Arc::clone(&self.population),
            barrier: Arc::clone(&self.barrier),
            score: Arc::clone(&self.score),
            mode: self.config.fight_mode,
            round_delay: self.config.round_delay,
        };

        let roster = self.population.snapshot();
        for immortal in roster.iter() {
            immortal.rearm();
            workers
                .agents
                .spawn(Arc::clone(immortal).run(arena.clone()));
        }
        workers.roster = roster.to_vec();

        if workers.reaper.as_ref().map_or(true, JoinHandle::is_finished) {
            let population = Arc::clone(&self.population);
            workers.reaper = Some(spawn_reaper(self.config.reap_interval, move || {
                let population = Arc::clone(&population);
                async move { population.reap_dead().await.len() }
            }));
        }

        self.running.store(true, Ordering::Release);
        info!(
            event = "simulation.started",
            agents = roster.len(),
            mode = %self.config.fight_mode,
        );
    }

    /// Agents block at their next poll of the barrier.
    pub fn pause(&self) {
        self.barrier.pause();
        info!(event = "simulation.paused");
    }

    pub fn resume(&self) {
        self.barrier.resume();
        info!(event = "simulation.resumed");
    }

    /// Stop every immortal and the reaper.
    ///
    /// Returns whether all tasks finished within the grace period. A `false`
    /// result is not an error: the tasks have been aborted and are detached.
    pub async fn stop(&self) -> bool {
        let mut workers = self.workers.lock().await;
        self.shutdown(&mut workers).await
    }

    async fn shutdown(&self, workers: &mut Workers) -> bool {
        let grace = self.config.stop_grace;
        let reaper = workers.reaper.take();
        let Workers { agents, roster, .. } = workers;

        let drained = tokio::time::timeout(grace, async {
            // The reaper must be gone, not merely aborted, before any immortal
            // is flagged: a stopped immortal is not alive and would be evicted.
            if let Some(reaper) = reaper {
                reaper.abort();
                log_join("reaper", reaper.await);
            }
            for immortal in roster.iter() {
                immortal.stop();
            }
            agents.abort_all();
            while let Some(joined) = agents.join_next().await {
                log_join("immortal", joined);
            }
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                event = "simulation.stop_grace_elapsed",
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                outstanding = agents.len(),
            );
            for immortal in roster.iter() {
                immortal.stop();
            }
            *agents = JoinSet::new();
        }
        roster.clear();

        let was_running = self.running.swap(false, Ordering::AcqRel);
        if was_running {
            info!(
                event = "simulation.stopped",
                drained = drained,
                total_fights = self.score.total_fights(),
            );
        }
        drained
    }

    /// Immortals currently alive in the population.
    pub async fn alive_count(&self) -> usize {
        let mut alive = 0;
        for immortal in self.population.snapshot().iter() {
            if immortal.is_alive().await {
                alive += 1;
            }
        }
        alive
    }

    /// Sum of health over the current population, saturating at the `i64`
    /// bounds.
    pub async fn total_health(&self) -> i64 {
        let mut total: i64 = 0;
        for immortal in self.population.snapshot().iter() {
            total = total.saturating_add(immortal.health().await);
        }
        total
    }

    pub fn population_snapshot(&self) -> Snapshot {
        self.population.snapshot()
    }

    pub fn score_board(&self) -> &ScoreCounter {
        &self.score
    }

    pub fn pause_barrier(&self) -> &Arc<PauseBarrier> {
        &self.barrier
    }

    /// Aggregate view of the simulation at this instant.
    pub async fn report(&self) -> SimulationReport {
        SimulationReport {
            state: self.state(),
            population: self.population.len(),
            alive: self.alive_count().await,
            total_health: self.total_health().await,
            total_fights: self.score.total_fights(),
            paused: self.barrier.is_paused(),
        }
    }
}

/// Run `reap` every `period` until aborted. A panicking iteration is logged
/// and the next tick runs as usual.
fn spawn_reaper<F, Fut>(period: Duration, mut reap: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = usize> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match AssertUnwindSafe(async { reap().await }).catch_unwind().await {
                Ok(0) => {}
                Ok(evicted) => debug!(event = "reaper.evicted", evicted = evicted),
                Err(_) => warn!(event = "reaper.iteration_failed", "reap panicked; continuing"),
            }
        }
    })
}

fn log_join(task: &'static str, joined: std::result::Result<(), JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            warn!(event = "simulation.task_panicked", task = task, error = %err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FightMode;
    use crate::error::SimulationError;
    use std::sync::atomic::AtomicUsize;

    fn quick_config(n: usize) -> SimulationConfig {
        SimulationConfig::new(n, FightMode::Ordered)
            .with_reap_interval(Duration::from_millis(20))
            .with_stop_grace(Duration::from_secs(2))
    }

    #[test]
    fn test_new_names_and_sizes_population() {
        let manager = SimulationManager::new(quick_config(4)).unwrap();
        assert_eq!(manager.initial_count(), 4);
        assert_eq!(manager.initial_health(), 100);
        assert_eq!(manager.state(), SimulationState::Stopped);

        let names: Vec<_> = manager
            .population_snapshot()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, ["Immortal-0", "Immortal-1", "Immortal-2", "Immortal-3"]);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = quick_config(4).with_reap_interval(Duration::ZERO);
        assert!(matches!(
            SimulationManager::new(config),
            Err(SimulationError::InvalidConfig(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_start_stop_transitions_state() {
        let manager = SimulationManager::new(quick_config(4)).unwrap();
        manager.start().await;
        assert_eq!(manager.state(), SimulationState::Running);

        assert!(manager.stop().await);
        assert_eq!(manager.state(), SimulationState::Stopped);
        assert!(manager
            .population_snapshot()
            .iter()
            .all(|m| !m.is_running()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_without_start_is_a_no_op() {
        let manager = SimulationManager::new(quick_config(2)).unwrap();
        assert!(manager.stop().await);
        assert_eq!(manager.state(), SimulationState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_report_reflects_population() {
        let manager = SimulationManager::new(quick_config(3)).unwrap();
        let report = manager.report().await;
        assert_eq!(report.state, SimulationState::Stopped);
        assert_eq!(report.population, 3);
        assert_eq!(report.alive, 3);
        assert_eq!(report.total_health, 300);
        assert_eq!(report.total_fights, 0);
        assert!(!report.paused);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reaper_survives_a_failed_iteration() {
        let population = Arc::new(Population::from_members(vec![
            Arc::new(Immortal::new("Survivor", 0, 10, 1)),
            Arc::new(Immortal::new("Fallen", 1, 0, 1)),
        ]));
        let attempts = Arc::new(AtomicUsize::new(0));
        let period = Duration::from_millis(20);

        let reaper = {
            let population = Arc::clone(&population);
            let attempts = Arc::clone(&attempts);
            spawn_reaper(period, move || {
                let population = Arc::clone(&population);
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        panic!("first reap fails");
                    }
                    population.reap_dead().await.len()
                }
            })
        };

        // Tick one panics, tick two must still evict.
        tokio::time::sleep(period * 2 + Duration::from_millis(15)).await;
        reaper.abort();

        assert!(attempts.load(Ordering::SeqCst) >= 2);
        let names: Vec<_> = population
            .snapshot()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert_eq!(names, ["Survivor"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_total_health_saturates() {
        let config = quick_config(2).with_health(i64::MAX / 2);
        let manager = SimulationManager::new(config).unwrap();
        assert_eq!(manager.total_health().await, i64::MAX - 1);

        let roster = manager.population_snapshot();
        let rival = Immortal::new("Rival", 99, 10, 2);
        // One landed hit heals by five and pushes the sum past i64::MAX; the
        // second round is skipped because the rival is already down.
        roster[0]
            .fight(&rival, FightMode::Ordered, manager.score_board())
            .await;
        roster[1]
            .fight(&rival, FightMode::Ordered, manager.score_board())
            .await;
        assert_eq!(manager.total_health().await, i64::MAX);
    }
}
