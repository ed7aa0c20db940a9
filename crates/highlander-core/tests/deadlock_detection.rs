//! Watchdog tests: the ordered strategy keeps making progress while the naive
//! one is observed to stall. Both run on the single-threaded runtime so the
//! interleaving is the same on every run.

use highlander_core::{FightMode, SimulationConfig, SimulationManager};
use std::time::Duration;

const WATCHDOG: Duration = Duration::from_millis(150);

fn duel(mode: FightMode) -> SimulationManager {
    let config = SimulationConfig::new(2, mode)
        .with_health(1_000_000)
        .with_damage(10)
        .with_stop_grace(Duration::from_secs(2));
    SimulationManager::new(config).unwrap()
}

#[tokio::test]
async fn ordered_duel_keeps_scoring() {
    let manager = duel(FightMode::Ordered);
    manager.start().await;

    tokio::time::sleep(WATCHDOG).await;
    let first = manager.score_board().total_fights();
    tokio::time::sleep(WATCHDOG).await;
    let second = manager.score_board().total_fights();

    assert!(first > 0);
    assert!(second > first, "ordered fights stalled at {first}");
    assert!(manager.stop().await);
}

#[tokio::test]
async fn naive_duel_stalls() {
    let manager = duel(FightMode::Naive);
    manager.start().await;

    tokio::time::sleep(WATCHDOG).await;
    let first = manager.score_board().total_fights();
    tokio::time::sleep(WATCHDOG).await;
    let second = manager.score_board().total_fights();

    assert_eq!(first, second, "naive duel was expected to deadlock");
    assert_eq!(second, 0);

    // Both agents are wedged on each other's lock; stop still reclaims them.
    let drained = tokio::time::timeout(Duration::from_secs(5), manager.stop())
        .await
        .expect("stop must not hang on a deadlocked simulation");
    assert!(drained);
    assert_eq!(manager.total_health().await, 2_000_000);
}
