//! Simulation configuration.
//!
//! A [`SimulationConfig`] is passed explicitly to
//! [`SimulationManager::new`](crate::SimulationManager::new). Defaults match
//! the classic lab setup (8 immortals, 100 health, 10 damage, ordered fights).
//! [`SimulationConfig::from_env`] overlays `HIGHLANDER_*` environment
//! variables on those defaults.

use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_COUNT: &str = "HIGHLANDER_COUNT";
pub const ENV_FIGHT: &str = "HIGHLANDER_FIGHT";
pub const ENV_HEALTH: &str = "HIGHLANDER_HEALTH";
pub const ENV_DAMAGE: &str = "HIGHLANDER_DAMAGE";
pub const ENV_REAP_INTERVAL_MS: &str = "HIGHLANDER_REAP_INTERVAL_MS";
pub const ENV_STOP_GRACE_MS: &str = "HIGHLANDER_STOP_GRACE_MS";
pub const ENV_ROUND_DELAY_MS: &str = "HIGHLANDER_ROUND_DELAY_MS";

/// Lock acquisition strategy used for a fight round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FightMode {
    /// Both locks taken in the global identity order. Never deadlocks.
    #[default]
    Ordered,
    /// Own lock first, then the opponent's. Can deadlock; diagnostic only.
    Naive,
}

impl FightMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FightMode::Ordered => "ordered",
            FightMode::Naive => "naive",
        }
    }
}

impl fmt::Display for FightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FightMode {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordered" => Ok(FightMode::Ordered),
            "naive" => Ok(FightMode::Naive),
            _ => Err(SimulationError::InvalidFightMode(s.to_string())),
        }
    }
}

/// Construction parameters for a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of immortals created at construction.
    pub population_size: usize,
    /// Lock strategy for fight rounds.
    pub fight_mode: FightMode,
    /// Starting health of every immortal.
    pub initial_health: i64,
    /// Damage dealt per landed hit; the attacker heals half of it.
    pub damage: i64,
    /// Period of the reaper that evicts dead immortals.
    pub reap_interval: Duration,
    /// How long `stop` waits for tasks to wind down after cancelling them.
    pub stop_grace: Duration,
    /// Pause between two fight rounds of the same immortal.
    pub round_delay: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            population_size: 8,
            fight_mode: FightMode::Ordered,
            initial_health: 100,
            damage: 10,
            reap_interval: Duration::from_millis(500),
            stop_grace: Duration::from_secs(2),
            round_delay: Duration::from_millis(2),
        }
    }
}

impl SimulationConfig {
    /// Defaults with the given population size and fight mode.
    pub fn new(population_size: usize, fight_mode: FightMode) -> Self {
        Self {
            population_size,
            fight_mode,
            ..Self::default()
        }
    }

    pub fn with_health(mut self, initial_health: i64) -> Self {
        self.initial_health = initial_health;
        self
    }

    pub fn with_damage(mut self, damage: i64) -> Self {
        self.damage = damage;
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_round_delay(mut self, delay: Duration) -> Self {
        self.round_delay = delay;
        self
    }

    /// Build a configuration from the process environment.
    ///
    /// Unset variables keep their default; set but unparsable ones are an
    /// error rather than being silently ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup(ENV_COUNT) {
            config.population_size = parse_var(ENV_COUNT, &v)?;
        }
        if let Some(v) = lookup(ENV_FIGHT) {
            config.fight_mode = v.parse()?;
        }
        if let Some(v) = lookup(ENV_HEALTH) {
            config.initial_health = parse_var(ENV_HEALTH, &v)?;
        }
        if let Some(v) = lookup(ENV_DAMAGE) {
            config.damage = parse_var(ENV_DAMAGE, &v)?;
        }
        if let Some(v) = lookup(ENV_REAP_INTERVAL_MS) {
            config.reap_interval = Duration::from_millis(parse_var(ENV_REAP_INTERVAL_MS, &v)?);
        }
        if let Some(v) = lookup(ENV_STOP_GRACE_MS) {
            config.stop_grace = Duration::from_millis(parse_var(ENV_STOP_GRACE_MS, &v)?);
        }
        if let Some(v) = lookup(ENV_ROUND_DELAY_MS) {
            config.round_delay = Duration::from_millis(parse_var(ENV_ROUND_DELAY_MS, &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.reap_interval.is_zero() {
            return Err(SimulationError::InvalidConfig(
                "reap interval must be non-zero".to_string(),
            ));
        }
        if self.stop_grace.is_zero() {
            return Err(SimulationError::InvalidConfig(
                "stop grace period must be non-zero".to_string(),
            ));
        }
        if self.damage < 0 {
            return Err(SimulationError::InvalidConfig(format!(
                "damage must not be negative (got {})",
                self.damage
            )));
        }
        let fits = i64::try_from(self.population_size)
            .ok()
            .and_then(|n| n.checked_mul(self.initial_health))
            .is_some();
        if !fits {
            return Err(SimulationError::InvalidConfig(format!(
                "{} immortals at {} health overflow the population total",
                self.population_size, self.initial_health
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(var: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SimulationError::InvalidEnvValue {
            var: var.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_lab_setup() {
        let config = SimulationConfig::default();
        assert_eq!(config.population_size, 8);
        assert_eq!(config.fight_mode, FightMode::Ordered);
        assert_eq!(config.initial_health, 100);
        assert_eq!(config.damage, 10);
        assert_eq!(config.reap_interval, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fight_mode_parses_case_insensitively() {
        assert_eq!("ordered".parse::<FightMode>().unwrap(), FightMode::Ordered);
        assert_eq!("NAIVE".parse::<FightMode>().unwrap(), FightMode::Naive);
        assert_eq!(" Naive ".parse::<FightMode>().unwrap(), FightMode::Naive);
        assert!(matches!(
            "chaotic".parse::<FightMode>(),
            Err(SimulationError::InvalidFightMode(_))
        ));
    }

    #[test]
    fn test_from_lookup_overlays_defaults() {
        let config = SimulationConfig::from_lookup(lookup_from(&[
            (ENV_COUNT, "32"),
            (ENV_FIGHT, "naive"),
            (ENV_DAMAGE, "4"),
            (ENV_REAP_INTERVAL_MS, "50"),
        ]))
        .unwrap();

        assert_eq!(config.population_size, 32);
        assert_eq!(config.fight_mode, FightMode::Naive);
        assert_eq!(config.damage, 4);
        assert_eq!(config.reap_interval, Duration::from_millis(50));
        // untouched
        assert_eq!(config.initial_health, 100);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = SimulationConfig::from_lookup(lookup_from(&[(ENV_HEALTH, "lots")])).unwrap_err();
        match err {
            SimulationError::InvalidEnvValue { var, value } => {
                assert_eq!(var, ENV_HEALTH);
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_reap_interval() {
        let config = SimulationConfig::default().with_reap_interval(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidConfig(_))
        ));

        let config = SimulationConfig::default().with_damage(-1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unsummable_health() {
        let config = SimulationConfig::new(8, FightMode::Ordered).with_health(i64::MAX / 4);
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidConfig(_))
        ));

        let config = SimulationConfig::new(2, FightMode::Ordered).with_health(i64::MAX / 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serde_uses_snake_case_mode() {
        let config = SimulationConfig::new(3, FightMode::Naive);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["fight_mode"], "naive");

        let back: SimulationConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
