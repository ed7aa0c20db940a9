//! Highlander Core Library
//!
//! A concurrent population of immortals fighting under pairwise locking:
//! - [`PauseBarrier`] pauses every immortal and counts the ones parked on it
//! - [`Immortal`] fights random peers with deadlock-free ordered locking
//! - [`Population`] is a copy-on-write roster that a reaper prunes
//! - [`SimulationManager`] drives start, pause, resume and stop
//!
//! The [`transfer`] module applies the same lock ordering to bank accounts.

pub mod config;
pub mod error;
pub mod immortal;
pub mod lock_order;
pub mod manager;
pub mod pause;
pub mod population;
pub mod score;
pub mod telemetry;
pub mod transfer;

pub use config::{FightMode, SimulationConfig};
pub use error::{Result, SimulationError, TransferError};
pub use immortal::{Arena, FightOutcome, Immortal};
pub use lock_order::{lock_in_call_order, lock_ordered};
pub use manager::{SimulationManager, SimulationReport, SimulationState};
pub use pause::PauseBarrier;
pub use population::{Population, Snapshot};
pub use score::ScoreCounter;
pub use telemetry::init_tracing;
pub use transfer::{transfer_naive, transfer_ordered, transfer_try_lock, BankAccount};

/// Highlander version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
