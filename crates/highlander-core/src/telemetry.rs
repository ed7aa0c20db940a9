//! Tracing initialisation for the `highlander` binary and ad-hoc harnesses.
//!
//! The library only emits events. Lifecycle events (`simulation.*`,
//! `barrier.*`, `reaper.*`) are `info`/`debug`; every landed hit is a `trace`
//! event from `highlander_core::immortal`, which at a thousand immortals is
//! far too chatty for anything but `--verbose` runs.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directive used when `RUST_LOG` is unset: `level` for the highlander crates,
/// `warn` for everything else.
fn default_directive(level: Level) -> String {
    format!("warn,highlander_core={level},highlander={level}")
}

/// Install the global subscriber, human-readable or newline-delimited JSON.
///
/// `RUST_LOG` wins over `level` when set. Only the first call in a process
/// takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    // Agent tasks hop between workers, so thread ids help read interleavings.
    let layer = fmt::layer().with_target(false).with_thread_ids(true);
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
