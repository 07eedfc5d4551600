//! Logging setup (spec.md's ambient stack — not a named component, but
//! every other component logs through this).
//!
//! The teacher hand-rolls a `LogLevel` enum and a `log()` method on
//! `RedisServer` (`redis/log.rs`). Here that's replaced with `tracing`, the
//! ecosystem's structured-logging crate, matching the rest of the
//! retrieval pack.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. Respects `RUST_LOG`; falls
/// back to `info` for this crate and `warn` for dependencies.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("emberkv=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
