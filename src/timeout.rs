//! The periodic tick scheduler (spec.md §4.L).
//!
//! Grounded on `handler.rs::server_cron`, reimplemented as a
//! `tokio::time::interval` task instead of a callback registered with the
//! hand-rolled event loop (`ae.rs`).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use crate::server::ServerContext;

const TICK: Duration = Duration::from_millis(100);

/// Runs forever, reaping expired keys each tick. Blocked-client timeouts
/// are handled by each blocked task's own `tokio::time::timeout` future
/// rather than by this scheduler walking a client table (spec.md leaves
/// the mechanism open: "unpark it with the timeout reply" — here that's
/// just the awaited future resolving on its own deadline).
pub async fn run(server: Arc<ServerContext>) {
    let mut ticker = interval(TICK);
    loop {
        ticker.tick().await;
        server.db.reap_tick();
    }
}
