//! Persistence hooks (spec.md §4.K). File formats are out of scope per the
//! spec's Non-goals; what's specified is the interface a command handler
//! calls into after a write succeeds, and one minimal concrete sink that
//! makes the server actually durable across a restart.

pub mod aof;
pub mod rdb;

pub use aof::AofSink;

use async_trait::async_trait;

use crate::error::LoadError;
use crate::server::ServerContext;

/// Called once per write command, after the store mutation has committed,
/// so a persistence backend can make it durable. Grounded on the teacher's
/// `aof.rs::feed_append_only_file`, generalized to a trait so RDB snapshotting
/// (not implemented) could be added alongside AOF without touching callers.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    fn append_command(&self, db_index: usize, argv: &[Vec<u8>]);

    /// Replays a previously-persisted command log against `server`, called
    /// once at startup before accepting connections (spec.md §4.K). The
    /// default does nothing, for sinks with no log to replay.
    async fn load(&self, _path: &str, _server: &ServerContext) -> Result<(), LoadError> {
        Ok(())
    }
}

/// A sink that discards everything, used when persistence is disabled.
pub struct NullPersistence;

impl PersistenceSink for NullPersistence {
    fn append_command(&self, _db_index: usize, _argv: &[Vec<u8>]) {}
}
