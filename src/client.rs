//! Per-connection client state (spec.md §3 `ClientState`).
//!
//! Grounded on the teacher's `redis/client.rs::RedisClient`, trimmed to what
//! the spec actually needs: no `fd`/`query_buf`/`io_keys` fields since those
//! belong to the tokio connection task, not the client's logical state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::UnboundedSender;

use crate::protocol::Frame;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// One queued command inside a MULTI block, captured as raw argv so it can
/// be re-dispatched at EXEC time exactly as if it had just arrived.
pub struct QueuedCommand {
    pub argv: Vec<Vec<u8>>,
}

#[derive(Default)]
pub struct MultiState {
    pub active: bool,
    pub queue: Vec<QueuedCommand>,
    /// Set once any queued command fails validation (unknown command,
    /// wrong arity); EXEC then aborts without running anything.
    pub dirty: bool,
}

/// Replication role this connection plays, if any (spec.md §3, §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplRole {
    #[default]
    Normal,
    /// This connection is a replica receiving our command stream.
    Replica,
}

/// State carried for the lifetime of one client connection.
pub struct ClientState {
    pub id: u64,
    pub name: Option<String>,
    pub multi: MultiState,
    /// Keys under WATCH, paired with the version observed when watched.
    pub watched: Vec<(Vec<u8>, u64)>,
    /// Channels and patterns this client is subscribed to (spec.md §4.K).
    pub subscribed_channels: HashSet<Vec<u8>>,
    pub subscribed_patterns: HashSet<Vec<u8>>,
    pub repl_role: ReplRole,
    pub replica_listening_port: Option<u16>,
    /// Sender half of this connection's push channel. The connection task
    /// holds the matching receiver and interleaves frames arriving on it
    /// (pub/sub messages) with its own request/response replies.
    pub push_tx: UnboundedSender<Frame>,
    /// Set by QUIT; the connection task closes the socket after writing the
    /// reply rather than waiting for the peer to disconnect.
    pub should_close: bool,
}

impl ClientState {
    pub fn new(push_tx: UnboundedSender<Frame>) -> Self {
        ClientState {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            name: None,
            multi: MultiState::default(),
            watched: Vec::new(),
            subscribed_channels: HashSet::new(),
            subscribed_patterns: HashSet::new(),
            repl_role: ReplRole::Normal,
            should_close: false,
            replica_listening_port: None,
            push_tx,
        }
    }

    pub fn is_in_multi(&self) -> bool {
        self.multi.active
    }

    pub fn is_in_subscriber_context(&self) -> bool {
        !self.subscribed_channels.is_empty() || !self.subscribed_patterns.is_empty()
    }

    pub fn start_multi(&mut self) {
        self.multi.active = true;
        self.multi.queue.clear();
        self.multi.dirty = false;
    }

    pub fn discard_multi(&mut self) {
        self.multi = MultiState::default();
        self.watched.clear();
    }

    pub fn queue_command(&mut self, argv: Vec<Vec<u8>>) {
        self.multi.queue.push(QueuedCommand { argv });
    }

    pub fn watch(&mut self, key: Vec<u8>, version: u64) {
        if !self.watched.iter().any(|(k, _)| k == &key) {
            self.watched.push((key, version));
        }
    }

    pub fn unwatch(&mut self) {
        self.watched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> ClientState {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        ClientState::new(tx)
    }

    #[test]
    fn each_client_gets_a_distinct_id() {
        let a = test_client();
        let b = test_client();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn discard_clears_queue_and_watches() {
        let mut c = test_client();
        c.start_multi();
        c.queue_command(vec![b"PING".to_vec()]);
        c.watch(b"k".to_vec(), 0);
        c.discard_multi();
        assert!(!c.is_in_multi());
        assert!(c.multi.queue.is_empty());
        assert!(c.watched.is_empty());
    }

    #[test]
    fn watch_is_idempotent_per_key() {
        let mut c = test_client();
        c.watch(b"k".to_vec(), 1);
        c.watch(b"k".to_vec(), 1);
        assert_eq!(c.watched.len(), 1);
    }
}
