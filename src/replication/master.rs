//! Master-side replication: the replica registry, the backlog ring buffer,
//! and FULLRESYNC framing (spec.md §4.I).
//!
//! Grounded on `redis/client.rs::ReplState` (the teacher only defines the
//! enum, never drives it) and the magic bytes in `redis/rdb.rs`. The
//! replica registry and backlog are new — the teacher never implements
//! propagation — built the way the rest of this crate fans events out
//! (`events::EventBus`): a `Vec` of per-replica channels under a mutex.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::persistence::rdb::EMPTY_RDB;
use crate::protocol::Frame;
use crate::util::generate_run_id;

const BACKLOG_CAPACITY: usize = 1024 * 1024;

struct ReplicaHandle {
    id: u64,
    sender: UnboundedSender<Vec<u8>>,
}

pub struct MasterReplication {
    repl_id: String,
    offset: AtomicU64,
    replicas: Mutex<Vec<ReplicaHandle>>,
    backlog: Mutex<VecDeque<u8>>,
    next_replica_id: AtomicU64,
}

/// What a newly-registered replica needs to complete FULLRESYNC: the
/// `+FULLRESYNC` line, the RDB payload, and the channel it will receive
/// subsequent propagated writes on.
pub struct FullResync {
    pub repl_id: String,
    pub offset: u64,
    pub rdb: &'static [u8],
    pub stream: UnboundedReceiver<Vec<u8>>,
}

impl MasterReplication {
    pub fn new() -> Self {
        MasterReplication {
            repl_id: generate_run_id(),
            offset: AtomicU64::new(0),
            replicas: Mutex::new(Vec::new()),
            backlog: Mutex::new(VecDeque::new()),
            next_replica_id: AtomicU64::new(1),
        }
    }

    pub fn repl_id(&self) -> &str {
        &self.repl_id
    }

    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    /// Registers a new replica and returns everything needed to answer its
    /// PSYNC with a full resync.
    pub fn register_replica(&self) -> FullResync {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_replica_id.fetch_add(1, Ordering::Relaxed);
        self.replicas.lock().unwrap().push(ReplicaHandle { id, sender: tx });
        FullResync {
            repl_id: self.repl_id.clone(),
            offset: self.offset(),
            rdb: &EMPTY_RDB,
            stream: rx,
        }
    }

    pub fn unregister_replica(&self, id: u64) {
        self.replicas.lock().unwrap().retain(|r| r.id != id);
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.lock().unwrap().len()
    }

    /// Serializes `argv` as a RESP request, appends it to the backlog,
    /// advances the master offset, and fans it out to every connected
    /// replica in registration order.
    pub fn propagate(&self, argv: &[Vec<u8>]) {
        let mut buf = Vec::new();
        Frame::from_bulk_strs(argv.to_vec()).encode(&mut buf);

        self.offset.fetch_add(buf.len() as u64, Ordering::SeqCst);
        {
            let mut backlog = self.backlog.lock().unwrap();
            backlog.extend(buf.iter().copied());
            while backlog.len() > BACKLOG_CAPACITY {
                backlog.pop_front();
            }
        }

        let mut replicas = self.replicas.lock().unwrap();
        replicas.retain(|r| r.sender.send(buf.clone()).is_ok());
    }
}

impl Default for MasterReplication {
    fn default() -> Self {
        MasterReplication::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_replica_hands_back_current_offset_and_rdb() {
        let master = MasterReplication::new();
        master.propagate(&[b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]);
        let resync = master.register_replica();
        assert_eq!(resync.offset, master.offset());
        assert_eq!(resync.rdb, &EMPTY_RDB);
    }

    #[test]
    fn propagate_advances_offset_and_reaches_registered_replicas() {
        let master = MasterReplication::new();
        let resync = master.register_replica();
        master.propagate(&[b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]);
        assert!(master.offset() > 0);
        let mut rx = resync.stream;
        let got = rx.try_recv().unwrap();
        let mut expected = Vec::new();
        Frame::from_bulk_strs(vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()]).encode(&mut expected);
        assert_eq!(got, expected);
    }

    #[test]
    fn unregister_stops_further_delivery() {
        let master = MasterReplication::new();
        let resync = master.register_replica();
        master.unregister_replica(1);
        master.propagate(&[b"PING".to_vec()]);
        assert_eq!(master.replica_count(), 0);
        drop(resync);
    }
}
