//! The typed key-value store (spec.md §3 `StoredValue`, §4.B/§4.C).
//!
//! Grounded on the teacher's `redis/db.rs` (sharded dict + expires table)
//! and `redis/obj.rs` (tagged value object). Sharding is kept; the single
//! giant `Mutex<HashMap>` that `redis/db.rs` protects with one lock is split
//! here into `N` independently-locked shards so unrelated keys don't
//! contend, the way `server.rs` already shards the connection table.

pub mod expire;
pub mod list;
pub mod stream;
pub mod zset;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::CommandError;
use crate::events::{EventSink, NullSink};
use crate::util::now_millis;

pub use expire::ExpiryPolicy;
pub use list::ListValue;
pub use stream::StreamValue;
pub use zset::ZSetValue;

const SHARD_COUNT: usize = 16;

/// The tagged value a key can hold (spec.md §3 `StoredValue`).
pub enum Value {
    Str(Vec<u8>),
    List(ListValue),
    Stream(StreamValue),
    ZSet(ZSetValue),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Stream(_) => "stream",
            Value::ZSet(_) => "zset",
        }
    }
}

struct Entry {
    value: Value,
    expiry: ExpiryPolicy,
}

/// Outcome of a `compute` closure: the caller's result plus whether the
/// store actually changed, which decides whether the version counter is
/// bumped and an event fires. Compute closures that merely read (a failed
/// type check, a no-op DEL of a missing key) set `changed: false`.
pub struct Mutation<R> {
    pub result: R,
    pub changed: bool,
}

impl<R> Mutation<R> {
    pub fn changed(result: R) -> Self {
        Mutation { result, changed: true }
    }

    pub fn unchanged(result: R) -> Self {
        Mutation { result, changed: false }
    }
}

#[derive(Default)]
struct Shard {
    entries: HashMap<Vec<u8>, Entry>,
    /// Per-key version counters for WATCH, kept even after the key is
    /// deleted so a later WATCH on an absent key still observes version 0
    /// until something creates or would-have-modified it.
    versions: HashMap<Vec<u8>, u64>,
}

pub struct Db {
    shards: Vec<RwLock<Shard>>,
    sink: Arc<dyn EventSink>,
}

fn shard_index(key: &[u8]) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in key {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash as usize) % SHARD_COUNT
}

impl Db {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(RwLock::new(Shard::default()));
        }
        Db { shards, sink }
    }

    pub fn new_with_null_sink() -> Self {
        Db::new(Arc::new(NullSink))
    }

    fn shard(&self, key: &[u8]) -> &RwLock<Shard> {
        &self.shards[shard_index(key)]
    }

    /// The version WATCH should record for `key` right now.
    pub fn version_of(&self, key: &[u8]) -> u64 {
        let shard = self.shard(key).read().unwrap();
        shard.versions.get(key).copied().unwrap_or(0)
    }

    /// Reaps `key` if its TTL has passed, without requiring a caller to
    /// already hold the write lock. Called from both read and write paths
    /// and from the periodic timeout tick (spec.md §4.D).
    fn reap_if_expired_locked(shard: &mut Shard, key: &[u8], now: u64) -> bool {
        let expired = matches!(shard.entries.get(key), Some(e) if e.expiry.is_expired_at(now));
        if expired {
            shard.entries.remove(key);
            *shard.versions.entry(key.to_vec()).or_insert(0) += 1;
        }
        expired
    }

    /// The one atomic mutator every command handler funnels through
    /// (spec.md §4.B "Atomic mutators"). `f` receives the live value (after
    /// lazy expiry has been applied) and may replace it with `None` to
    /// delete the key.
    pub fn compute<R>(&self, key: &[u8], f: impl FnOnce(&mut Option<Value>) -> Mutation<R>) -> R {
        let now = now_millis();
        let mut shard = self.shard(key).write().unwrap();
        Self::reap_if_expired_locked(&mut shard, key, now);

        let existed_before = shard.entries.contains_key(key);
        let expiry = shard
            .entries
            .get(key)
            .map(|e| e.expiry)
            .unwrap_or(ExpiryPolicy::Never);
        let mut slot = shard.entries.remove(key).map(|e| e.value);
        let Mutation { result, changed } = f(&mut slot);

        if changed {
            *shard.versions.entry(key.to_vec()).or_insert(0) += 1;
        }

        match slot {
            Some(value) => {
                shard.entries.insert(key.to_vec(), Entry { value, expiry });
                if changed {
                    drop(shard);
                    self.sink.data_added(key);
                }
            }
            None => {
                drop(shard);
                if changed && existed_before {
                    self.sink.data_removed(key);
                } else if changed {
                    self.sink.data_added(key);
                }
            }
        }
        result
    }

    /// Unconditionally overwrites `key` with `value`, replacing whatever
    /// expiry state it had with `expiry` — including clearing a previous
    /// TTL when `expiry` is `Never`. Used by SET and SET-with-PX.
    pub fn put(&self, key: &[u8], value: Value, expiry: ExpiryPolicy) {
        self.compute(key, |slot| {
            *slot = Some(value);
            Mutation::changed(())
        });
        self.set_expiry(key, expiry);
    }

    pub fn set_expiry(&self, key: &[u8], expiry: ExpiryPolicy) -> bool {
        let now = now_millis();
        let mut shard = self.shard(key).write().unwrap();
        Self::reap_if_expired_locked(&mut shard, key, now);
        match shard.entries.get_mut(key) {
            Some(e) => {
                e.expiry = expiry;
                true
            }
            None => false,
        }
    }

    pub fn ttl_millis(&self, key: &[u8]) -> Option<i64> {
        let now = now_millis();
        let mut shard = self.shard(key).write().unwrap();
        Self::reap_if_expired_locked(&mut shard, key, now);
        shard.entries.get(key).map(|e| match e.expiry {
            ExpiryPolicy::Never => -1,
            ExpiryPolicy::AtEpochMillis(at) => (at as i64 - now as i64).max(0),
        })
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        let now = now_millis();
        let mut shard = self.shard(key).write().unwrap();
        Self::reap_if_expired_locked(&mut shard, key, now);
        shard.entries.contains_key(key)
    }

    pub fn type_name(&self, key: &[u8]) -> Option<&'static str> {
        let now = now_millis();
        let mut shard = self.shard(key).write().unwrap();
        Self::reap_if_expired_locked(&mut shard, key, now);
        shard.entries.get(key).map(|e| e.value.type_name())
    }

    /// Deletes `key` if present. Returns whether it was.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.compute(key, |slot| {
            let was_present = slot.is_some();
            *slot = None;
            Mutation {
                result: was_present,
                changed: was_present,
            }
        })
    }

    /// Periodic-reaping tick (spec.md §4.L): walks every shard, removes
    /// anything past its deadline, and publishes `data_removed` for each.
    /// Run from `timeout::run` rather than triggered by client access.
    pub fn reap_tick(&self) {
        let now = now_millis();
        let mut removed = Vec::new();
        for shard_lock in &self.shards {
            let mut shard = shard_lock.write().unwrap();
            let expired: Vec<Vec<u8>> = shard
                .entries
                .iter()
                .filter(|(_, e)| e.expiry.is_expired_at(now))
                .map(|(k, _)| k.clone())
                .collect();
            for k in &expired {
                shard.entries.remove(k);
                *shard.versions.entry(k.clone()).or_insert(0) += 1;
            }
            removed.extend(expired);
        }
        for key in &removed {
            self.sink.data_removed(key);
        }
    }

    /// All live (non-expired) keys matching `pattern` (spec.md §4.B scan).
    /// Lazily reaps anything it walks past that has expired.
    pub fn keys_matching(&self, pattern: &[u8]) -> Vec<Vec<u8>> {
        let now = now_millis();
        let mut out = Vec::new();
        for shard_lock in &self.shards {
            let mut shard = shard_lock.write().unwrap();
            let expired: Vec<Vec<u8>> = shard
                .entries
                .iter()
                .filter(|(_, e)| e.expiry.is_expired_at(now))
                .map(|(k, _)| k.clone())
                .collect();
            for k in &expired {
                shard.entries.remove(k);
                *shard.versions.entry(k.clone()).or_insert(0) += 1;
            }
            out.extend(
                shard
                    .entries
                    .keys()
                    .filter(|k| crate::util::glob_match(pattern, k))
                    .cloned(),
            );
        }
        out
    }

    // -- Typed read/write helpers -------------------------------------

    pub fn get_string(&self, key: &[u8]) -> Result<Option<Vec<u8>>, CommandError> {
        let now = now_millis();
        let mut shard = self.shard(key).write().unwrap();
        Self::reap_if_expired_locked(&mut shard, key, now);
        match shard.entries.get(key) {
            None => Ok(None),
            Some(Entry { value: Value::Str(s), .. }) => Ok(Some(s.clone())),
            Some(_) => Err(CommandError::WrongType),
        }
    }

    /// Runs `f` against the list at `key`, creating an empty one first if
    /// absent and `create_if_missing` is set (LPUSH/RPUSH semantics vs.
    /// LPUSHX/RPUSHX). Deletes the key afterward if the list is left empty.
    /// `mutates` controls whether this call bumps the key's WATCH version
    /// and wakes blocked waiters — `false` for read-only accessors like
    /// LRANGE/LLEN, `true` for anything that can change the list's contents.
    pub fn with_list<R>(
        &self,
        key: &[u8],
        create_if_missing: bool,
        mutates: bool,
        f: impl FnOnce(&mut ListValue) -> R,
    ) -> Result<Option<R>, CommandError> {
        self.compute(key, |slot| {
            match slot {
                Some(Value::List(_)) => {}
                Some(_) => return Mutation::unchanged(Err(CommandError::WrongType)),
                None => {
                    if !create_if_missing {
                        return Mutation::unchanged(Ok(None));
                    }
                    *slot = Some(Value::List(ListValue::new()));
                }
            }
            let list = match slot.as_mut().unwrap() {
                Value::List(l) => l,
                _ => unreachable!(),
            };
            let result = f(list);
            let now_empty = list.is_empty();
            if now_empty {
                *slot = None;
            }
            Mutation { result: Ok(Some(result)), changed: mutates }
        })
    }

    pub fn with_zset<R>(
        &self,
        key: &[u8],
        create_if_missing: bool,
        mutates: bool,
        f: impl FnOnce(&mut ZSetValue) -> R,
    ) -> Result<Option<R>, CommandError> {
        self.compute(key, |slot| {
            match slot {
                Some(Value::ZSet(_)) => {}
                Some(_) => return Mutation::unchanged(Err(CommandError::WrongType)),
                None => {
                    if !create_if_missing {
                        return Mutation::unchanged(Ok(None));
                    }
                    *slot = Some(Value::ZSet(ZSetValue::new()));
                }
            }
            let zset = match slot.as_mut().unwrap() {
                Value::ZSet(z) => z,
                _ => unreachable!(),
            };
            let result = f(zset);
            let now_empty = zset.is_empty();
            if now_empty {
                *slot = None;
            }
            Mutation { result: Ok(Some(result)), changed: mutates }
        })
    }

    pub fn with_stream<R>(
        &self,
        key: &[u8],
        create_if_missing: bool,
        mutates: bool,
        f: impl FnOnce(&mut StreamValue) -> R,
    ) -> Result<Option<R>, CommandError> {
        self.compute(key, |slot| {
            match slot {
                Some(Value::Stream(_)) => {}
                Some(_) => return Mutation::unchanged(Err(CommandError::WrongType)),
                None => {
                    if !create_if_missing {
                        return Mutation::unchanged(Ok(None));
                    }
                    *slot = Some(Value::Stream(StreamValue::new()));
                }
            }
            let stream = match slot.as_mut().unwrap() {
                Value::Stream(s) => s,
                _ => unreachable!(),
            };
            let result = f(stream);
            Mutation { result: Ok(Some(result)), changed: mutates }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get_string_roundtrip() {
        let db = Db::new_with_null_sink();
        db.put(b"k", Value::Str(b"v".to_vec()), ExpiryPolicy::Never);
        assert_eq!(db.get_string(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn wrong_type_on_string_accessed_as_list() {
        let db = Db::new_with_null_sink();
        db.put(b"k", Value::Str(b"v".to_vec()), ExpiryPolicy::Never);
        let err = db.with_list(b"k", true, true, |_| {}).unwrap_err();
        assert_eq!(err, CommandError::WrongType);
    }

    #[test]
    fn expired_key_reaps_lazily() {
        let db = Db::new_with_null_sink();
        db.put(b"k", Value::Str(b"v".to_vec()), ExpiryPolicy::AtEpochMillis(1));
        assert!(!db.exists(b"k"));
        assert_eq!(db.get_string(b"k").unwrap(), None);
    }

    #[test]
    fn version_bumps_on_write_and_survives_deletion() {
        let db = Db::new_with_null_sink();
        let v0 = db.version_of(b"k");
        db.put(b"k", Value::Str(b"v".to_vec()), ExpiryPolicy::Never);
        let v1 = db.version_of(b"k");
        assert!(v1 > v0);
        db.delete(b"k");
        let v2 = db.version_of(b"k");
        assert!(v2 > v1);
    }

    #[test]
    fn lpushx_is_a_noop_on_missing_key() {
        let db = Db::new_with_null_sink();
        let v0 = db.version_of(b"k");
        let result = db.with_list(b"k", false, false, |l| l.len()).unwrap();
        assert!(result.is_none());
        assert_eq!(db.version_of(b"k"), v0);
    }

    #[test]
    fn list_key_deleted_once_emptied() {
        let db = Db::new_with_null_sink();
        db.with_list(b"k", true, true, |l| l.push_tail(vec![b"a".to_vec()]))
            .unwrap();
        assert!(db.exists(b"k"));
        db.with_list(b"k", true, true, |l| l.pop_head()).unwrap();
        assert!(!db.exists(b"k"));
    }

    #[test]
    fn keys_matching_filters_by_glob() {
        let db = Db::new_with_null_sink();
        db.put(b"foo1", Value::Str(b"v".to_vec()), ExpiryPolicy::Never);
        db.put(b"foo2", Value::Str(b"v".to_vec()), ExpiryPolicy::Never);
        db.put(b"bar", Value::Str(b"v".to_vec()), ExpiryPolicy::Never);
        let mut got = db.keys_matching(b"foo*");
        got.sort();
        assert_eq!(got, vec![b"foo1".to_vec(), b"foo2".to_vec()]);
    }
}
