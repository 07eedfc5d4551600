//! MULTI/EXEC/WATCH (spec.md §4.F).
//!
//! The teacher has no transaction support; this is grounded on spec.md's
//! optimistic-locking rules, using the `Db`'s own per-key version counters
//! (spec.md §4.B) as the source of truth WATCH compares against, rather
//! than maintaining a second, parallel notion of versioning.

use crate::store::Db;

/// Checks whether any of `watched` has moved past the version it was
/// watched at. Called right before EXEC runs the queued commands.
pub fn watch_still_valid(db: &Db, watched: &[(Vec<u8>, u64)]) -> bool {
    watched
        .iter()
        .all(|(key, version)| db.version_of(key) == *version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ExpiryPolicy, Value};

    #[test]
    fn valid_when_nothing_touched() {
        let db = Db::new_with_null_sink();
        let v = db.version_of(b"k");
        assert!(watch_still_valid(&db, &[(b"k".to_vec(), v)]));
    }

    #[test]
    fn invalid_once_a_watched_key_is_written() {
        let db = Db::new_with_null_sink();
        let v = db.version_of(b"k");
        db.put(b"k", Value::Str(b"v".to_vec()), ExpiryPolicy::Never);
        assert!(!watch_still_valid(&db, &[(b"k".to_vec(), v)]));
    }

    #[test]
    fn invalid_once_a_watched_key_is_deleted() {
        let db = Db::new_with_null_sink();
        db.put(b"k", Value::Str(b"v".to_vec()), ExpiryPolicy::Never);
        let v = db.version_of(b"k");
        db.delete(b"k");
        assert!(!watch_still_valid(&db, &[(b"k".to_vec(), v)]));
    }
}
