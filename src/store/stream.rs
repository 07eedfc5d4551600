//! Stream values (spec.md §3 `StreamValue`, §4.C, §4.H "XADD id-assignment
//! rules"). Not present in the teacher repo at all — grounded on spec.md's
//! own textual rules plus the teacher's `redis/db.rs` entry-storage idiom
//! (a `BTreeMap`-backed ordered container keyed by a comparable id).

use crate::error::CommandError;

/// A stream entry id: milliseconds since epoch plus a per-millisecond
/// sequence number, ordered lexicographically on `(ms, seq)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn to_string(self) -> String {
        format!("{}-{}", self.ms, self.seq)
    }

    /// Parses a fully-specified `<ms>-<seq>` id (no wildcards).
    pub fn parse_exact(s: &str) -> Option<StreamId> {
        let (ms_str, seq_str) = s.split_once('-')?;
        let ms: u64 = ms_str.parse().ok()?;
        let seq: u64 = seq_str.parse().ok()?;
        Some(StreamId { ms, seq })
    }

    /// Parses a range endpoint as used by `XRANGE`/`XREAD`: `-` and `+` are
    /// the open bounds, a bare `<ms>` implies seq `0` (start) or `u64::MAX`
    /// (end) depending on which side it's used on.
    pub fn parse_range_bound(s: &str, is_start: bool) -> Option<StreamId> {
        match s {
            "-" => Some(StreamId::MIN),
            "+" => Some(StreamId::MAX),
            _ => {
                if let Some(id) = Self::parse_exact(s) {
                    return Some(id);
                }
                let ms: u64 = s.parse().ok()?;
                Some(StreamId {
                    ms,
                    seq: if is_start { 0 } else { u64::MAX },
                })
            }
        }
    }
}

/// Specifies how the caller wants a new entry's id assigned.
pub enum IdSpec {
    /// `*`: current time, sequence chosen to keep ids monotonic.
    Auto,
    /// `<ms>-*`: explicit millis, sequence chosen to keep ids monotonic.
    AutoSeq(u64),
    /// `<ms>-<seq>`: fully explicit.
    Explicit(StreamId),
}

impl IdSpec {
    pub fn parse(s: &str) -> Result<IdSpec, CommandError> {
        if s == "*" {
            return Ok(IdSpec::Auto);
        }
        if let Some((ms_str, seq_str)) = s.split_once('-') {
            let ms: u64 = ms_str.parse().map_err(|_| CommandError::Syntax)?;
            if seq_str == "*" {
                return Ok(IdSpec::AutoSeq(ms));
            }
            let seq: u64 = seq_str.parse().map_err(|_| CommandError::Syntax)?;
            return Ok(IdSpec::Explicit(StreamId { ms, seq }));
        }
        let ms: u64 = s.parse().map_err(|_| CommandError::Syntax)?;
        Ok(IdSpec::AutoSeq(ms))
    }
}

#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: StreamId,
    /// Field/value pairs in the order `XADD` received them.
    pub fields: Vec<(Vec<u8>, Vec<u8>)>,
}

#[derive(Default)]
pub struct StreamValue {
    entries: std::collections::BTreeMap<StreamId, Vec<(Vec<u8>, Vec<u8>)>>,
    last_id: StreamId,
}

impl StreamValue {
    pub fn new() -> Self {
        StreamValue {
            entries: std::collections::BTreeMap::new(),
            last_id: StreamId::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    /// Appends an entry, assigning its id per `spec`. Enforces that ids are
    /// strictly greater than `0-0` and strictly greater than the stream's
    /// current last id.
    pub fn append(
        &mut self,
        spec: IdSpec,
        fields: Vec<(Vec<u8>, Vec<u8>)>,
        now_ms: u64,
    ) -> Result<StreamId, CommandError> {
        let id = match spec {
            IdSpec::Auto => {
                if now_ms > self.last_id.ms {
                    StreamId { ms: now_ms, seq: 0 }
                } else {
                    StreamId {
                        ms: self.last_id.ms,
                        seq: self.last_id.seq + 1,
                    }
                }
            }
            IdSpec::AutoSeq(ms) => {
                if ms == self.last_id.ms {
                    StreamId {
                        ms,
                        seq: self.last_id.seq + 1,
                    }
                } else {
                    StreamId { ms, seq: 0 }
                }
            }
            IdSpec::Explicit(id) => id,
        };
        if id == StreamId::ZERO {
            return Err(CommandError::StreamIdZero);
        }
        if id <= self.last_id && !(self.last_id == StreamId::ZERO && self.entries.is_empty()) {
            return Err(CommandError::StreamIdTooSmall);
        }
        self.entries.insert(id, fields);
        self.last_id = id;
        Ok(id)
    }

    /// Inclusive range over `[start, end]`.
    pub fn range(&self, start: StreamId, end: StreamId) -> Vec<StreamEntry> {
        self.entries
            .range(start..=end)
            .map(|(id, fields)| StreamEntry {
                id: *id,
                fields: fields.clone(),
            })
            .collect()
    }

    /// Entries with id strictly greater than `after`, used by `XREAD`.
    pub fn after(&self, after: StreamId, count: Option<usize>) -> Vec<StreamEntry> {
        let iter = self
            .entries
            .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
            .map(|(id, fields)| StreamEntry {
                id: *id,
                fields: fields.clone(),
            });
        match count {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_id_uses_wall_clock_then_increments_seq_within_same_ms() {
        let mut s = StreamValue::new();
        let id1 = s.append(IdSpec::Auto, vec![], 1000).unwrap();
        assert_eq!(id1, StreamId { ms: 1000, seq: 0 });
        let id2 = s.append(IdSpec::Auto, vec![], 1000).unwrap();
        assert_eq!(id2, StreamId { ms: 1000, seq: 1 });
        let id3 = s.append(IdSpec::Auto, vec![], 2000).unwrap();
        assert_eq!(id3, StreamId { ms: 2000, seq: 0 });
    }

    #[test]
    fn explicit_id_must_exceed_last_id() {
        let mut s = StreamValue::new();
        s.append(IdSpec::Explicit(StreamId { ms: 5, seq: 0 }), vec![], 0)
            .unwrap();
        let err = s
            .append(IdSpec::Explicit(StreamId { ms: 5, seq: 0 }), vec![], 0)
            .unwrap_err();
        assert_eq!(err, CommandError::StreamIdTooSmall);
    }

    #[test]
    fn zero_zero_is_rejected() {
        let mut s = StreamValue::new();
        let err = s
            .append(IdSpec::Explicit(StreamId::ZERO), vec![], 0)
            .unwrap_err();
        assert_eq!(err, CommandError::StreamIdZero);
    }

    #[test]
    fn range_is_inclusive_and_ordered() {
        let mut s = StreamValue::new();
        s.append(IdSpec::Explicit(StreamId { ms: 1, seq: 0 }), vec![], 0)
            .unwrap();
        s.append(IdSpec::Explicit(StreamId { ms: 2, seq: 0 }), vec![], 0)
            .unwrap();
        s.append(IdSpec::Explicit(StreamId { ms: 3, seq: 0 }), vec![], 0)
            .unwrap();
        let got = s.range(StreamId { ms: 1, seq: 0 }, StreamId { ms: 2, seq: 0 });
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn after_excludes_the_given_id() {
        let mut s = StreamValue::new();
        let id1 = s.append(IdSpec::Auto, vec![], 100).unwrap();
        s.append(IdSpec::Auto, vec![], 100).unwrap();
        let got = s.after(id1, None);
        assert_eq!(got.len(), 1);
    }
}
