//! `QuickZSet` (spec.md §3 `SortedSetValue`, §4.C): a sorted set indexed two
//! ways — member→score and score→ordered members — rather than the
//! teacher's classic skiplist (`redis/skiplist.rs`). spec.md mandates this
//! shape explicitly, so the skiplist is read only for rank/iteration idiom,
//! not reused as the backing structure.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Total-ordered wrapper around `f64` so it can key a `BTreeMap`. Redis
/// scores are never NaN in practice (callers reject it at the command
/// layer), so `total_cmp` gives a consistent order without needing to
/// special-case NaN here.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Score(f64);

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Default)]
pub struct ZSetValue {
    scores: HashMap<Vec<u8>, f64>,
    by_score: BTreeMap<Score, Vec<Vec<u8>>>,
}

impl ZSetValue {
    pub fn new() -> Self {
        ZSetValue {
            scores: HashMap::new(),
            by_score: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    fn remove_from_index(&mut self, member: &[u8], score: f64) {
        if let Some(members) = self.by_score.get_mut(&Score(score)) {
            members.retain(|m| m != member);
            if members.is_empty() {
                self.by_score.remove(&Score(score));
            }
        }
    }

    /// Inserts `member` into its score bucket at the position that keeps
    /// the bucket ordered ascending by byte comparison.
    fn insert_sorted(&mut self, score: f64, member: Vec<u8>) {
        let bucket = self.by_score.entry(Score(score)).or_default();
        let pos = bucket.binary_search(&member).unwrap_or_else(|i| i);
        bucket.insert(pos, member);
    }

    /// Inserts or updates `member`'s score. Returns `true` if `member` is
    /// new to the set.
    pub fn add(&mut self, member: Vec<u8>, score: f64) -> bool {
        let is_new = match self.scores.insert(member.clone(), score) {
            Some(old_score) => {
                if old_score != score {
                    self.remove_from_index(&member, old_score);
                    self.insert_sorted(score, member);
                }
                false
            }
            None => {
                self.insert_sorted(score, member);
                true
            }
        };
        is_new
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.remove_from_index(member, score);
                true
            }
            None => false,
        }
    }

    fn iter_ordered(&self) -> impl Iterator<Item = (&Vec<u8>, f64)> {
        self.by_score
            .iter()
            .flat_map(|(s, members)| members.iter().map(move |m| (m, s.0)))
    }

    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        self.iter_ordered().position(|(m, _)| m.as_slice() == member)
    }

    /// Inclusive range by rank, supporting negative indices like `LRANGE`.
    pub fn range_by_rank(&self, start: i64, end: i64) -> Vec<(Vec<u8>, f64)> {
        let len = self.len() as i64;
        if len == 0 {
            return Vec::new();
        }
        let mut s = if start < 0 { (len + start).max(0) } else { start };
        let mut e = if end < 0 { len + end } else { end };
        if s < 0 {
            s = 0;
        }
        if e >= len {
            e = len - 1;
        }
        if s > e || s >= len || e < 0 {
            return Vec::new();
        }
        self.iter_ordered()
            .skip(s as usize)
            .take((e - s + 1) as usize)
            .map(|(m, sc)| (m.clone(), sc))
            .collect()
    }

    /// Inclusive range by score.
    pub fn range_by_score(&self, min: f64, max: f64) -> Vec<(Vec<u8>, f64)> {
        self.by_score
            .range(Score(min)..=Score(max))
            .flat_map(|(s, members)| members.iter().map(move |m| (m.clone(), s.0)))
            .collect()
    }

    pub fn pop_min(&mut self) -> Option<(Vec<u8>, f64)> {
        let (score, member) = {
            let (score, members) = self.by_score.iter().next()?;
            (score.0, members[0].clone())
        };
        self.remove(&member);
        Some((member, score))
    }

    pub fn pop_max(&mut self) -> Option<(Vec<u8>, f64)> {
        let (score, member) = {
            let (score, members) = self.by_score.iter().next_back()?;
            (score.0, members[0].clone())
        };
        self.remove(&member);
        Some((member, score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_orders_by_score_then_tracks_rank() {
        let mut z = ZSetValue::new();
        assert!(z.add(b"a".to_vec(), 3.0));
        assert!(z.add(b"b".to_vec(), 1.0));
        assert!(z.add(b"c".to_vec(), 2.0));
        assert_eq!(
            z.range_by_rank(0, -1),
            vec![(b"b".to_vec(), 1.0), (b"c".to_vec(), 2.0), (b"a".to_vec(), 3.0)]
        );
        assert_eq!(z.rank(b"a"), Some(2));
    }

    #[test]
    fn members_sharing_a_score_are_ordered_by_bytes() {
        let mut z = ZSetValue::new();
        z.add(b"b".to_vec(), 1.0);
        z.add(b"a".to_vec(), 1.0);
        z.add(b"c".to_vec(), 1.0);
        assert_eq!(
            z.range_by_rank(0, -1),
            vec![
                (b"a".to_vec(), 1.0),
                (b"b".to_vec(), 1.0),
                (b"c".to_vec(), 1.0),
            ]
        );
    }

    #[test]
    fn re_adding_with_new_score_moves_index() {
        let mut z = ZSetValue::new();
        z.add(b"a".to_vec(), 1.0);
        assert!(!z.add(b"a".to_vec(), 5.0));
        assert_eq!(z.score(b"a"), Some(5.0));
        assert_eq!(z.rank(b"a"), Some(0));
    }

    #[test]
    fn remove_clears_both_indices() {
        let mut z = ZSetValue::new();
        z.add(b"a".to_vec(), 1.0);
        assert!(z.remove(b"a"));
        assert!(z.score(b"a").is_none());
        assert!(z.is_empty());
        assert!(!z.remove(b"a"));
    }

    #[test]
    fn range_by_score_is_inclusive() {
        let mut z = ZSetValue::new();
        z.add(b"a".to_vec(), 1.0);
        z.add(b"b".to_vec(), 2.0);
        z.add(b"c".to_vec(), 3.0);
        assert_eq!(
            z.range_by_score(1.0, 2.0),
            vec![(b"a".to_vec(), 1.0), (b"b".to_vec(), 2.0)]
        );
    }

    #[test]
    fn pop_min_and_max() {
        let mut z = ZSetValue::new();
        z.add(b"a".to_vec(), 1.0);
        z.add(b"b".to_vec(), 2.0);
        assert_eq!(z.pop_min(), Some((b"a".to_vec(), 1.0)));
        assert_eq!(z.pop_max(), Some((b"b".to_vec(), 2.0)));
        assert!(z.is_empty());
    }
}
