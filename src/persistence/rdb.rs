//! Minimal RDB support: just enough to hand a replica a valid, empty
//! snapshot during full resync (spec.md §4.I, §6). The on-disk snapshot
//! format itself is out of scope per spec's Non-goals, so there is no
//! `rdb_save`/`rdb_load` beyond this fixed payload — unlike the teacher's
//! `redis/rdb.rs`, which implements real object serialization.

/// A well-formed, empty RDB file: the `REDIS0011` magic/version header, the
/// `0xFF` EOF opcode, and an 8-byte checksum (zero, meaning "unchecked").
/// 18 bytes total, matching spec.md §6's empty-RDB size.
pub const EMPTY_RDB: [u8; 18] = [
    b'R', b'E', b'D', b'I', b'S', b'0', b'0', b'1', b'1', 0xFF, 0, 0, 0, 0, 0, 0, 0, 0,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rdb_is_eighteen_bytes_with_expected_header() {
        assert_eq!(EMPTY_RDB.len(), 18);
        assert_eq!(&EMPTY_RDB[0..9], b"REDIS0011");
        assert_eq!(EMPTY_RDB[9], 0xFF);
    }
}
