//! Small timestamp and pattern-matching helpers shared across modules.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

/// Glob match supporting `*` (any run of bytes) and `?` (single byte), used
/// by `KEYS <pattern>`.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    glob_match_inner(pattern, text)
}

fn glob_match_inner(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(b'*') => {
            // collapse consecutive '*'
            let mut rest = pattern;
            while rest.first() == Some(&b'*') {
                rest = &rest[1..];
            }
            if rest.is_empty() {
                return true;
            }
            for i in 0..=text.len() {
                if glob_match_inner(rest, &text[i..]) {
                    return true;
                }
            }
            false
        }
        Some(b'?') => !text.is_empty() && glob_match_inner(&pattern[1..], &text[1..]),
        Some(c) => text.first() == Some(c) && glob_match_inner(&pattern[1..], &text[1..]),
    }
}

/// Generates a stable-looking 40 hex character replication id, analogous to
/// Redis's `run_id` generated once at server start.
pub fn generate_run_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 20] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_star_and_question() {
        assert!(glob_match(b"*", b"anything"));
        assert!(glob_match(b"h?llo", b"hello"));
        assert!(!glob_match(b"h?llo", b"heello"));
        assert!(glob_match(b"foo*bar", b"foobazbar"));
        assert!(!glob_match(b"foo*bar", b"foobaz"));
    }

    #[test]
    fn run_id_is_forty_hex_chars() {
        let id = generate_run_id();
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
