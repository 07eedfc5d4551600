//! The RESP wire codec (spec.md §4.A).
//!
//! Grounded on the inline/multibulk parsing the teacher hand-rolls inline in
//! `redis/client.rs::process_input_buf` (there the query buffer is a `String`
//! split on `\n`, which is not binary safe). Here framing is driven entirely
//! by declared lengths, never by newline scanning, so bulk payloads may
//! contain arbitrary bytes including embedded CRLF.

use bytes::{Buf, BytesMut};

use crate::error::ProtocolError;

/// Maximum size accepted for a single bulk-string payload or array arity,
/// guarding against a hostile or broken peer claiming an enormous length.
pub const MAX_FRAME_LEN: i64 = 512 * 1024 * 1024;

/// A parsed reply/request frame. Requests from clients are always
/// `Frame::Array` of `Frame::Bulk`; the other variants are used when
/// serializing replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    NullBulk,
    Array(Vec<Frame>),
    NullArray,
    /// Already-encoded bytes, written verbatim with no further framing.
    /// Used for the `+FULLRESYNC ...` line and RDB payload during full
    /// resync (spec.md §4.I), which don't fit the other reply shapes.
    Raw(Vec<u8>),
}

impl Frame {
    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    pub fn from_bulk_strs<I, S>(items: I) -> Frame
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        Frame::Array(items.into_iter().map(|s| Frame::Bulk(s.into())).collect())
    }

    /// Serializes this frame into `out`, appending to whatever's there.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Error(s) => {
                out.push(b'-');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                out.push(b':');
                out.extend_from_slice(n.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Frame::Bulk(b) => {
                out.push(b'$');
                out.extend_from_slice(b.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(b);
                out.extend_from_slice(b"\r\n");
            }
            Frame::NullBulk => out.extend_from_slice(b"$-1\r\n"),
            Frame::Raw(bytes) => out.extend_from_slice(bytes),
            Frame::NullArray => out.extend_from_slice(b"*-1\r\n"),
            Frame::Array(items) => {
                out.push(b'*');
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
            }
        }
    }

    /// Encodes a raw bulk-string header with no trailing CRLF after the
    /// payload, used once for the RDB transfer during full resync
    /// (spec.md §4.A, §4.I).
    pub fn encode_raw_bulk(payload: &[u8], out: &mut Vec<u8>) {
        out.push(b'$');
        out.extend_from_slice(payload.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(payload);
    }
}

/// Result of attempting to parse one frame out of a buffer.
pub enum ParseOutcome {
    Complete(Frame),
    NeedMore,
}

/// Parses a single top-level request frame (an array of bulk strings) out of
/// `buf`, consuming the bytes it used on success. Leaves `buf` untouched on
/// `NeedMore` so the caller can append more bytes and retry.
pub fn parse_request(buf: &mut BytesMut) -> Result<ParseOutcome, ProtocolError> {
    let mut cursor = 0usize;
    match parse_frame(buf, &mut cursor)? {
        Some(frame) => {
            match &frame {
                Frame::Array(items) => {
                    if !items.iter().all(|f| matches!(f, Frame::Bulk(_))) {
                        return Err(ProtocolError::NotAnArrayOfBulkStrings);
                    }
                }
                _ => return Err(ProtocolError::NotAnArrayOfBulkStrings),
            }
            buf.advance(cursor);
            Ok(ParseOutcome::Complete(frame))
        }
        None => Ok(ParseOutcome::NeedMore),
    }
}

/// Parses one frame starting at `*cursor`, advancing `*cursor` past it on
/// success. Returns `Ok(None)` if the buffer doesn't yet hold a complete
/// frame at this position (the caller should wait for more bytes and retry
/// from scratch — `cursor` is not meaningful across `NeedMore`).
fn parse_frame(buf: &[u8], cursor: &mut usize) -> Result<Option<Frame>, ProtocolError> {
    let Some(line_end) = find_crlf(&buf[*cursor..]) else {
        return Ok(None);
    };
    if buf.len() <= *cursor {
        return Ok(None);
    }
    let prefix = buf[*cursor];
    let line = &buf[*cursor + 1..*cursor + line_end];
    let after_line = *cursor + line_end + 2;

    match prefix {
        b'*' => {
            let n = parse_len(line, ProtocolError::InvalidMultibulkLength)?;
            *cursor = after_line;
            if n < 0 {
                return Ok(Some(Frame::NullArray));
            }
            let n = n as usize;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                match parse_frame(buf, cursor)? {
                    Some(item) => items.push(item),
                    None => return Ok(None),
                }
            }
            Ok(Some(Frame::Array(items)))
        }
        b'$' => {
            let n = parse_len(line, ProtocolError::InvalidBulkLength)?;
            if n < 0 {
                *cursor = after_line;
                return Ok(Some(Frame::NullBulk));
            }
            let n = n as usize;
            if buf.len() < after_line + n + 2 {
                return Ok(None);
            }
            let payload = buf[after_line..after_line + n].to_vec();
            *cursor = after_line + n + 2;
            Ok(Some(Frame::Bulk(payload)))
        }
        b'+' => {
            *cursor = after_line;
            Ok(Some(Frame::Simple(
                String::from_utf8_lossy(line).into_owned(),
            )))
        }
        b'-' => {
            *cursor = after_line;
            Ok(Some(Frame::Error(String::from_utf8_lossy(line).into_owned())))
        }
        b':' => {
            *cursor = after_line;
            let s = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidBulkLength)?;
            let n: i64 = s.parse().map_err(|_| ProtocolError::InvalidBulkLength)?;
            Ok(Some(Frame::Integer(n)))
        }
        other => Err(ProtocolError::UnexpectedPrefix(other as char)),
    }
}

fn parse_len(line: &[u8], on_error: ProtocolError) -> Result<i64, ProtocolError> {
    let s = std::str::from_utf8(line).map_err(|_| on_error.clone())?;
    let n: i64 = s.parse().map_err(|_| on_error.clone())?;
    if n < -1 || n > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge);
    }
    Ok(n)
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf_of(s: &[u8]) -> BytesMut {
        let mut b = BytesMut::new();
        b.extend_from_slice(s);
        b
    }

    #[test]
    fn parses_complete_array_of_bulk_strings() {
        let mut buf = buf_of(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Complete(Frame::Array(items)) => {
                assert_eq!(items, vec![Frame::Bulk(b"GET".to_vec()), Frame::Bulk(b"foo".to_vec())]);
            }
            _ => panic!("expected complete array"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn reports_need_more_on_partial_frame() {
        let mut buf = buf_of(b"*2\r\n$3\r\nGET\r\n$3\r\nfo");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::NeedMore => {}
            _ => panic!("expected NeedMore"),
        }
        // nothing consumed
        assert_eq!(&buf[..], b"*2\r\n$3\r\nGET\r\n$3\r\nfo");
    }

    #[test]
    fn is_binary_safe_across_embedded_crlf() {
        let mut buf = buf_of(b"*1\r\n$6\r\na\r\nb\r\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Complete(Frame::Array(items)) => {
                assert_eq!(items, vec![Frame::Bulk(b"a\r\nb\r".to_vec())]);
            }
            _ => panic!("expected complete array"),
        }
    }

    #[test]
    fn rejects_negative_length_other_than_nil() {
        let mut buf = buf_of(b"*1\r\n$-2\r\n");
        assert!(parse_request(&mut buf).is_err());
    }

    #[test]
    fn encodes_nested_arrays() {
        let frame = Frame::Array(vec![Frame::Integer(1), Frame::Bulk(b"hi".to_vec()), Frame::NullBulk]);
        let mut out = Vec::new();
        frame.encode(&mut out);
        assert_eq!(out, b"*3\r\n:1\r\n$2\r\nhi\r\n$-1\r\n".to_vec());
    }

    #[test]
    fn encodes_raw_bulk_without_trailing_crlf() {
        let mut out = Vec::new();
        Frame::encode_raw_bulk(b"REDIS0011", &mut out);
        assert_eq!(out, b"$9\r\nREDIS0011".to_vec());
    }
}
