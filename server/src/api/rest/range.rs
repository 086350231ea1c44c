//! `Range: bytes=...` header parsing, per the HTTP/1.1 `bytes` unit grammar,
//! restricted to a single range (the only form the spec and any client here
//! ever sends). Malformed or unsatisfiable headers are ignored rather than
//! rejected: the caller falls back to a whole-object response.

use crate::storage::ByteRange;

/// Parse a `Range` header value against a known `total_size`. Returns `None`
/// for anything malformed, multi-range, or out of bounds — the caller should
/// treat that as "no range requested".
pub fn parse_range_header(value: &str, total_size: u64) -> Option<ByteRange> {
    if total_size == 0 {
        return None;
    }

    let spec = value.strip_prefix("bytes=")?;
    if spec.contains(',') {
        // Multi-range requests aren't supported; fall back to whole-object.
        return None;
    }

    let (start_str, end_str) = spec.split_once('-')?;

    if start_str.is_empty() {
        // Suffix form: "bytes=-500" means the last 500 bytes.
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        let suffix_len = suffix_len.min(total_size);
        return Some(ByteRange {
            start: total_size - suffix_len,
            end: total_size - 1,
        });
    }

    let start: u64 = start_str.parse().ok()?;
    if start >= total_size {
        return None;
    }

    let end: u64 = if end_str.is_empty() {
        total_size - 1
    } else {
        let parsed: u64 = end_str.parse().ok()?;
        parsed.min(total_size - 1)
    };

    if end < start {
        return None;
    }

    Some(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_closed_range() {
        let r = parse_range_header("bytes=7-11", 13).unwrap();
        assert_eq!((r.start, r.end), (7, 11));
    }

    #[test]
    fn parses_open_ended_range() {
        let r = parse_range_header("bytes=7-", 13).unwrap();
        assert_eq!((r.start, r.end), (7, 12));
    }

    #[test]
    fn parses_suffix_range() {
        let r = parse_range_header("bytes=-5", 13).unwrap();
        assert_eq!((r.start, r.end), (8, 12));
    }

    #[test]
    fn suffix_longer_than_total_clamps_to_whole_object() {
        let r = parse_range_header("bytes=-500", 13).unwrap();
        assert_eq!((r.start, r.end), (0, 12));
    }

    #[test]
    fn end_past_total_clamps() {
        let r = parse_range_header("bytes=0-999", 13).unwrap();
        assert_eq!((r.start, r.end), (0, 12));
    }

    #[test]
    fn start_past_total_is_unsatisfiable() {
        assert!(parse_range_header("bytes=100-200", 13).is_none());
    }

    #[test]
    fn malformed_falls_back_to_whole_object() {
        assert!(parse_range_header("not-a-range", 13).is_none());
        assert!(parse_range_header("bytes=", 13).is_none());
        assert!(parse_range_header("bytes=a-b", 13).is_none());
    }

    #[test]
    fn multi_range_is_unsupported() {
        assert!(parse_range_header("bytes=0-1,3-4", 13).is_none());
    }
}
