//! `Range` header parsing.
//!
//! Only single byte ranges are understood. Anything else (multiple ranges,
//! non-numeric offsets, inverted bounds) is reported as "no range requested"
//! so the caller falls back to serving the whole resource.

/// A single requested byte interval. Both bounds are inclusive and either may
/// be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn is_partial(&self) -> bool {
        self.start.is_some()
    }
}

/// Parses a raw `Range` header value.
///
/// The unit before `=` is not validated; only the text after the last `=` is
/// inspected. Returns `None` when no usable range was requested.
pub fn parse_range(header: Option<&str>) -> Option<ByteRange> {
    let header = header?.trim();
    if header.is_empty() {
        return None;
    }

    let ranges = header.rsplit('=').next()?.trim();
    if ranges.contains(',') {
        return None;
    }

    let mut parts = ranges.split('-');
    let start = parse_offset(parts.next())?;
    let end = parse_offset(parts.next())?;
    if parts.next().is_some() {
        return None;
    }

    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return None;
        }
    }

    Some(ByteRange { start, end })
}

/// `Some(None)` for an absent or empty segment, `None` for garbage.
fn parse_offset(segment: Option<&str>) -> Option<Option<u64>> {
    match segment.map(str::trim) {
        None | Some("") => Some(None),
        Some(value) => value.parse::<u64>().ok().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_header_is_no_range() {
        assert_eq!(parse_range(None), None);
        assert_eq!(parse_range(Some("   ")), None);
    }

    #[test]
    fn explicit_range() {
        let range = parse_range(Some("bytes=0-1023")).expect("range");
        assert_eq!(range.start, Some(0));
        assert_eq!(range.end, Some(1023));
        assert!(range.is_partial());
    }

    #[test]
    fn open_ended_range() {
        let range = parse_range(Some("bytes=5-")).expect("range");
        assert_eq!(range.start, Some(5));
        assert_eq!(range.end, None);
    }

    #[test]
    fn suffix_only_has_no_start() {
        let range = parse_range(Some("bytes=-500")).expect("range");
        assert_eq!(range.start, None);
        assert_eq!(range.end, Some(500));
        assert!(!range.is_partial());
    }

    #[test]
    fn multiple_ranges_are_ignored() {
        assert_eq!(parse_range(Some("bytes=0-10,20-30")), None);
    }

    #[test]
    fn unit_is_not_validated() {
        let range = parse_range(Some("items=3-4")).expect("range");
        assert_eq!(range.start, Some(3));
        assert_eq!(range.end, Some(4));
    }

    #[test]
    fn malformed_offsets_degrade_to_no_range() {
        assert_eq!(parse_range(Some("bytes=abc-10")), None);
        assert_eq!(parse_range(Some("bytes=1-2-3")), None);
        assert_eq!(parse_range(Some("bytes=20-10")), None);
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let range = parse_range(Some("  bytes= 7 - 9 ")).expect("range");
        assert_eq!(range.start, Some(7));
        assert_eq!(range.end, Some(9));
    }
}
