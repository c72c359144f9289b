//! Parse HTTP response header lines collected by curl.

/// Parsed `Content-Range` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    /// Inclusive `(start, end)`; `None` for the unsatisfied form `bytes */N`.
    pub span: Option<(u64, u64)>,
    /// Full resource size; `None` when the server sent `*`.
    pub total: Option<u64>,
}

/// Headers of the final response (after redirects).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
}

/// Parse collected header lines. A new `HTTP/` status line resets the state so
/// only the last response in a redirect chain counts.
pub(crate) fn parse_response_head(lines: &[String]) -> ResponseHead {
    let mut head = ResponseHead::default();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            head = ResponseHead::default();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                head.content_length = value.parse::<u64>().ok();
            } else if name.eq_ignore_ascii_case("content-range") {
                head.content_range = parse_content_range(value);
            }
        }
    }
    head
}

/// Parse `bytes 0-99/1000`, `bytes 0-99/*` or `bytes */1000`.
pub(crate) fn parse_content_range(value: &str) -> Option<ContentRange> {
    let value = value.trim();
    let rest = value
        .get(..6)
        .filter(|p| p.eq_ignore_ascii_case("bytes "))
        .map(|_| value[6..].trim())?;
    let (span, total) = rest.split_once('/')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    let span = match span.trim() {
        "*" => None,
        s => {
            let (a, b) = s.split_once('-')?;
            let start = a.trim().parse::<u64>().ok()?;
            let end = b.trim().parse::<u64>().ok()?;
            if start > end {
                return None;
            }
            Some((start, end))
        }
    };
    Some(ContentRange { span, total })
}
