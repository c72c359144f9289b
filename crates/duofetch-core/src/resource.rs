//! Resource naming, byte ranges and range requests.

use std::fmt;

/// Inclusive byte interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Returns `None` when `start > end`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        if start > end {
            return None;
        }
        Some(Self { start, end })
    }

    /// Range of `len` bytes starting at `start`. `len` must be non-zero.
    pub fn with_len(start: u64, len: u64) -> Option<Self> {
        if len == 0 {
            return None;
        }
        Self::new(start, start.checked_add(len - 1)?)
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered (never zero).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// curl range option value: `start-end` (curl adds the `bytes=` prefix itself).
    pub fn curl_range(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One request a driver hands to a transport channel.
///
/// `range: None` is a full-resource GET (used by the fan-out race).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub url: String,
    pub range: Option<ByteRange>,
}

impl RangeRequest {
    pub fn ranged(url: impl Into<String>, range: ByteRange) -> Self {
        Self {
            url: url.into(),
            range: Some(range),
        }
    }

    pub fn full(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            range: None,
        }
    }
}

/// A named resource resolved to one URL per configured channel.
///
/// URL `i` belongs to channel slot `i` in the order the bases were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    name: String,
    urls: Vec<String>,
}

impl Resource {
    /// Resolve `name` against every base URL. A base without a trailing slash
    /// is treated as a directory, so `http://host:6060/data` + `a.bin`
    /// becomes `http://host:6060/data/a.bin`.
    pub fn resolve(name: &str, bases: &[&str]) -> Result<Self, url::ParseError> {
        let relative = name.trim_start_matches('/');
        let urls = bases
            .iter()
            .map(|base| {
                let mut base = url::Url::parse(base)?;
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }
                Ok(base.join(relative)?.to_string())
            })
            .collect::<Result<Vec<_>, url::ParseError>>()?;
        Ok(Self {
            name: name.to_string(),
            urls,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL for channel slot `slot`, if that many bases were resolved.
    pub fn url(&self, slot: usize) -> Option<&str> {
        self.urls.get(slot).map(String::as_str)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
