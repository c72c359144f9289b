//! Response sinks: where drivers hand each response as it arrives.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::resource::ByteRange;
use crate::transport::RangeResponse;

/// One delivered response together with where it came from.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub url: &'a str,
    pub channel: &'a str,
    /// Requested range; `None` for full-resource fetches.
    pub range: Option<ByteRange>,
    pub response: &'a RangeResponse,
}

/// Consumer of responses produced by the pull loop and the race.
pub trait ResponseSink {
    fn deliver(&mut self, delivery: &Delivery<'_>);
}

impl<S: ResponseSink + ?Sized> ResponseSink for &mut S {
    fn deliver(&mut self, delivery: &Delivery<'_>) {
        (**self).deliver(delivery)
    }
}

/// Fan every delivery out to both sinks.
impl<A: ResponseSink, B: ResponseSink> ResponseSink for (A, B) {
    fn deliver(&mut self, delivery: &Delivery<'_>) {
        self.0.deliver(delivery);
        self.1.deliver(delivery);
    }
}

/// Logs each response. Quiet mode logs only the size; otherwise the body is
/// echoed (lossy UTF-8).
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink {
    pub quiet: bool,
}

impl LogSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ResponseSink for LogSink {
    fn deliver(&mut self, d: &Delivery<'_>) {
        let rsp = d.response;
        match d.range {
            Some(range) => tracing::info!(
                "got response for {} via {} [{}]: HTTP {}, declared {} bytes",
                d.url,
                d.channel,
                range,
                rsp.status,
                rsp.declared_length
            ),
            None => tracing::info!(
                "got response for {} via {}: HTTP {}, declared {} bytes",
                d.url,
                d.channel,
                rsp.status,
                rsp.declared_length
            ),
        }
        if self.quiet {
            tracing::info!("response body: {} bytes", rsp.body.len());
        } else {
            tracing::info!("response body length: {} bytes", rsp.body.len());
            tracing::info!("response body:\n{}", String::from_utf8_lossy(&rsp.body));
        }
    }
}

/// Concatenates bodies in delivery order.
#[derive(Debug, Clone, Default)]
pub struct AssemblySink {
    bytes: Vec<u8>,
    chunks: usize,
}

impl AssemblySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// SHA-256 of the assembled bytes as lowercase hex.
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    /// Write the assembled bytes to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        fs::write(path, &self.bytes).with_context(|| format!("write {}", path.display()))
    }
}

impl ResponseSink for AssemblySink {
    fn deliver(&mut self, d: &Delivery<'_>) {
        self.bytes.extend_from_slice(&d.response.body);
        self.chunks += 1;
    }
}
