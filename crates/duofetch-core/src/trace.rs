//! Optional diagnostic trace sink: one JSON line per request.

use serde::Serialize;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::transport::Profile;

/// One trace line, written after every request a channel issues.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub channel: String,
    pub profile: Profile,
    pub url: String,
    pub range: Option<String>,
    pub status: Option<u32>,
    pub bytes: u64,
    pub connect_ms: f64,
    pub total_ms: f64,
    pub error: Option<String>,
}

/// Append-only destination for trace records. Cheap to clone; clones share
/// the same writer.
#[derive(Clone)]
pub struct TraceSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl TraceSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Open `path` for appending, creating parent directories as needed.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        tracing::info!("writing trace records to {}", path.display());
        Ok(Self::new(Box::new(BufWriter::new(file))))
    }

    /// Append one record. Write failures are logged, never propagated.
    pub fn record(&self, record: &TraceRecord) {
        let Ok(mut w) = self.writer.lock() else {
            return;
        };
        let res = serde_json::to_writer(&mut *w, record)
            .map_err(io::Error::from)
            .and_then(|()| w.write_all(b"\n"))
            .and_then(|()| w.flush());
        if let Err(e) = res {
            tracing::warn!("trace write failed: {}", e);
        }
    }
}

impl std::fmt::Debug for TraceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TraceSink")
    }
}
