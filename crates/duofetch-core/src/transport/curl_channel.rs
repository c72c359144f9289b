//! libcurl-backed transport channel for both profiles.

use curl::easy::Easy2;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::resource::RangeRequest;
use crate::trace::{TraceRecord, TraceSink};

use super::collector::Collector;
use super::multi::MultiDriver;
use super::{Profile, RangeResponse, TransportChannel, TransportError};

/// HTTP version a channel negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HttpVersion {
    Http1,
    Http2,
    Http2PriorKnowledge,
    Http3,
}

impl From<HttpVersion> for curl::easy::HttpVersion {
    fn from(v: HttpVersion) -> Self {
        match v {
            HttpVersion::Http1 => curl::easy::HttpVersion::V11,
            HttpVersion::Http2 => curl::easy::HttpVersion::V2,
            HttpVersion::Http2PriorKnowledge => curl::easy::HttpVersion::V2PriorKnowledge,
            HttpVersion::Http3 => curl::easy::HttpVersion::V3,
        }
    }
}

/// Per-channel curl options.
#[derive(Clone)]
pub struct CurlSettings {
    pub http_version: HttpVersion,
    pub connect_timeout: Duration,
    /// Skip peer and host verification. Explicit opt-in only.
    pub insecure: bool,
    /// Per-host connection cap of the multiplexed channel's multi handle.
    /// Legacy channels always use a single connection.
    pub max_connections: usize,
    pub trace: Option<TraceSink>,
}

impl Default for CurlSettings {
    fn default() -> Self {
        Self {
            http_version: HttpVersion::Http1,
            connect_timeout: Duration::from_secs(30),
            insecure: false,
            max_connections: 1,
            trace: None,
        }
    }
}

/// How a channel runs its transfers.
enum Engine {
    /// One reusable handle (keeps its connection cache between requests).
    /// The lock is held for the whole request, so at most one is in flight.
    Serial(Mutex<Option<Easy2<Collector>>>),
    /// Shared multi handle, started on first use.
    Shared(Mutex<Option<MultiDriver>>),
}

/// Transport channel driving libcurl.
///
/// Multiplexed channels run every caller's transfer on one shared multi
/// handle. Legacy channels serialize callers on a single easy handle, so
/// responses cannot interleave.
pub struct CurlChannel {
    name: String,
    profile: Profile,
    settings: CurlSettings,
    engine: Engine,
    closed: AtomicBool,
}

impl CurlChannel {
    pub fn new(name: impl Into<String>, profile: Profile, mut settings: CurlSettings) -> Self {
        if profile == Profile::Legacy {
            settings.max_connections = 1;
        }
        settings.max_connections = settings.max_connections.max(1);
        let engine = match profile {
            Profile::Legacy => Engine::Serial(Mutex::new(None)),
            Profile::Multiplexed => Engine::Shared(Mutex::new(None)),
        };
        Self {
            name: name.into(),
            profile,
            settings,
            engine,
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &CurlSettings {
        &self.settings
    }

    fn configure(
        &self,
        easy: &mut Easy2<Collector>,
        request: &RangeRequest,
        timeout: Option<Duration>,
    ) -> Result<(), curl::Error> {
        easy.url(&request.url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.http_version(self.settings.http_version.into())?;
        if self.profile == Profile::Multiplexed && self.settings.http_version != HttpVersion::Http1 {
            // Wait for an in-progress connection to confirm multiplexing
            // instead of opening a second one.
            easy.pipewait(true)?;
        }
        easy.connect_timeout(self.settings.connect_timeout)?;
        // Zero disables the overall timeout in libcurl.
        easy.timeout(timeout.unwrap_or(Duration::ZERO))?;
        if self.settings.insecure {
            easy.ssl_verify_peer(false)?;
            easy.ssl_verify_host(false)?;
        }
        if let Some(range) = request.range {
            easy.range(&range.curl_range())?;
        }
        easy.progress(true)?;
        Ok(())
    }

    fn fetch_serial(
        &self,
        slot: &Mutex<Option<Easy2<Collector>>>,
        request: &RangeRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<RangeResponse, TransportError> {
        let mut idle = slot
            .lock()
            .map_err(|_| TransportError::protocol("channel lock poisoned"))?;
        self.ensure_open()?;
        let mut easy = match idle.take() {
            Some(mut easy) => {
                // reset() drops options but keeps the connection cache.
                easy.reset();
                easy.get_mut().rearm(cancel.clone());
                easy
            }
            None => Easy2::new(Collector::new(cancel.clone())),
        };
        self.configure(&mut easy, request, timeout)?;
        let performed = easy.perform();
        let result = self.complete(&mut easy, request, performed);
        // A handle whose transfer failed may hold a broken connection.
        if result.is_ok() {
            *idle = Some(easy);
        }
        result
    }

    fn fetch_shared(
        &self,
        slot: &Mutex<Option<MultiDriver>>,
        request: &RangeRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<RangeResponse, TransportError> {
        let driver = {
            let mut driver = slot
                .lock()
                .map_err(|_| TransportError::protocol("channel lock poisoned"))?;
            self.ensure_open()?;
            match driver.as_ref() {
                Some(d) => d.clone(),
                None => {
                    let d = MultiDriver::spawn(&self.name, self.settings.max_connections)
                        .map_err(|e| {
                            TransportError::protocol(format!("start multi driver: {}", e))
                        })?;
                    *driver = Some(d.clone());
                    d
                }
            }
        };
        let mut easy = Easy2::new(Collector::new(cancel.clone()));
        self.configure(&mut easy, request, timeout)?;
        let (mut easy, performed) = driver.perform(easy)?;
        self.complete(&mut easy, request, performed)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::protocol(format!(
                "channel {} is closed",
                self.name
            )));
        }
        Ok(())
    }

    /// Build the response from a finished transfer, then trace and log it.
    fn complete(
        &self,
        easy: &mut Easy2<Collector>,
        request: &RangeRequest,
        performed: Result<(), curl::Error>,
    ) -> Result<RangeResponse, TransportError> {
        let result = match performed {
            Ok(()) => match easy.response_code() {
                Ok(code) => easy.get_mut().finish(code),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        };
        self.trace(easy, request, &result);
        match &result {
            Ok(rsp) => tracing::debug!(
                channel = %self.name,
                url = %request.url,
                status = rsp.status,
                declared = rsp.declared_length,
                "response"
            ),
            Err(e) => tracing::debug!(channel = %self.name, url = %request.url, "fetch failed: {}", e),
        }
        result
    }

    fn trace(
        &self,
        easy: &mut Easy2<Collector>,
        request: &RangeRequest,
        result: &Result<RangeResponse, TransportError>,
    ) {
        let Some(sink) = self.settings.trace.as_ref() else {
            return;
        };
        let (status, bytes, error) = match result {
            Ok(rsp) => (Some(rsp.status), rsp.body.len() as u64, None),
            Err(e) => (e.status, 0, Some(e.to_string())),
        };
        let record = TraceRecord {
            channel: self.name.clone(),
            profile: self.profile,
            url: request.url.clone(),
            range: request.range.map(|r| r.to_string()),
            status,
            bytes,
            connect_ms: easy
                .connect_time()
                .map(|d| d.as_secs_f64() * 1000.0)
                .unwrap_or(0.0),
            total_ms: easy
                .total_time()
                .map(|d| d.as_secs_f64() * 1000.0)
                .unwrap_or(0.0),
            error,
        };
        sink.record(&record);
    }
}

impl TransportChannel for CurlChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> Profile {
        self.profile
    }

    fn fetch(
        &self,
        request: &RangeRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<RangeResponse, TransportError> {
        self.ensure_open()?;
        if cancel.is_cancelled() {
            return Err(TransportError::canceled());
        }
        match &self.engine {
            Engine::Serial(slot) => self.fetch_serial(slot, request, timeout, cancel),
            Engine::Shared(slot) => self.fetch_shared(slot, request, timeout, cancel),
        }
    }

    fn supports_cancellation(&self) -> bool {
        true
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the last driver handle stops the thread once in-flight
        // transfers finish; dropping the idle easy handle closes its connection.
        let released = match &self.engine {
            Engine::Serial(slot) => slot.lock().ok().and_then(|mut idle| idle.take()).is_some(),
            Engine::Shared(slot) => slot.lock().ok().and_then(|mut d| d.take()).is_some(),
        };
        tracing::debug!(channel = %self.name, released, "channel closed");
    }
}
