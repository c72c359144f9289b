//! Session: read-only fetch context plus the channels it owns.
//!
//! A [`Session`] is built once, drives any number of pulls and races, and
//! closes each of its channels exactly once, either through [`Session::close`]
//! or on drop (error and cancellation paths included).

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{self, ChannelConfig, FetchConfig, SessionOverrides};
use crate::pull::{ChunkedPullLoop, FetchError, PullSummary};
use crate::race::{FanOutRace, RaceReport};
use crate::resource::Resource;
use crate::sink::ResponseSink;
use crate::trace::TraceSink;
use crate::transport::{CurlChannel, CurlSettings, Profile, TransportChannel};

/// Slot of the multiplexed channel (channel A of the pull loop).
pub const MULTIPLEXED_SLOT: usize = 0;
/// Slot of the legacy channel (channel B of the pull loop).
pub const LEGACY_SLOT: usize = 1;

const KEYLOG_ENV: &str = "SSLKEYLOGFILE";

/// Point libcurl's TLS key log at `path`.
///
/// Sets `SSLKEYLOGFILE` for the process. Call it from `main` before the async
/// runtime or any other thread is started: modifying the environment while
/// other threads may read it is not thread-safe. libcurl's TLS backends read
/// the variable when they initialize, so it must also precede the first
/// curl handle.
pub fn export_keylog(path: &Path) {
    std::env::set_var(KEYLOG_ENV, path);
}

fn keylog_exported(path: &Path, current: Option<&OsStr>) -> bool {
    current == Some(path.as_os_str())
}

/// When a driver stops waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Relative to the moment the driver starts.
    After(Duration),
    /// Absolute instant supplied by the caller.
    At(Instant),
}

impl Deadline {
    /// Absolute deadline for a driver starting at `start`.
    pub fn resolve(&self, start: Instant) -> Instant {
        match *self {
            Deadline::After(d) => start + d,
            Deadline::At(t) => t,
        }
    }
}

/// Cross-cutting settings shared read-only by both drivers.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub deadline: Option<Deadline>,
    /// Always at least 1.
    pub chunk_size: u64,
    /// Pause between pull-loop chunks.
    pub settle: Duration,
    /// Per-request timeout; further capped by the deadline when both are set.
    pub request_timeout: Option<Duration>,
    /// Suppress body echo in the log sink.
    pub quiet: bool,
    pub trace: Option<TraceSink>,
}

impl SessionContext {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            deadline: None,
            chunk_size: chunk_size.max(1),
            settle: Duration::ZERO,
            request_timeout: None,
            quiet: false,
            trace: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_trace(mut self, trace: TraceSink) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Timeout for a request issued now, given the resolved deadline.
    /// Returns `None` as the outer option when the deadline has passed.
    pub(crate) fn timeout_for(&self, deadline: Option<Instant>) -> Option<Option<Duration>> {
        let Some(deadline) = deadline else {
            return Some(self.request_timeout);
        };
        let remaining = deadline.checked_duration_since(Instant::now())?;
        if remaining.is_zero() {
            return None;
        }
        Some(Some(match self.request_timeout {
            Some(t) => t.min(remaining),
            None => remaining,
        }))
    }
}

/// Owns the context and the channels for one fetch session.
pub struct Session {
    ctx: SessionContext,
    channels: Vec<Arc<dyn TransportChannel>>,
    bases: Vec<String>,
    closed: bool,
}

impl Session {
    pub fn new(ctx: SessionContext, channels: Vec<Arc<dyn TransportChannel>>) -> Self {
        Self {
            ctx,
            channels,
            bases: Vec::new(),
            closed: false,
        }
    }

    /// Base URLs in slot order, used by [`Session::resolve`].
    pub fn with_bases(mut self, bases: Vec<String>) -> Self {
        self.bases = bases;
        self
    }

    /// Build the multiplexed and legacy curl channels from configuration.
    /// The race deadline from the config becomes the session deadline.
    pub fn open(cfg: &FetchConfig, overrides: &SessionOverrides) -> Result<Self> {
        let mut cfg = cfg.clone();
        cfg.apply(overrides);
        cfg.validate()?;

        if let Some(path) = cfg.keylog_file.as_ref() {
            if keylog_exported(path, std::env::var_os(KEYLOG_ENV).as_deref()) {
                tracing::info!("TLS key log enabled at {}", path.display());
            } else {
                tracing::warn!(
                    "key log {} requested but {} is not set to it; call export_keylog before starting the runtime",
                    path.display(),
                    KEYLOG_ENV
                );
            }
        }
        if cfg.insecure {
            tracing::warn!("TLS certificate verification is disabled (--insecure)");
        }

        let trace = if cfg.trace {
            let path = match cfg.trace_path.clone() {
                Some(p) => p,
                None => config::default_trace_path()?,
            };
            Some(TraceSink::create(&path).with_context(|| format!("open trace {}", path.display()))?)
        } else {
            None
        };

        let mut ctx = SessionContext::new(cfg.chunk_size)
            .with_settle(cfg.settle_interval())
            .with_deadline(Deadline::After(cfg.race_deadline()))
            .with_quiet(overrides.quiet);
        if let Some(t) = cfg.request_timeout() {
            ctx = ctx.with_request_timeout(t);
        }
        if let Some(t) = trace {
            ctx = ctx.with_trace(t);
        }

        let build = |name: &str, profile: Profile, ch: &ChannelConfig| -> Arc<dyn TransportChannel> {
            Arc::new(CurlChannel::new(
                name,
                profile,
                CurlSettings {
                    http_version: ch.http_version,
                    connect_timeout: Duration::from_secs(ch.connect_timeout_secs),
                    insecure: cfg.insecure,
                    max_connections: ch.max_connections,
                    trace: ctx.trace.clone(),
                },
            ))
        };
        let channels = vec![
            build("multiplexed", Profile::Multiplexed, &cfg.multiplexed),
            build("legacy", Profile::Legacy, &cfg.legacy),
        ];

        tracing::debug!(
            multiplexed = %cfg.multiplexed.base_url,
            legacy = %cfg.legacy.base_url,
            chunk_size = ctx.chunk_size,
            "session opened"
        );
        Ok(Self::new(ctx, channels).with_bases(vec![
            cfg.multiplexed.base_url.clone(),
            cfg.legacy.base_url.clone(),
        ]))
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn channel(&self, slot: usize) -> Option<&Arc<dyn TransportChannel>> {
        self.channels.get(slot)
    }

    pub fn channels(&self) -> &[Arc<dyn TransportChannel>] {
        &self.channels
    }

    /// Chunked pull over channel slots 0 (A) and 1 (B). The pull loop does not
    /// use the session deadline; pass a context with one to bound it.
    pub fn pull(
        &self,
        resource: &Resource,
        sink: &mut dyn ResponseSink,
    ) -> Result<PullSummary, FetchError> {
        let a = self.require(MULTIPLEXED_SLOT, resource)?;
        let b = self.require(LEGACY_SLOT, resource)?;
        let ctx = SessionContext {
            deadline: None,
            ..self.ctx.clone()
        };
        ChunkedPullLoop::new(&ctx, a.as_ref(), b.as_ref()).run(resource, sink)
    }

    /// Fan-out race over one channel slot.
    pub async fn race(
        &self,
        slot: usize,
        urls: &[String],
        sink: &mut dyn ResponseSink,
    ) -> Option<RaceReport> {
        let channel = Arc::clone(self.channels.get(slot)?);
        Some(FanOutRace::new(&self.ctx, channel).run(urls, sink).await)
    }

    /// Resolve `name` against every channel's base URL.
    pub fn resolve(&self, name: &str) -> Result<Resource> {
        let bases: Vec<&str> = self.bases.iter().map(String::as_str).collect();
        Resource::resolve(name, &bases).with_context(|| format!("resolve {}", name))
    }

    /// Close every channel. Equivalent to dropping the session.
    pub fn close(mut self) {
        self.close_channels();
    }

    fn close_channels(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for ch in &self.channels {
            ch.close();
        }
        tracing::debug!(channels = self.channels.len(), "session closed");
    }

    fn require(
        &self,
        slot: usize,
        resource: &Resource,
    ) -> Result<&Arc<dyn TransportChannel>, FetchError> {
        self.channels.get(slot).ok_or_else(|| {
            FetchError::new(
                resource.name(),
                0,
                crate::transport::TransportError::protocol(format!(
                    "no channel configured in slot {}",
                    slot
                )),
            )
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close_channels();
    }
}
