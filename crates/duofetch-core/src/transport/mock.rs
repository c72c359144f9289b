//! Scripted in-memory channel for driver tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::resource::RangeRequest;

use super::{Profile, RangeResponse, TransportChannel, TransportError, TransportErrorKind};

/// Serves byte ranges of `data` and records every call.
pub(crate) struct ScriptedChannel {
    name: String,
    data: Vec<u8>,
    fail_on_call: Option<(usize, TransportErrorKind)>,
    fail_urls: Vec<String>,
    delays: HashMap<String, Duration>,
    /// Serve at most this many bytes per response (simulates truncation).
    cap: Option<u64>,
    ignore_range: bool,
    /// Answer every range with the leading bytes and a matching span.
    serve_from_zero: bool,
    calls: Mutex<Vec<RangeRequest>>,
    counter: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closes: AtomicUsize,
    canceled: AtomicUsize,
}

impl ScriptedChannel {
    pub(crate) fn new(name: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            data,
            fail_on_call: None,
            fail_urls: Vec::new(),
            delays: HashMap::new(),
            cap: None,
            ignore_range: false,
            serve_from_zero: false,
            calls: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            canceled: AtomicUsize::new(0),
        }
    }

    /// The `n`-th call (0-based) to this channel fails with `ConnectFailed`.
    pub(crate) fn fail_on_call(self, n: usize) -> Self {
        self.fail_on_call_with(n, TransportErrorKind::ConnectFailed)
    }

    pub(crate) fn fail_on_call_with(mut self, n: usize, kind: TransportErrorKind) -> Self {
        self.fail_on_call = Some((n, kind));
        self
    }

    pub(crate) fn fail_url(mut self, url: &str) -> Self {
        self.fail_urls.push(url.to_string());
        self
    }

    pub(crate) fn delay(mut self, url: &str, d: Duration) -> Self {
        self.delays.insert(url.to_string(), d);
        self
    }

    pub(crate) fn cap(mut self, n: u64) -> Self {
        self.cap = Some(n);
        self
    }

    pub(crate) fn ignore_range(mut self) -> Self {
        self.ignore_range = true;
        self
    }

    pub(crate) fn serve_from_zero(mut self) -> Self {
        self.serve_from_zero = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<RangeRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn canceled_count(&self) -> usize {
        self.canceled.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn serve(&self, request: &RangeRequest) -> RangeResponse {
        let len = self.data.len() as u64;
        let (status, start, end_excl) = match request.range {
            Some(r) if !self.ignore_range => {
                if r.start() >= len {
                    return RangeResponse::end_of_resource(Some(len));
                }
                (206, r.start(), (r.end() + 1).min(len))
            }
            _ => (200, 0, len),
        };
        let end_excl = match self.cap {
            Some(cap) => end_excl.min(start + cap),
            None => end_excl,
        };
        let (start, end_excl) = if self.serve_from_zero {
            (0, end_excl - start)
        } else {
            (start, end_excl)
        };
        let body = self.data[start as usize..end_excl as usize].to_vec();
        let span = (status == 206 && !body.is_empty()).then(|| (start, end_excl - 1));
        RangeResponse {
            status,
            declared_length: body.len() as u64,
            total_length: Some(len),
            span,
            body,
        }
    }

    fn wait(&self, d: Duration, cancel: &CancellationToken) -> Result<(), TransportError> {
        let until = Instant::now() + d;
        while Instant::now() < until {
            if cancel.is_cancelled() {
                self.canceled.fetch_add(1, Ordering::SeqCst);
                return Err(TransportError::canceled());
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(())
    }
}

impl TransportChannel for ScriptedChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> Profile {
        Profile::Multiplexed
    }

    fn fetch(
        &self,
        request: &RangeRequest,
        _timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<RangeResponse, TransportError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = (|| {
            if let Some(d) = self.delays.get(&request.url) {
                self.wait(*d, cancel)?;
            }
            if let Some((k, kind)) = self.fail_on_call {
                if k == n {
                    return Err(TransportError::new(kind, format!("scripted failure on call {}", n)));
                }
            }
            if self.fail_urls.iter().any(|u| u == &request.url) {
                return Err(TransportError::http_status(500));
            }
            Ok(self.serve(request))
        })();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn supports_cancellation(&self) -> bool {
        true
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
