//! Easy2 handler shared by both curl profiles: collects headers and body and
//! aborts the transfer when the caller's token is cancelled.

use std::str;
use tokio_util::sync::CancellationToken;

use super::parse::parse_response_head;
use super::{RangeResponse, TransportError};

pub(super) struct Collector {
    headers: Vec<String>,
    body: Vec<u8>,
    cancel: CancellationToken,
}

impl Collector {
    pub(super) fn new(cancel: CancellationToken) -> Self {
        Self {
            headers: Vec::new(),
            body: Vec::new(),
            cancel,
        }
    }

    /// Prepare a reused handler for the next request.
    pub(super) fn rearm(&mut self, cancel: CancellationToken) {
        self.headers.clear();
        self.body.clear();
        self.cancel = cancel;
    }

    /// Turn the collected transfer into a response. 416 maps to the empty
    /// end-of-resource response; any other non-2xx status is an error.
    pub(super) fn finish(&mut self, code: u32) -> Result<RangeResponse, TransportError> {
        let head = parse_response_head(&self.headers);
        let total_length = head.content_range.and_then(|cr| cr.total);

        if code == 416 {
            return Ok(RangeResponse::end_of_resource(total_length));
        }
        if !(200..300).contains(&code) {
            return Err(TransportError::http_status(code));
        }

        let body = std::mem::take(&mut self.body);
        Ok(RangeResponse {
            status: code,
            declared_length: head.content_length.unwrap_or(body.len() as u64),
            total_length,
            span: head.content_range.and_then(|cr| cr.span),
            body,
        })
    }
}

impl curl::easy::Handler for Collector {
    fn header(&mut self, data: &[u8]) -> bool {
        if let Ok(s) = str::from_utf8(data) {
            self.headers.push(s.trim_end().to_string());
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, curl::easy::WriteError> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    // Returning false aborts the transfer with CURLE_ABORTED_BY_CALLBACK.
    fn progress(&mut self, _dltotal: f64, _dlnow: f64, _ultotal: f64, _ulnow: f64) -> bool {
        !self.cancel.is_cancelled()
    }
}
