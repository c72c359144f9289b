//! Transport channels: the request capability both drivers run on.
//!
//! A channel issues one [`RangeRequest`] at a time per caller and returns a
//! [`RangeResponse`] whose `declared_length` is what the peer reported for the
//! delivered range. Two curl-backed profiles exist:
//!
//! - `Multiplexed`: HTTP/3 or HTTP/2. Every caller's transfer runs on one
//!   shared curl multi handle, so concurrent requests ride the same
//!   connection once the peer confirms multiplexing.
//! - `Legacy`: HTTP/1.1, one reusable easy handle; concurrent callers are
//!   serialized.

mod collector;
mod curl_channel;
mod error;
mod multi;
pub(crate) mod parse;

#[cfg(test)]
pub(crate) mod mock;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::resource::RangeRequest;

pub use curl_channel::{CurlChannel, CurlSettings, HttpVersion};
pub use error::{classify_curl_error, TransportError, TransportErrorKind};

/// Concurrency profile of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Multiplexed,
    Legacy,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Multiplexed => f.write_str("multiplexed"),
            Profile::Legacy => f.write_str("legacy"),
        }
    }
}

/// Response to one [`RangeRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResponse {
    /// HTTP status of the final response.
    pub status: u32,
    /// Bytes the peer declared for this response (`Content-Length`, or the
    /// body length when the header is absent).
    pub declared_length: u64,
    /// Full resource size when the peer reported it in `Content-Range`.
    pub total_length: Option<u64>,
    /// Inclusive byte span from `Content-Range`, when the peer sent one.
    pub span: Option<(u64, u64)>,
    pub body: Vec<u8>,
}

impl RangeResponse {
    /// Empty response standing for "nothing left at this offset" (416).
    pub fn end_of_resource(total_length: Option<u64>) -> Self {
        Self {
            status: 416,
            declared_length: 0,
            total_length,
            span: None,
            body: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.declared_length == 0 && self.body.is_empty()
    }
}

/// One outbound request capability.
///
/// Implementations must be safe to call from several threads at once; a
/// channel that cannot multiplex serializes internally.
pub trait TransportChannel: Send + Sync {
    /// Human-readable name used in logs and trace records.
    fn name(&self) -> &str;

    fn profile(&self) -> Profile;

    /// Issue `request`. `timeout` bounds the whole request when set. When
    /// `cancel` is tripped the channel should stop and return `Canceled`.
    fn fetch(
        &self,
        request: &RangeRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<RangeResponse, TransportError>;

    /// True when tripping the cancellation token aborts in-flight work.
    fn supports_cancellation(&self) -> bool {
        false
    }

    /// Release connection resources. Fetches after close fail.
    fn close(&self);
}
