//! Sequential chunked pull that alternates between two channels.
//!
//! Requests `[start, start + chunk_size - 1]` on the active channel, hands the
//! response to the sink, flips the channel and advances. A response shorter
//! than `chunk_size` ends the pull. Any transport error ends it too: there is
//! no per-chunk retry and nothing already delivered is rolled back.

mod error;

use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::resource::{ByteRange, RangeRequest, Resource};
use crate::session::SessionContext;
use crate::sink::{Delivery, ResponseSink};
use crate::transport::{RangeResponse, TransportChannel, TransportError};

pub use error::FetchError;

/// Which channel issues the next chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullState {
    UsingChannelA,
    UsingChannelB,
}

impl PullState {
    pub fn flip(self) -> Self {
        match self {
            PullState::UsingChannelA => PullState::UsingChannelB,
            PullState::UsingChannelB => PullState::UsingChannelA,
        }
    }

    /// Resource URL slot for this state.
    pub fn slot(self) -> usize {
        match self {
            PullState::UsingChannelA => 0,
            PullState::UsingChannelB => 1,
        }
    }
}

/// What a completed pull delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullSummary {
    pub chunks: usize,
    pub bytes: u64,
    /// Chunks delivered per channel: `[A, B]`.
    pub per_channel: [usize; 2],
}

/// Sequential driver over channels A and B.
pub struct ChunkedPullLoop<'a> {
    ctx: &'a SessionContext,
    channel_a: &'a dyn TransportChannel,
    channel_b: &'a dyn TransportChannel,
    cancel: CancellationToken,
}

impl<'a> ChunkedPullLoop<'a> {
    pub fn new(
        ctx: &'a SessionContext,
        channel_a: &'a dyn TransportChannel,
        channel_b: &'a dyn TransportChannel,
    ) -> Self {
        Self {
            ctx,
            channel_a,
            channel_b,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop before the next chunk (and abort the current one on channels that
    /// support it) once `cancel` is tripped.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn channel(&self, state: PullState) -> &'a dyn TransportChannel {
        match state {
            PullState::UsingChannelA => self.channel_a,
            PullState::UsingChannelB => self.channel_b,
        }
    }

    /// Pull `resource` from offset 0 until a short chunk or the first error.
    pub fn run(
        &self,
        resource: &Resource,
        sink: &mut dyn ResponseSink,
    ) -> Result<PullSummary, FetchError> {
        let chunk_size = self.ctx.chunk_size;
        let deadline = self.ctx.deadline.map(|d| d.resolve(Instant::now()));
        let mut state = PullState::UsingChannelA;
        let mut byte_start = 0u64;
        let mut summary = PullSummary::default();

        loop {
            let fail = move |cause: TransportError| FetchError::new(resource.name(), byte_start, cause);

            if self.cancel.is_cancelled() {
                return Err(fail(TransportError::canceled()));
            }
            let range = ByteRange::with_len(byte_start, chunk_size)
                .ok_or_else(|| fail(TransportError::protocol("chunk range overflows u64")))?;
            let channel = self.channel(state);
            let url = resource.url(state.slot()).ok_or_else(|| {
                fail(TransportError::protocol(format!(
                    "{} has no URL for channel {}",
                    resource.name(),
                    channel.name()
                )))
            })?;
            let timeout = self
                .ctx
                .timeout_for(deadline)
                .ok_or_else(|| fail(TransportError::timeout("session deadline passed")))?;

            tracing::info!("GET {} [{}] via {}", url, range, channel.name());
            let request = RangeRequest::ranged(url, range);
            let response = channel
                .fetch(&request, timeout, &self.cancel)
                .map_err(fail)?;
            check_chunk(&range, &response).map_err(fail)?;

            // An empty answer past offset 0 only marks the end of a resource
            // whose length is an exact multiple of the chunk size.
            let end_marker = response.is_empty() && byte_start > 0;
            if !end_marker {
                sink.deliver(&Delivery {
                    url,
                    channel: channel.name(),
                    range: Some(range),
                    response: &response,
                });
                summary.chunks += 1;
                summary.bytes += response.body.len() as u64;
                summary.per_channel[state.slot()] += 1;
            }
            state = state.flip();

            if response.declared_length < chunk_size {
                tracing::debug!(
                    resource = %resource,
                    chunks = summary.chunks,
                    bytes = summary.bytes,
                    "short chunk, pull complete"
                );
                return Ok(summary);
            }
            byte_start += chunk_size;
            if !self.ctx.settle.is_zero() {
                std::thread::sleep(self.ctx.settle);
            }
        }
    }
}

/// Reject responses that would break the no-gap, no-overlap invariant.
fn check_chunk(range: &ByteRange, rsp: &RangeResponse) -> Result<(), TransportError> {
    if rsp.declared_length > range.len() {
        return Err(TransportError::protocol(format!(
            "range {} not honored: declared {} bytes",
            range, rsp.declared_length
        )));
    }
    if rsp.body.len() as u64 != rsp.declared_length {
        return Err(TransportError::protocol(format!(
            "declared {} bytes but received {}",
            rsp.declared_length,
            rsp.body.len()
        )));
    }
    if !rsp.body.is_empty() {
        check_placement(range, rsp)?;
    }
    if rsp.declared_length < range.len() {
        if let Some(total) = rsp.total_length {
            if range.start() + rsp.declared_length < total {
                return Err(TransportError::protocol(format!(
                    "truncated chunk at {}: {} of {} bytes with {} total",
                    range.start(),
                    rsp.declared_length,
                    range.len(),
                    total
                )));
            }
        }
    }
    Ok(())
}

/// The bytes must sit where the request asked for them: a 206 span has to
/// start at the range start and match the declared length, and a plain 200
/// is only the requested bytes when the range starts at zero.
fn check_placement(range: &ByteRange, rsp: &RangeResponse) -> Result<(), TransportError> {
    if rsp.status != 206 {
        if range.start() > 0 {
            return Err(TransportError::protocol(format!(
                "range {} ignored: status {} with the whole body",
                range, rsp.status
            )));
        }
        return Ok(());
    }
    let (first, last) = rsp.span.ok_or_else(|| {
        TransportError::protocol(format!("range {}: 206 without Content-Range", range))
    })?;
    if first != range.start() {
        return Err(TransportError::protocol(format!(
            "range {} answered with bytes {}-{}",
            range, first, last
        )));
    }
    if last - first + 1 != rsp.declared_length {
        return Err(TransportError::protocol(format!(
            "Content-Range {}-{} disagrees with {} declared bytes",
            first, last, rsp.declared_length
        )));
    }
    Ok(())
}
