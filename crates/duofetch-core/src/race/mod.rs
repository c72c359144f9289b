//! Fan-out race: one concurrent full fetch per URL over a shared channel,
//! finished by whichever comes first, all tasks done or the deadline.
//!
//! Each fetch runs as a blocking task and reports over an mpsc channel. The
//! driver waits in `tokio::select!` on that channel and the deadline timer,
//! so it sleeps until something happens. On deadline every unfinished task
//! is recorded as abandoned and its cancellation token is tripped so the
//! channel can abort the transfer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::resource::RangeRequest;
use crate::session::SessionContext;
use crate::sink::{Delivery, ResponseSink};
use crate::transport::{RangeResponse, TransportChannel, TransportError};

/// Result for one URL.
#[derive(Debug)]
pub enum RaceOutcome {
    Completed(RangeResponse),
    /// Did not finish before the deadline. Not an error.
    Abandoned,
    Failed(TransportError),
}

impl RaceOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RaceOutcome::Completed(_))
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, RaceOutcome::Abandoned)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RaceOutcome::Failed(_))
    }
}

impl fmt::Display for RaceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceOutcome::Completed(rsp) => write!(f, "completed ({} bytes)", rsp.body.len()),
            RaceOutcome::Abandoned => f.write_str("abandoned"),
            RaceOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

#[derive(Debug)]
pub struct UrlOutcome {
    pub url: String,
    pub outcome: RaceOutcome,
}

/// Per-URL outcomes in input order.
#[derive(Debug)]
pub struct RaceReport {
    pub outcomes: Vec<UrlOutcome>,
    /// True when the driver stopped because the deadline fired.
    pub deadline_hit: bool,
    pub elapsed: Duration,
}

impl RaceReport {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_completed()).count()
    }

    pub fn abandoned(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_abandoned()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_failed()).count()
    }

    pub fn outcome(&self, url: &str) -> Option<&RaceOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.url == url)
            .map(|o| &o.outcome)
    }
}

type Completion = (usize, Result<RangeResponse, TransportError>);

/// Concurrent driver over one shared channel.
pub struct FanOutRace<'a> {
    ctx: &'a SessionContext,
    channel: Arc<dyn TransportChannel>,
}

impl<'a> FanOutRace<'a> {
    pub fn new(ctx: &'a SessionContext, channel: Arc<dyn TransportChannel>) -> Self {
        Self { ctx, channel }
    }

    /// Start every fetch, then wait for all of them or the deadline.
    /// Responses reach `sink` in arrival order.
    pub async fn run(&self, urls: &[String], sink: &mut dyn ResponseSink) -> RaceReport {
        let started = Instant::now();
        let deadline = self
            .ctx
            .deadline
            .map(|d| Instant::from_std(d.resolve(started.into_std())));
        let channel_name = self.channel.name().to_string();
        tracing::debug!(
            channel = %channel_name,
            profile = %self.channel.profile(),
            urls = urls.len(),
            deadline = ?self.ctx.deadline,
            "race started"
        );

        let (tx, mut rx) = mpsc::channel::<Completion>(urls.len().max(1));
        let mut tokens = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            tracing::info!("GET {} via {}", url, channel_name);
            let token = CancellationToken::new();
            tokens.push(token.clone());
            let channel = Arc::clone(&self.channel);
            let tx = tx.clone();
            let request = RangeRequest::full(url.clone());
            let timeout = self.ctx.request_timeout;
            tokio::task::spawn_blocking(move || {
                let res = channel.fetch(&request, timeout, &token);
                // The driver may already have returned; nobody is listening then.
                let _ = tx.blocking_send((index, res));
            });
        }
        drop(tx);

        let mut slots: Vec<Option<RaceOutcome>> = urls.iter().map(|_| None).collect();
        let mut pending = urls.len();
        let mut deadline_hit = false;

        let timer = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timer);

        while pending > 0 {
            tokio::select! {
                biased;
                msg = rx.recv() => {
                    let Some((index, res)) = msg else {
                        // Every sender is gone without reporting: a task panicked.
                        break;
                    };
                    pending -= 1;
                    let outcome = match res {
                        Ok(rsp) => {
                            sink.deliver(&Delivery {
                                url: &urls[index],
                                channel: &channel_name,
                                range: None,
                                response: &rsp,
                            });
                            RaceOutcome::Completed(rsp)
                        }
                        Err(e) => {
                            tracing::warn!("GET {} via {} failed: {}", urls[index], channel_name, e);
                            RaceOutcome::Failed(e)
                        }
                    };
                    slots[index] = Some(outcome);
                }
                _ = &mut timer => {
                    deadline_hit = true;
                    tracing::info!(
                        pending,
                        "deadline reached after {:?}, giving up on remaining requests",
                        started.elapsed()
                    );
                    if !self.channel.supports_cancellation() {
                        tracing::debug!(
                            "{} cannot abort transfers; abandoned fetches run to completion",
                            channel_name
                        );
                    }
                    break;
                }
            }
        }

        let outcomes = urls
            .iter()
            .zip(slots)
            .zip(tokens)
            .map(|((url, slot), token)| {
                let outcome = match slot {
                    Some(o) => o,
                    None if deadline_hit => {
                        token.cancel();
                        RaceOutcome::Abandoned
                    }
                    None => {
                        token.cancel();
                        RaceOutcome::Failed(TransportError::protocol(
                            "fetch task ended without reporting",
                        ))
                    }
                };
                UrlOutcome {
                    url: url.clone(),
                    outcome,
                }
            })
            .collect();

        let report = RaceReport {
            outcomes,
            deadline_hit,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            channel = %channel_name,
            completed = report.completed(),
            abandoned = report.abandoned(),
            failed = report.failed(),
            "race finished in {:?}",
            report.elapsed
        );
        report
    }
}
