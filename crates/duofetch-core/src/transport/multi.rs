//! Curl multi event loop for the multiplexed profile.
//!
//! One driver thread owns the `Multi` handle. Callers hand it configured
//! `Easy2` handles over a channel and block until their transfer finishes.
//! All transfers share the multi handle's connection cache, and with
//! multiplexing enabled concurrent requests to one origin share a connection.

use std::io;
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::thread;
use std::time::Duration;

use curl::easy::Easy2;
use curl::multi::{Easy2Handle, Multi};

use super::collector::Collector;
use super::TransportError;

/// A finished transfer: the handle back (for timing info) and curl's result.
pub(super) type Finished = Result<(Easy2<Collector>, Result<(), curl::Error>), TransportError>;

struct Job {
    easy: Easy2<Collector>,
    reply: SyncSender<Finished>,
}

type ActiveItem = (Easy2Handle<Collector>, SyncSender<Finished>);

/// Handle to a running driver thread. Clones submit to the same thread; the
/// thread exits once every clone is dropped and its transfers are done.
#[derive(Clone)]
pub(super) struct MultiDriver {
    jobs: mpsc::Sender<Job>,
}

impl MultiDriver {
    pub(super) fn spawn(channel: &str, max_host_connections: usize) -> io::Result<Self> {
        let (jobs, rx) = mpsc::channel();
        let name = channel.to_string();
        thread::Builder::new()
            .name(format!("duofetch-{}", channel))
            .spawn(move || run(&name, rx, max_host_connections))?;
        Ok(Self { jobs })
    }

    /// Run `easy` on the shared multi handle and block until it finishes.
    pub(super) fn perform(&self, easy: Easy2<Collector>) -> Finished {
        let stopped = || TransportError::protocol("multi driver stopped");
        let (reply, done) = mpsc::sync_channel(1);
        self.jobs.send(Job { easy, reply }).map_err(|_| stopped())?;
        done.recv().map_err(|_| stopped())?
    }
}

fn add(multi: &Multi, job: Job, active: &mut Vec<ActiveItem>) {
    match multi.add2(job.easy) {
        Ok(handle) => active.push((handle, job.reply)),
        Err(e) => {
            let _ = job
                .reply
                .send(Err(TransportError::protocol(format!("curl multi add: {}", e))));
        }
    }
}

fn run(channel: &str, jobs: Receiver<Job>, max_host_connections: usize) {
    let mut multi = Multi::new();
    if let Err(e) = multi.pipelining(false, true) {
        tracing::warn!(channel, "multiplexing unavailable: {}", e);
    }
    if let Err(e) = multi.set_max_host_connections(max_host_connections) {
        tracing::warn!(channel, "cannot cap host connections: {}", e);
    }

    let mut active: Vec<ActiveItem> = Vec::new();
    let mut open = true;
    loop {
        if active.is_empty() {
            if !open {
                break;
            }
            // Idle: sleep until the next request or until every sender is gone.
            match jobs.recv() {
                Ok(job) => add(&multi, job, &mut active),
                Err(_) => break,
            }
        }
        loop {
            match jobs.try_recv() {
                Ok(job) => add(&multi, job, &mut active),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    open = false;
                    break;
                }
            }
        }

        if let Err(e) = multi.perform() {
            tracing::warn!(channel, "curl multi perform: {}", e);
            for (handle, reply) in active.drain(..) {
                let _ = multi.remove2(handle);
                let _ = reply.send(Err(TransportError::protocol(format!(
                    "curl multi perform: {}",
                    e
                ))));
            }
            continue;
        }

        let mut completed: Vec<(usize, Result<(), curl::Error>)> = Vec::new();
        multi.messages(|msg| {
            for (i, (handle, _)) in active.iter().enumerate() {
                if let Some(res) = msg.result_for2(handle) {
                    completed.push((i, res));
                    break;
                }
            }
        });
        completed.sort_by(|a, b| b.0.cmp(&a.0));
        for (i, res) in completed {
            let (handle, reply) = active.remove(i);
            let finished = multi
                .remove2(handle)
                .map(|easy| (easy, res))
                .map_err(|e| TransportError::protocol(format!("curl multi remove: {}", e)));
            // The caller may have gone away; the transfer is done either way.
            let _ = reply.send(finished);
        }

        if !active.is_empty() {
            if let Err(e) = multi.wait(&mut [], Duration::from_millis(100)) {
                tracing::warn!(channel, "curl multi wait: {}", e);
            }
        }
    }
    tracing::debug!(channel, "multi driver stopped");
}
