//! `duofetch pull` – chunked pull of each name across both channels.

use anyhow::{bail, Context, Result};
use duofetch_core::config::{FetchConfig, SessionOverrides};
use duofetch_core::session::Session;
use duofetch_core::sink::{AssemblySink, LogSink};
use std::path::{Path, PathBuf};

pub async fn run_pull(
    cfg: &FetchConfig,
    overrides: &SessionOverrides,
    names: Vec<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    if output.is_some() && names.len() != 1 {
        bail!("--output needs exactly one name, got {}", names.len());
    }
    let session = Session::open(cfg, overrides)?;
    let quiet = session.context().quiet;

    // Curl transfers and the settle sleep block the calling thread.
    tokio::task::spawn_blocking(move || pull_all(session, &names, output.as_deref(), quiet))
        .await
        .context("pull task panicked")?
}

fn pull_all(session: Session, names: &[String], output: Option<&Path>, quiet: bool) -> Result<()> {
    for name in names {
        let resource = session.resolve(name)?;
        let mut sinks = (LogSink::new(quiet), AssemblySink::new());
        let summary = session
            .pull(&resource, &mut sinks)
            .with_context(|| format!("pull {}", name))?;
        let assembled = sinks.1;
        println!(
            "{}  {} ({} bytes in {} chunks, {}/{} per channel)",
            assembled.sha256_hex(),
            name,
            summary.bytes,
            summary.chunks,
            summary.per_channel[0],
            summary.per_channel[1]
        );
        if let Some(path) = output {
            assembled.write_to(path)?;
            tracing::info!("wrote {} to {}", name, path.display());
        }
    }
    session.close();
    Ok(())
}
