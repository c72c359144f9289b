//! `duofetch race` – race every name on the multiplexed channel, pause, then
//! race them again on the legacy channel.

use anyhow::{Context, Result};
use duofetch_core::config::{FetchConfig, SessionOverrides};
use duofetch_core::race::{RaceOutcome, RaceReport};
use duofetch_core::session::Session;
use duofetch_core::sink::LogSink;
use duofetch_core::transport::TransportChannel;
use std::time::Duration;

use crate::cli::ChannelChoice;

pub async fn run_race(
    cfg: &FetchConfig,
    overrides: &SessionOverrides,
    names: &[String],
    pause: Duration,
    choice: ChannelChoice,
) -> Result<()> {
    let session = Session::open(cfg, overrides)?;
    let resources = names
        .iter()
        .map(|n| session.resolve(n))
        .collect::<Result<Vec<_>>>()?;

    for (i, &slot) in choice.slots().iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tracing::info!("pausing {:?} before switching channel", pause);
            tokio::time::sleep(pause).await;
        }
        let channel_name = session
            .channel(slot)
            .map(|c| c.name().to_string())
            .with_context(|| format!("no channel in slot {}", slot))?;
        let urls: Vec<String> = resources
            .iter()
            .filter_map(|r| r.url(slot).map(str::to_string))
            .collect();

        let mut sink = LogSink::new(session.context().quiet);
        let report = session
            .race(slot, &urls, &mut sink)
            .await
            .with_context(|| format!("no channel in slot {}", slot))?;
        print_report(&channel_name, &report);
    }

    session.close();
    Ok(())
}

fn print_report(channel: &str, report: &RaceReport) {
    println!("{:<12} {:<10} {:<10} {}", "CHANNEL", "OUTCOME", "BYTES", "URL");
    for o in &report.outcomes {
        let (label, bytes) = match &o.outcome {
            RaceOutcome::Completed(rsp) => ("completed", rsp.body.len().to_string()),
            RaceOutcome::Abandoned => ("abandoned", "-".to_string()),
            RaceOutcome::Failed(_) => ("failed", "-".to_string()),
        };
        println!("{:<12} {:<10} {:<10} {}", channel, label, bytes, o.url);
        if let RaceOutcome::Failed(e) = &o.outcome {
            println!("{:<12} {:<10} {:<10}   {}", "", "", "", e);
        }
    }
    println!(
        "{} completed, {} abandoned, {} failed in {:?}{}",
        report.completed(),
        report.abandoned(),
        report.failed(),
        report.elapsed,
        if report.deadline_hit {
            " (deadline hit)"
        } else {
            ""
        }
    );
}
