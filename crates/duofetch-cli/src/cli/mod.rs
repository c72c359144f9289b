//! CLI for duofetch.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use duofetch_core::config::{FetchConfig, SessionOverrides};
use duofetch_core::session::{LEGACY_SLOT, MULTIPLEXED_SLOT};
use std::path::PathBuf;
use std::time::Duration;

use commands::{run_config, run_pull, run_race};

/// Top-level CLI for duofetch.
#[derive(Debug, Parser)]
#[command(name = "duofetch")]
#[command(
    about = "duofetch: chunked pulls and deadline races over a multiplexed and a legacy HTTP channel",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: CliCommand,
}

/// Flags shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Debug logging for duofetch crates (RUST_LOG still wins).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log only response sizes, never bodies.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Skip TLS certificate and host verification.
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Write TLS key material to this file (SSLKEYLOGFILE format).
    #[arg(long, global = true, value_name = "FILE")]
    pub keylog: Option<PathBuf>,

    /// Append one JSON trace record per request.
    #[arg(long, global = true)]
    pub trace: bool,

    /// Log to ~/.local/state/duofetch/duofetch.log instead of stderr.
    #[arg(long, global = true)]
    pub log_file: bool,
}

impl GlobalArgs {
    fn overrides(&self) -> SessionOverrides {
        SessionOverrides {
            quiet: self.quiet,
            insecure: self.insecure,
            keylog_file: self.keylog.clone(),
            trace: self.trace,
            ..SessionOverrides::default()
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch each resource in fixed-size chunks, alternating channels.
    Pull {
        /// Resource names, resolved against each channel's base URL.
        #[arg(required = true)]
        names: Vec<String>,

        /// Bytes per chunk (default from config).
        #[arg(long, value_name = "N")]
        chunk_size: Option<u64>,

        /// Pause between chunks in milliseconds.
        #[arg(long, value_name = "N")]
        settle_ms: Option<u64>,

        /// Write the assembled resource here (single name only).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Fetch every resource concurrently and stop at the deadline.
    Race {
        #[arg(required = true)]
        names: Vec<String>,

        /// Race deadline in milliseconds.
        #[arg(long, value_name = "N")]
        deadline_ms: Option<u64>,

        /// Pause between the multiplexed and the legacy race, in milliseconds.
        #[arg(long, value_name = "N")]
        pause_ms: Option<u64>,

        /// Which channel(s) to race on.
        #[arg(long, value_enum, default_value_t = ChannelChoice::Both)]
        channel: ChannelChoice,
    },

    /// Print the config file path and the resolved values.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelChoice {
    Multiplexed,
    Legacy,
    Both,
}

impl ChannelChoice {
    /// Channel slots to race, in order.
    pub fn slots(self) -> &'static [usize] {
        match self {
            ChannelChoice::Multiplexed => &[MULTIPLEXED_SLOT],
            ChannelChoice::Legacy => &[LEGACY_SLOT],
            ChannelChoice::Both => &[MULTIPLEXED_SLOT, LEGACY_SLOT],
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Key log destination: `--keylog` wins over the config file.
    pub fn keylog_file(&self, cfg: &FetchConfig) -> Option<PathBuf> {
        self.global.keylog.clone().or_else(|| cfg.keylog_file.clone())
    }

    pub async fn run(self, cfg: FetchConfig) -> Result<()> {
        tracing::debug!("loaded config: {:?}", cfg);
        let mut overrides = self.global.overrides();

        match self.command {
            CliCommand::Pull {
                names,
                chunk_size,
                settle_ms,
                output,
            } => {
                overrides.chunk_size = chunk_size;
                overrides.settle_interval_ms = settle_ms;
                run_pull(&cfg, &overrides, names, output).await?;
            }
            CliCommand::Race {
                names,
                deadline_ms,
                pause_ms,
                channel,
            } => {
                overrides.race_deadline_ms = deadline_ms;
                let pause = pause_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| cfg.race_pause());
                run_race(&cfg, &overrides, &names, pause, channel).await?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
