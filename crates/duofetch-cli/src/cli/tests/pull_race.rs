//! Tests for pull, race and config subcommands.

use super::{parse, Cli, CliCommand};
use crate::cli::ChannelChoice;
use clap::Parser;
use duofetch_core::config::FetchConfig;
use duofetch_core::session::{LEGACY_SLOT, MULTIPLEXED_SLOT};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[test]
fn cli_parse_pull_defaults() {
    let cli = parse(&["duofetch", "pull", "index.html"]);
    assert!(!cli.global.verbose);
    assert!(!cli.global.quiet);
    match cli.command {
        CliCommand::Pull {
            names,
            chunk_size,
            settle_ms,
            output,
        } => {
            assert_eq!(names, vec!["index.html".to_string()]);
            assert!(chunk_size.is_none());
            assert!(settle_ms.is_none());
            assert!(output.is_none());
        }
        _ => panic!("expected Pull"),
    }
}

#[test]
fn cli_parse_pull_with_options() {
    let cli = parse(&[
        "duofetch",
        "pull",
        "a.bin",
        "--chunk-size",
        "4096",
        "--settle-ms",
        "0",
        "-o",
        "/tmp/a.bin",
    ]);
    match cli.command {
        CliCommand::Pull {
            names,
            chunk_size,
            settle_ms,
            output,
        } => {
            assert_eq!(names, vec!["a.bin".to_string()]);
            assert_eq!(chunk_size, Some(4096));
            assert_eq!(settle_ms, Some(0));
            assert_eq!(output.as_deref(), Some(Path::new("/tmp/a.bin")));
        }
        _ => panic!("expected Pull with options"),
    }
}

#[test]
fn cli_parse_pull_requires_a_name() {
    assert!(Cli::try_parse_from(["duofetch", "pull"]).is_err());
}

#[test]
fn cli_parse_global_flags_after_subcommand() {
    let cli = parse(&[
        "duofetch",
        "race",
        "x",
        "-v",
        "-q",
        "--insecure",
        "--trace",
        "--keylog",
        "/tmp/keys.log",
    ]);
    assert!(cli.global.verbose);
    assert!(cli.global.quiet);
    assert!(cli.global.insecure);
    assert!(cli.global.trace);
    assert_eq!(cli.global.keylog.as_deref(), Some(Path::new("/tmp/keys.log")));

    let o = cli.global.overrides();
    assert!(o.quiet && o.insecure && o.trace);
    assert!(o.chunk_size.is_none());
}

#[test]
fn cli_parse_race_defaults_to_both_channels() {
    match parse(&["duofetch", "race", "a", "b", "c"]).command {
        CliCommand::Race {
            names,
            deadline_ms,
            pause_ms,
            channel,
        } => {
            assert_eq!(names.len(), 3);
            assert!(deadline_ms.is_none());
            assert!(pause_ms.is_none());
            assert_eq!(channel, ChannelChoice::Both);
        }
        _ => panic!("expected Race"),
    }
}

#[test]
fn cli_parse_race_with_options() {
    match parse(&[
        "duofetch",
        "race",
        "a",
        "--deadline-ms",
        "250",
        "--pause-ms",
        "0",
        "--channel",
        "legacy",
    ])
    .command
    {
        CliCommand::Race {
            deadline_ms,
            pause_ms,
            channel,
            ..
        } => {
            assert_eq!(deadline_ms, Some(250));
            assert_eq!(pause_ms.map(Duration::from_millis), Some(Duration::ZERO));
            assert_eq!(channel, ChannelChoice::Legacy);
        }
        _ => panic!("expected Race with options"),
    }
}

#[test]
fn cli_parse_race_rejects_unknown_channel() {
    assert!(Cli::try_parse_from(["duofetch", "race", "a", "--channel", "carrier-pigeon"]).is_err());
}

#[test]
fn channel_choice_slots_in_race_order() {
    assert_eq!(ChannelChoice::Multiplexed.slots(), &[MULTIPLEXED_SLOT]);
    assert_eq!(ChannelChoice::Legacy.slots(), &[LEGACY_SLOT]);
    assert_eq!(ChannelChoice::Both.slots(), &[MULTIPLEXED_SLOT, LEGACY_SLOT]);
}

#[test]
fn cli_parse_config() {
    match parse(&["duofetch", "config"]).command {
        CliCommand::Config => {}
        _ => panic!("expected Config"),
    }
}

#[test]
fn keylog_flag_wins_over_config() {
    let cfg = FetchConfig {
        keylog_file: Some(PathBuf::from("/var/tmp/from-config.log")),
        ..FetchConfig::default()
    };
    let cli = parse(&["duofetch", "pull", "a", "--keylog", "/tmp/keys.log"]);
    assert_eq!(cli.keylog_file(&cfg), Some(PathBuf::from("/tmp/keys.log")));

    let cli = parse(&["duofetch", "pull", "a"]);
    assert_eq!(cli.keylog_file(&cfg), Some(PathBuf::from("/var/tmp/from-config.log")));
    assert_eq!(cli.keylog_file(&FetchConfig::default()), None);
}
