use duofetch_core::{config, logging, session};

mod cli;

use crate::cli::Cli;

fn main() {
    let cli = Cli::parse_args();

    // The subscriber needs -v and --log-file, so it goes in right after parsing.
    let verbose = cli.global.verbose;
    if cli.global.log_file {
        if let Err(e) = logging::init_logging_file(verbose) {
            logging::init_logging_stderr(verbose);
            tracing::warn!("file logging unavailable, using stderr: {:#}", e);
        }
    } else {
        logging::init_logging_stderr(verbose);
    }

    let cfg = match config::load_or_init() {
        Ok(cfg) => cfg,
        Err(err) => exit_with(err),
    };
    // Still single-threaded here, so the environment can be changed safely.
    if let Some(path) = cli.keylog_file(&cfg) {
        session::export_keylog(&path);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => exit_with(err.into()),
    };
    if let Err(err) = runtime.block_on(cli.run(cfg)) {
        exit_with(err);
    }
}

fn exit_with(err: anyhow::Error) -> ! {
    eprintln!("duofetch error: {:#}", err);
    std::process::exit(1);
}
