//! CLI command handlers, one file per subcommand.

mod config;
mod pull;
mod race;

pub use config::run_config;
pub use pull::run_pull;
pub use race::run_race;
