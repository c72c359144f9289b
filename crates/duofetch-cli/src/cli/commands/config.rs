//! `duofetch config` – show where the config lives and what it resolves to.

use anyhow::Result;
use duofetch_core::config::{self, FetchConfig};

pub fn run_config(cfg: &FetchConfig) -> Result<()> {
    let path = config::config_path()?;
    println!("# {}", path.display());
    print!("{}", cfg.to_toml()?);
    Ok(())
}
