//! Config inspection commands.

use std::path::Path;

use anyhow::{Context, Result};

use etask_core::EtaskConfig;

pub fn cmd_show(config: &EtaskConfig, path: &Path) -> Result<()> {
    let text = toml::to_string_pretty(config).context("failed to render config")?;
    println!("# {}", path.display());
    print!("{text}");
    Ok(())
}

pub fn cmd_init(path: &Path) -> Result<()> {
    let path = EtaskConfig::write_default_at(path)?;
    println!("config at {}", path.display());
    Ok(())
}
