//! Task schema commands.

use std::path::Path;

use anyhow::{Context, Result};

use etask_core::TaskSchema;

pub fn cmd_uid_width(path: &str) -> Result<()> {
    let schema = TaskSchema::load(Path::new(path)).with_context(|| format!("failed to load {path}"))?;
    println!("tasks     : {}", schema.tasks().len());
    println!("max uid   : {}", schema.max_uid());
    println!("uid width : {} byte(s)", schema.task_id_width().bytes());
    Ok(())
}
