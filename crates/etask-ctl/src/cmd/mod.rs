//! CLI command modules.

pub mod args;
pub mod codec;
pub mod config;
pub mod link;
pub mod schema;
