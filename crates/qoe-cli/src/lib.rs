//! QoE session analyzer CLI library.
//!
//! This crate provides the command-line interface around `qoe-core`.

pub mod analyze;
mod cli;
mod config;
pub mod memory;

pub use cli::Cli;
pub use config::Config;
