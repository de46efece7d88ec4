//! CLI module for Reefline.
//!
//! This module provides the command-line interface for reconciling
//! declared resources.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
