//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;

pub use args::{Args, Command, ConfigAction};
pub use commands::{handle_config_action, run_login, run_make, run_outline, run_stitch, MakeOptions};
pub use enums::{RatioArg, StyleArg};
