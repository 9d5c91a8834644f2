//! Command-line front end
//!
//! Prints the resolved profile for an alias, or dials it (through any
//! `ProxyJump` chain) and runs a command.

mod runner;

use std::path::PathBuf;

use clap::Parser;

pub use runner::{render_profile, run};

/// hostdial - Resolve SSH host aliases and connect through jump hosts
#[derive(Parser, Debug)]
#[command(name = "hostdial")]
#[command(about = "Resolve SSH host aliases and connect through ProxyJump chains")]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Show the validated profile for an alias
    hostdial db

    # Run a command, overriding user and port
    hostdial admin@db:2222 uptime

    # Use a settings file and clear unsupported algorithm lists
    hostdial -c ./hostdial.yaml --lenient db 'df -h'")]
pub struct Cli {
    /// Path to settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Clear unsupported algorithm lists instead of rejecting the profile
    #[arg(long)]
    pub lenient: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Host alias, `[user@]host[:port]`
    pub alias: String,

    /// Command to run on the host
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}
