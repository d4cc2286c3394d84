//! CLI argument definitions using clap derive macros.
//!
//! Only the static command tree lives here. Workflow flags come from the
//! host's and the extensions' flag sets and are attached at runtime by
//! [`crate::flags::augment`].

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Service mesh connectivity tests and diagnostics
#[derive(Parser, Debug)]
#[command(name = "meshctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = "MESHCTL_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Long flag names (and their shorthands) taken by the static command tree.
pub const RESERVED_FLAGS: &[(&str, Option<char>)] = &[
    ("help", Some('h')),
    ("version", Some('V')),
    ("config", None),
    ("verbose", Some('v')),
];

/// Subcommand names, as clap sees them.
pub const CONNECTIVITY: &str = "connectivity";
pub const CONNECTIVITY_TEST: &str = "test";
pub const SYSDUMP: &str = "sysdump";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connectivity troubleshooting
    Connectivity(ConnectivityCommand),

    /// Collect diagnostic information into a dump directory
    Sysdump,

    /// List registered extensions
    Extensions,

    /// Configuration management
    Config(ConfigCommand),

    /// Show version
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Connectivity Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ConnectivityCommand {
    #[command(subcommand)]
    pub action: ConnectivityAction,
}

#[derive(Subcommand, Debug)]
pub enum ConnectivityAction {
    /// Run the connectivity tests
    Test,
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the config file path
    Path,
}
