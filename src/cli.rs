//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vellum template rendering host
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root; the config file and template root are resolved against it
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (default: vellum.toml)
    #[arg(short = 'C', long, default_value = "vellum.toml")]
    pub config: PathBuf,

    /// Template directory (relative to project root)
    #[arg(short, long)]
    pub templates: Option<PathBuf>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile every declared template set and report the result
    Check,

    /// Serve the configured routes. Recompile templates on change
    Serve {
        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// The port you should provide
        #[arg(short, long)]
        port: Option<u16>,

        /// enable watch
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },
}
