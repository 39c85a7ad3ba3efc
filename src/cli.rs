//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "mikrohosts")]
#[command(author, version, about = "Hosts file aggregator for RouterOS static DNS")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch sources and render a RouterOS script
    Generate(GenerateArgs),

    /// List the configured sources catalogue
    Sources,

    /// Manage the source and result caches
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print the default configuration file
    Config,

    /// Show version
    Version,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// Comma-separated source URIs (default: enabled catalogue sources)
    #[arg(short, long)]
    pub sources: Option<String>,

    /// Comma-separated hostnames never written to the script
    #[arg(short, long)]
    pub exclude: Option<String>,

    /// IPv4 address every entry resolves to
    #[arg(short, long)]
    pub redirect_to: Option<String>,

    /// Maximum number of entries
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Script format
    #[arg(short, long)]
    pub format: Option<String>,

    /// Version tag of the requesting client
    #[arg(long)]
    pub version_tag: Option<String>,

    /// Skip the result cache lookup (the fresh result is still stored)
    #[arg(long)]
    pub no_cache: bool,

    /// Write the script to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum CacheAction {
    /// Remove every cached source and result
    Clear,
}
