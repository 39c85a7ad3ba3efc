//! mikrohosts - Hosts file aggregator for RouterOS
//!
//! Merges remote hosts files into a RouterOS `/ip dns static` script.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use mikrohosts::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // Logs go to stderr; stdout carries the script
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Generate(args) => mikrohosts::commands::generate::run(args, &cli.config).await,
        Commands::Sources => mikrohosts::commands::sources::run(&cli.config),
        Commands::Cache { action } => mikrohosts::commands::cache::run(action, &cli.config),
        Commands::Config => {
            print!("{}", mikrohosts::config::Config::generate_default_yaml());
            Ok(())
        }
        Commands::Version => {
            println!("mikrohosts {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
