//! Sources command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

/// Run the sources command
pub fn run(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    print!("{}", format_sources(&config));
    Ok(())
}

/// Render the sources catalogue as a listing
pub fn format_sources(config: &Config) -> String {
    let enabled_count = config.sources.iter().filter(|s| s.enabled).count();
    let mut out = String::new();

    out.push_str(&format!(
        "Hosts sources ({} total, {} enabled):\n\n",
        config.sources.len(),
        enabled_count
    ));

    for source in &config.sources {
        let mark = if source.enabled { "x" } else { " " };
        out.push_str(&format!("  [{}] {}\n", mark, source.name));
        out.push_str(&format!("      {}\n", source.uri));
        if !source.description.is_empty() {
            out.push_str(&format!("      {}\n", source.description));
        }
    }

    out
}
