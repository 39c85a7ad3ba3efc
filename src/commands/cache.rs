//! Cache command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::cache::open_caches;
use crate::cli::CacheAction;
use crate::config::Config;

/// Run the cache command
pub fn run(action: CacheAction, config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    match action {
        CacheAction::Clear => {
            let removed = clear_all(&config)?;
            info!("Removed {} cache entries", removed);
            println!("[OK] Cleared {} cached entries", removed);
            Ok(())
        }
    }
}

/// Empty both the source and the result cache
pub fn clear_all(config: &Config) -> Result<usize> {
    let (sources, results) = open_caches(&config.cache);
    let from_sources = sources.clear().context("Failed to clear source cache")?;
    let from_results = results.clear().context("Failed to clear result cache")?;
    Ok(from_sources + from_results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheBackend, CacheConfig};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_clear_all_file_backend() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            cache: CacheConfig {
                backend: CacheBackend::File,
                dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            ..Default::default()
        };

        let (sources, results) = open_caches(&config.cache);
        let ttl = Duration::from_secs(60);
        sources.put("source:1", "0.0.0.0 a.com\n", ttl).unwrap();
        sources.put("source:2", "0.0.0.0 b.com\n", ttl).unwrap();
        results.put("result:1", "## script\n", ttl).unwrap();

        assert_eq!(clear_all(&config).unwrap(), 3);
        assert_eq!(sources.get("source:1").unwrap(), None);
        assert_eq!(clear_all(&config).unwrap(), 0);
    }

    #[test]
    fn test_clear_all_disabled_backend() {
        let config = Config {
            cache: CacheConfig {
                backend: CacheBackend::Disabled,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(clear_all(&config).unwrap(), 0);
    }
}
