//! Configuration management for mikrohosts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::validation::{is_valid_hostname, is_valid_ipv4, is_valid_uri, URI_SCHEMES};

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mikrohosts/config.yaml";

/// Upper bound for the redirect cap
const MAX_REDIRECTS_LIMIT: usize = 10;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Values used when a request leaves a field out
    pub defaults: Defaults,

    /// Fetch and request limits
    pub limits: Limits,

    /// Source and result caches
    pub cache: CacheConfig,

    /// Known hosts file sources
    pub sources: Vec<SourceEntry>,
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.apply_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to built-in defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }

        debug!(
            "Config file {:?} not found, using built-in defaults",
            path.as_ref()
        );
        let mut config = Config {
            sources: default_sources(),
            ..Default::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override defaults from `MIKROHOSTS_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(ip) = env::var("MIKROHOSTS_REDIRECT_IP") {
            self.defaults.redirect_ip = ip;
        }
        if let Ok(hosts) = env::var("MIKROHOSTS_EXCLUDED_HOSTS") {
            self.defaults.excluded_hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(comment) = env::var("MIKROHOSTS_COMMENT") {
            self.defaults.comment = comment;
        }
        if let Ok(dir) = env::var("MIKROHOSTS_CACHE_DIR") {
            self.cache.dir = PathBuf::from(dir);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !is_valid_ipv4(&self.defaults.redirect_ip) {
            anyhow::bail!(
                "Invalid defaults.redirect_ip '{}'. Use a dotted IPv4 address",
                self.defaults.redirect_ip
            );
        }

        for host in &self.defaults.excluded_hosts {
            if !is_valid_hostname(host) {
                anyhow::bail!("Invalid hostname in defaults.excluded_hosts: '{}'", host);
            }
        }

        let comment = &self.defaults.comment;
        if comment.trim().is_empty() || comment.contains('"') || comment.contains('\\') {
            anyhow::bail!(
                "Invalid defaults.comment '{}'. It must be non-empty without quotes or backslashes",
                comment
            );
        }

        self.limits.validate()?;

        for source in &self.sources {
            if !is_valid_uri(&source.uri) {
                anyhow::bail!("Source '{}' has an invalid URI: {}", source.name, source.uri);
            }
        }

        Ok(())
    }

    /// Sources enabled in the catalogue, in declaration order
    pub fn enabled_sources(&self) -> Vec<&SourceEntry> {
        self.sources.iter().filter(|s| s.enabled).collect()
    }

    /// Generate default config with comments
    pub fn generate_default_yaml() -> String {
        include_str!("../templates/config.yaml").to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Address every rendered entry redirects to
    pub redirect_ip: String,

    /// Hosts never rendered unless the request overrides the list
    pub excluded_hosts: Vec<String>,

    /// Tag written into the `comment=` field of each entry
    pub comment: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            redirect_ip: "127.0.0.1".to_string(),
            excluded_hosts: vec!["localhost".to_string()],
            comment: "ADBlock".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum sources per request
    pub max_sources: usize,

    /// Maximum excluded hosts per request
    pub max_excluded_hosts: usize,

    /// Maximum length of a single source URI
    pub max_source_uri_length: usize,

    /// Default result entries limit (0 = unlimited)
    pub result_entries: usize,

    /// Maximum source body size in KiB
    pub max_source_size_kib: u64,

    /// Maximum redirects followed per source
    pub max_redirects: usize,

    /// Connect and total timeout per source, in seconds
    pub fetch_timeout_secs: u64,

    /// Sources fetched in parallel
    pub max_concurrent_fetches: usize,

    /// Protocols allowed for source URIs and redirect targets
    pub protocols: Vec<String>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_sources: 8,
            max_excluded_hosts: 32,
            max_source_uri_length: 256,
            result_entries: 0,
            max_source_size_kib: 2048,
            max_redirects: 2,
            fetch_timeout_secs: 5,
            max_concurrent_fetches: 6,
            protocols: vec!["http".to_string(), "https".to_string()],
        }
    }
}

impl Limits {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.protocols.is_empty() {
            anyhow::bail!("limits.protocols cannot be empty");
        }
        for protocol in &self.protocols {
            if !URI_SCHEMES.contains(&protocol.as_str()) {
                anyhow::bail!(
                    "Unsupported protocol '{}' in limits.protocols. Valid values: {}",
                    protocol,
                    URI_SCHEMES.join(", ")
                );
            }
        }
        if self.max_redirects > MAX_REDIRECTS_LIMIT {
            anyhow::bail!(
                "limits.max_redirects must be at most {} (got {})",
                MAX_REDIRECTS_LIMIT,
                self.max_redirects
            );
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("limits.fetch_timeout_secs must be positive");
        }
        if self.max_source_size_kib == 0 {
            anyhow::bail!("limits.max_source_size_kib must be positive");
        }
        if self.max_concurrent_fetches == 0 {
            anyhow::bail!("limits.max_concurrent_fetches must be positive");
        }
        if self.max_sources == 0 {
            anyhow::bail!("limits.max_sources must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process only; lost when the process exits
    Memory,
    /// JSON files under `cache.dir`, shared between runs
    #[default]
    File,
    /// Never store anything
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Root directory for the file backend
    pub dir: PathBuf,

    /// Lifetime of a fetched source body, in seconds
    pub source_ttl_secs: u64,

    /// Lifetime of a rendered script, in seconds
    pub result_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::File,
            dir: PathBuf::from("/var/cache/mikrohosts"),
            source_ttl_secs: 7200,
            result_ttl_secs: 240,
        }
    }
}

impl CacheConfig {
    pub fn source_ttl(&self) -> Duration {
        Duration::from_secs(self.source_ttl_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

/// A known hosts file source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
}

fn default_sources() -> Vec<SourceEntry> {
    vec![
        SourceEntry {
            name: "block_shit".to_string(),
            uri: "https://cdn.jsdelivr.net/gh/tarampampam/static@master/hosts/block_shit.txt"
                .to_string(),
            description: "YouTube, Skype and similar ads".to_string(),
            enabled: true,
        },
        SourceEntry {
            name: "adaway".to_string(),
            uri: "https://adaway.org/hosts.txt".to_string(),
            description: "AdAway default blocklist (~400 entries)".to_string(),
            enabled: true,
        },
        SourceEntry {
            name: "yoyo".to_string(),
            uri: "https://pgl.yoyo.org/adservers/serverlist.php?hostformat=hosts&showintro=0&mimetype=plaintext"
                .to_string(),
            description: "Peter Lowe's ad servers (~2400 entries)".to_string(),
            enabled: true,
        },
        SourceEntry {
            name: "windows_spy".to_string(),
            uri: "https://raw.githubusercontent.com/crazy-max/WindowsSpyBlocker/master/data/hosts/spy.txt"
                .to_string(),
            description: "Microsoft telemetry services".to_string(),
            enabled: false,
        },
        SourceEntry {
            name: "someonewhocares".to_string(),
            uri: "https://someonewhocares.org/hosts/hosts".to_string(),
            description: "Dan Pollock's hosts file (~12000 entries)".to_string(),
            enabled: false,
        },
        SourceEntry {
            name: "mvps".to_string(),
            uri: "https://winhelp2002.mvps.org/hosts.txt".to_string(),
            description: "MVPS hosts file (~13000 entries)".to_string(),
            enabled: false,
        },
    ]
}
