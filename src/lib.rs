//! # mikrohosts - Hosts file aggregator for RouterOS
//!
//! Fetches remote hosts files, merges and filters their entries, and renders
//! a RouterOS `/ip dns static` script that redirects every listed domain to a
//! single address.
//!
//! ## Features
//!
//! - **Concurrent fetching** - Sources are downloaded in parallel and merged in source order
//! - **Failure isolation** - A broken source becomes a comment in the script, never an abort
//! - **Guarded downloads** - Protocol allow-list, redirect cap, timeouts, size and content-type checks
//! - **Two-tier caching** - Per-source bodies and whole rendered scripts, each with its own TTL
//! - **Provenance** - The script lists its sources, exclusions, limits and errors
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       mikrohosts                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: generate, sources, cache, config, version  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Request (boundary validation, result cache key)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Aggregator (owned builder)                                 │
//! │    ├── Fetcher (reqwest + rustls) ── source cache           │
//! │    ├── Hosts file extraction (regex)                        │
//! │    └── Renderer (RouterOS script)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Cache (memory, file, disabled)                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use mikrohosts::aggregator::Aggregator;
//! use mikrohosts::cache::MemoryCache;
//! use mikrohosts::fetcher::{Fetcher, FetcherOptions};
//! use mikrohosts::render::RenderOptions;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = Fetcher::new(FetcherOptions::default(), Arc::new(MemoryCache::new()))?;
//!
//!     let script = Aggregator::new()
//!         .add_source("https://adaway.org/hosts.txt,https://someonewhocares.org/hosts/hosts")
//!         .add_excluded_hosts("localhost")
//!         .run(&fetcher)
//!         .await
//!         .render(&RenderOptions::default());
//!
//!     print!("{}", script);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`aggregator`] - Source/exclusion bookkeeping and the fetch-and-merge run
//! - [`cache`] - TTL key/value caches (memory, file, disabled)
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error types
//! - [`fetcher`] - Guarded HTTP client for hosts file sources
//! - [`hostsfile`] - Hosts file parsing and newline normalization
//! - [`render`] - RouterOS script rendering
//! - [`request`] - Request validation and result cache keys
//! - [`validation`] - URI, hostname and IPv4 predicates

pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod hostsfile;
pub mod render;
pub mod request;
pub mod validation;

pub use aggregator::Aggregator;
pub use cli::{CacheAction, Cli, Commands};
pub use config::Config;
