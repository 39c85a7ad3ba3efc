//! Hosts list aggregation pipeline.
//!
//! An [`Aggregator`] is an owned builder: sources, excluded hosts and the
//! redirect target are added by value, [`Aggregator::run`] fetches every
//! source and merges the extracted hostnames, and [`Aggregator::render`]
//! produces the script without touching the accumulated state.
//!
//! ```no_run
//! # async fn demo(fetcher: &mikrohosts::fetcher::Fetcher) {
//! use mikrohosts::aggregator::Aggregator;
//! use mikrohosts::render::RenderOptions;
//!
//! let script = Aggregator::new()
//!     .add_source("https://adaway.org/hosts.txt")
//!     .add_excluded_hosts("localhost")
//!     .redirect_to("127.0.0.1")
//!     .run(fetcher)
//!     .await
//!     .render(&RenderOptions::default());
//! # }
//! ```

use chrono::{DateTime, Local};
use futures::stream::{self, StreamExt};
use percent_encoding::percent_decode_str;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::hostsfile::extract_hostnames;
use crate::render::{render_script, RenderOptions, ScriptInput};
use crate::validation::Validator;

/// Redirect target used until [`Aggregator::redirect_to`] is called
pub const DEFAULT_REDIRECT: &str = "127.0.0.1";

/// Sources fetched in parallel unless configured otherwise
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Result of fetching and parsing one source
type SourceOutcome = (String, Result<(Vec<String>, bool), FetchError>);

/// Accumulated state of one pipeline run
#[derive(Debug)]
pub struct Aggregator {
    sources: Vec<String>,
    excluded_hosts: Vec<String>,
    redirect_to: String,
    comments: Vec<String>,
    hostnames: Vec<String>,
    seen_hosts: HashSet<String>,
    validator: Validator,
    concurrency: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            excluded_hosts: Vec::new(),
            redirect_to: DEFAULT_REDIRECT.to_string(),
            comments: Vec::new(),
            hostnames: Vec::new(),
            seen_hosts: HashSet::new(),
            validator: Validator::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of in-flight fetches (at least one)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Add one source URI or a comma-separated batch.
    ///
    /// Each candidate is trimmed and percent-decoded; invalid and already
    /// known URIs are skipped.
    pub fn add_source(mut self, input: &str) -> Self {
        for candidate in split_batch(input) {
            if !self.validator.uri(&candidate) {
                debug!("Ignoring invalid source URI: {}", candidate);
                continue;
            }
            if !self.sources.contains(&candidate) {
                self.sources.push(candidate);
            }
        }
        self
    }

    pub fn add_sources<I, S>(self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        inputs
            .into_iter()
            .fold(self, |aggregator, input| aggregator.add_source(input.as_ref()))
    }

    /// Add one excluded hostname or a comma-separated batch (stored lower-cased)
    pub fn add_excluded_hosts(mut self, input: &str) -> Self {
        for candidate in split_batch(input) {
            let host = candidate.to_lowercase();
            if !self.validator.hostname(&host) {
                debug!("Ignoring invalid excluded host: {}", candidate);
                continue;
            }
            if !self.excluded_hosts.contains(&host) {
                self.excluded_hosts.push(host);
            }
        }
        self
    }

    pub fn add_excluded_host_list<I, S>(self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        inputs.into_iter().fold(self, |aggregator, input| {
            aggregator.add_excluded_hosts(input.as_ref())
        })
    }

    /// Set the redirect target. Stored verbatim; checked at render time.
    pub fn redirect_to(mut self, ip: &str) -> Self {
        if !self.validator.ipv4(ip) {
            debug!("Redirect target '{}' is not a valid IPv4 address", ip);
        }
        self.redirect_to = ip.to_string();
        self
    }

    /// Append a provenance comment
    pub fn add_comment(mut self, message: impl Into<String>) -> Self {
        self.comments.push(message.into());
        self
    }

    /// Fetch every source and merge the extracted hostnames.
    ///
    /// Fetches run concurrently but are merged in source order, so the
    /// outcome does not depend on which source answers first. A failing
    /// source only adds an error comment.
    pub async fn run(mut self, fetcher: &Fetcher) -> Self {
        let outcomes: Vec<SourceOutcome> = stream::iter(self.sources.clone())
            .map(|uri| async move {
                let result = fetcher
                    .fetch(&uri)
                    .await
                    .map(|fetched| (extract_hostnames(&fetched.body), fetched.from_cache));
                (uri, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (uri, result) in outcomes {
            self.merge(uri, result);
        }

        info!(
            "Aggregated {} unique hosts from {} sources",
            self.hostnames.len(),
            self.sources.len()
        );
        self
    }

    fn merge(&mut self, uri: String, result: Result<(Vec<String>, bool), FetchError>) {
        match result {
            Ok((hosts, from_cache)) => {
                if from_cache {
                    self.comments
                        .push(format!("Cache: \"{}\" loaded from cache", uri));
                }
                let before = self.hostnames.len();
                for host in hosts {
                    if self.seen_hosts.insert(host.clone()) {
                        self.hostnames.push(host);
                    }
                }
                debug!("{}: {} new hosts", uri, self.hostnames.len() - before);
            }
            Err(e) => {
                warn!("Failed to fetch {}: {}", uri, e);
                self.comments.push(format!("Error :: {} :: {}", uri, e));
            }
        }
    }

    /// Render the script stamped with the current local time
    pub fn render(&self, options: &RenderOptions) -> String {
        self.render_at(options, Local::now())
    }

    /// Render the script stamped with a given time
    pub fn render_at(&self, options: &RenderOptions, generated_at: DateTime<Local>) -> String {
        let input = ScriptInput {
            hostnames: &self.hostnames,
            excluded_hosts: &self.excluded_hosts,
            sources: &self.sources,
            comments: &self.comments,
            redirect_to: &self.redirect_to,
        };
        render_script(&input, options, generated_at)
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn excluded_hosts(&self) -> &[String] {
        &self.excluded_hosts
    }

    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn redirect_target(&self) -> &str {
        &self.redirect_to
    }
}

/// Split a comma-separated batch into trimmed, percent-decoded candidates
fn split_batch(input: &str) -> impl Iterator<Item = String> + '_ {
    input
        .split(',')
        .map(|part| {
            percent_decode_str(part.trim())
                .decode_utf8_lossy()
                .trim()
                .to_string()
        })
        .filter(|candidate| !candidate.is_empty())
}
