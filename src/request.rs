//! Script generation requests.
//!
//! A [`GenerateRequest`] carries the caller's raw inputs. It is validated at
//! the boundary (field plus violated constraint), and its normalized form keys
//! the result cache so equivalent requests share one rendered script.

use std::collections::HashSet;

use crate::cache::cache_key;
use crate::config::Limits;
use crate::error::ValidationError;
use crate::render::ScriptFormat;
use crate::validation::is_valid_ipv4;

/// Cache namespace of rendered scripts
const RESULT_CACHE_NAMESPACE: &str = "result";

/// Caller input for one script generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateRequest {
    /// Comma-separated source URIs
    pub sources: String,
    /// Comma-separated excluded hostnames; defaults apply when absent
    pub excluded_hosts: Option<String>,
    pub redirect_to: Option<String>,
    /// Maximum rendered entries; the configured default applies when absent
    pub limit: Option<usize>,
    pub format: Option<String>,
    pub version: Option<String>,
}

impl GenerateRequest {
    pub fn new(sources: impl Into<String>) -> Self {
        Self {
            sources: sources.into(),
            ..Default::default()
        }
    }

    /// Check every field against its constraints, reporting the first violation
    pub fn validate(&self, limits: &Limits) -> Result<(), ValidationError> {
        let sources = self.sources.trim();
        if sources.is_empty() {
            return Err(ValidationError::new("sources", "is required"));
        }
        check_length("sources", sources, 11, 4096)?;

        let source_list = split_list(sources);
        if source_list.len() > limits.max_sources {
            return Err(ValidationError::new(
                "sources",
                format!(
                    "at most {} sources allowed (got {})",
                    limits.max_sources,
                    source_list.len()
                ),
            ));
        }
        if let Some(uri) = source_list
            .iter()
            .find(|uri| uri.chars().count() > limits.max_source_uri_length)
        {
            return Err(ValidationError::new(
                "sources",
                format!(
                    "source URI longer than {} characters: {}",
                    limits.max_source_uri_length, uri
                ),
            ));
        }

        if let Some(hosts) = &self.excluded_hosts {
            check_length("excluded_hosts", hosts, 1, 4096)?;
            let count = split_list(hosts).len();
            if count > limits.max_excluded_hosts {
                return Err(ValidationError::new(
                    "excluded_hosts",
                    format!(
                        "at most {} hosts allowed (got {})",
                        limits.max_excluded_hosts, count
                    ),
                ));
            }
        }

        if let Some(format) = &self.format {
            check_length("format", format, 3, 64)?;
            format.parse::<ScriptFormat>()?;
        }

        if let Some(version) = &self.version {
            check_length("version", version, 1, 8)?;
        }

        if self.limit == Some(0) {
            return Err(ValidationError::new("limit", "must be at least 1"));
        }

        if let Some(ip) = &self.redirect_to {
            if !is_valid_ipv4(ip) {
                return Err(ValidationError::new(
                    "redirect_to",
                    format!("\"{}\" is not a valid IPv4 address", ip),
                ));
            }
        }

        Ok(())
    }

    /// Requested format, defaulting to RouterOS
    pub fn script_format(&self) -> Result<ScriptFormat, ValidationError> {
        match &self.format {
            Some(format) => format.parse(),
            None => Ok(ScriptFormat::default()),
        }
    }

    /// Result cache key of the normalized request.
    ///
    /// Source and host lists are trimmed and deduplicated in first-seen order;
    /// hostnames and the format are lower-cased. List order shapes the script
    /// (entry order, limit truncation, provenance comments) and stays part of
    /// the key.
    pub fn cache_key(&self) -> String {
        let sources = normalized_list(&self.sources, false);
        let excluded = self
            .excluded_hosts
            .as_deref()
            .map(|hosts| normalized_list(hosts, true))
            .unwrap_or_else(|| "-".to_string());
        let redirect_to = self.redirect_to.as_deref().map(str::trim).unwrap_or("-");
        let limit = self
            .limit
            .map(|limit| limit.to_string())
            .unwrap_or_else(|| "-".to_string());
        let format = self
            .format
            .as_deref()
            .map(|f| f.trim().to_ascii_lowercase())
            .unwrap_or_else(|| ScriptFormat::default().to_string());
        let version = self.version.as_deref().map(str::trim).unwrap_or("-");

        cache_key(
            RESULT_CACHE_NAMESPACE,
            &[&sources, &excluded, redirect_to, &limit, &format, version],
        )
    }
}

fn check_length(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ValidationError::new(
            field,
            format!("length must be between {} and {} (got {})", min, max, len),
        ));
    }
    Ok(())
}

fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

fn normalized_list(value: &str, lowercase: bool) -> String {
    let mut seen = HashSet::new();
    split_list(value)
        .into_iter()
        .map(|item| {
            if lowercase {
                item.to_lowercase()
            } else {
                item.to_string()
            }
        })
        .filter(|item| seen.insert(item.clone()))
        .collect::<Vec<_>>()
        .join(",")
}
