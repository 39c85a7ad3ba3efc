//! RouterOS script rendering.
//!
//! The rendered document is a block of `## ` provenance comments followed by
//! an `/ip dns static` section with one `add` directive per host:
//!
//! ```text
//! ## Script generated 2024-01-01 12:00:00
//! ## Script format: "routeros"
//! ##
//! ## Hosts list sources:
//! ## > https://example.com/hosts.txt
//! ##
//! ## Excluded hosts sources:
//! ## > localhost
//!
//! /ip dns static
//! add address=127.0.0.1 name=ads.example.com comment=ADBlock
//! ```

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::ValidationError;
use crate::validation::is_valid_ipv4;

/// Redirect target used when the configured one is not a valid IPv4
pub const FALLBACK_REDIRECT: &str = "127.0.0.1";

/// Default tag written into every entry's `comment=` field
pub const DEFAULT_TAG: &str = "ADBlock";

/// Output script dialect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptFormat {
    #[default]
    #[serde(rename = "routeros")]
    RouterOs,
}

impl ScriptFormat {
    pub const ALL: &'static [ScriptFormat] = &[ScriptFormat::RouterOs];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptFormat::RouterOs => "routeros",
        }
    }
}

impl fmt::Display for ScriptFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScriptFormat::ALL
            .iter()
            .copied()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ValidationError::new(
                    "format",
                    format!(
                        "unsupported format \"{}\" (supported: {})",
                        s,
                        ScriptFormat::ALL
                            .iter()
                            .map(|f| f.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )
            })
    }
}

/// Per-render knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Maximum rendered entries, 0 for unlimited
    pub limit: usize,
    /// Value of every entry's `comment=` field; whitespace is stripped
    pub tag: String,
    pub format: ScriptFormat,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            limit: 0,
            tag: DEFAULT_TAG.to_string(),
            format: ScriptFormat::RouterOs,
        }
    }
}

/// Everything the renderer reads, borrowed from the aggregator
#[derive(Debug, Clone, Copy)]
pub struct ScriptInput<'a> {
    pub hostnames: &'a [String],
    pub excluded_hosts: &'a [String],
    pub sources: &'a [String],
    pub comments: &'a [String],
    pub redirect_to: &'a str,
}

/// Render the script for a given generation time.
///
/// Nothing in `input` is modified; rendering twice with the same input and
/// timestamp yields the same document.
pub fn render_script(
    input: &ScriptInput<'_>,
    options: &RenderOptions,
    generated_at: DateTime<Local>,
) -> String {
    let mut comments: Vec<String> = input.comments.to_vec();
    comments.push(format!(
        "Script generated {}",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    comments.push(format!("Script format: \"{}\"", options.format));
    comments.push(String::new());

    comments.push("Hosts list sources:".to_string());
    comments.extend(input.sources.iter().map(|uri| format!("> {}", uri)));
    comments.push(String::new());

    comments.push("Excluded hosts sources:".to_string());
    comments.extend(input.excluded_hosts.iter().map(|host| format!("> {}", host)));

    let excluded: HashSet<&str> = input.excluded_hosts.iter().map(String::as_str).collect();
    let mut hosts: Vec<&str> = input
        .hostnames
        .iter()
        .map(String::as_str)
        .filter(|host| !excluded.contains(host))
        .collect();

    if options.limit > 0 && hosts.len() > options.limit {
        comments.push(String::new());
        comments.push(format!(
            "{} entries limited to {}",
            hosts.len(),
            options.limit
        ));
        hosts.truncate(options.limit);
    }

    let redirect_to = if is_valid_ipv4(input.redirect_to) {
        input.redirect_to
    } else {
        warn!(
            "Invalid redirect target '{}', falling back to {}",
            input.redirect_to, FALLBACK_REDIRECT
        );
        FALLBACK_REDIRECT
    };
    let tag: String = options.tag.split_whitespace().collect();

    let mut out = String::new();
    for comment in &comments {
        if comment.is_empty() {
            out.push_str("##\n");
        } else {
            out.push_str("## ");
            out.push_str(comment);
            out.push('\n');
        }
    }

    if !hosts.is_empty() {
        out.push_str("\n/ip dns static\n");
        for host in hosts {
            out.push_str(&format!(
                "add address={} name={} comment={}\n",
                redirect_to, host, tag
            ));
        }
    }

    out
}

/// Directive lines of a rendered script, without comments or timestamps
pub fn directives(script: &str) -> impl Iterator<Item = &str> {
    script.lines().filter(|line| line.starts_with("add "))
}
